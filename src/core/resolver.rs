use hashbrown::{HashMap, HashSet};

use crate::types::{NodeId, RowId};

/// Raised when an id is consulted before its node was bound.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unresolved reference to node {0}")]
pub struct Unresolved(pub NodeId);

/// Request-scoped map from client ids to store row ids.
///
/// Every live node of a level is bound under its original id (temporary or
/// persistent) before the next level is processed. Nodes scheduled for
/// deletion are retired and never resolve.
#[derive(Debug, Default)]
pub struct IdResolver {
    bound: HashMap<NodeId, RowId>,
    retired: HashSet<RowId>,
}

impl IdResolver {
    /// Empty resolver for one pass.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `id` is now stored as `row`.
    pub fn bind(&mut self, id: NodeId, row: RowId) {
        self.bound.insert(id, row);
    }

    /// Marks a persisted row as being deleted in this pass.
    pub fn retire(&mut self, row: RowId) {
        self.retired.insert(row);
    }

    /// True once `id` has been bound in this pass.
    pub fn is_bound(&self, id: &NodeId) -> bool {
        self.bound.contains_key(id)
    }

    /// Resolves a temporary id through its binding; persistent ids pass
    /// through unless retired.
    pub fn resolve(&self, id: &NodeId) -> Result<RowId, Unresolved> {
        if let Some(row) = self.bound.get(id) {
            return Ok(*row);
        }
        match id {
            NodeId::Persistent(row) if !self.retired.contains(row) => Ok(*row),
            _ => Err(Unresolved(id.clone())),
        }
    }

    /// Temporary ids promoted during this pass.
    pub fn promotions(&self) -> impl Iterator<Item = (&crate::types::TempToken, RowId)> {
        self.bound.iter().filter_map(|(id, row)| match id {
            NodeId::Temp(token) => Some((token, *row)),
            NodeId::Persistent(_) => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: &str) -> NodeId {
        NodeId::parse(raw).expect("id")
    }

    #[test]
    fn temp_ids_need_a_binding() {
        let mut resolver = IdResolver::new();
        assert_eq!(resolver.resolve(&id("m-tmp-1")), Err(Unresolved(id("m-tmp-1"))));
        resolver.bind(id("m-tmp-1"), 17);
        assert_eq!(resolver.resolve(&id("m-tmp-1")), Ok(17));
        assert_eq!(resolver.promotions().count(), 1);
    }

    #[test]
    fn persistent_ids_pass_through_unless_retired() {
        let mut resolver = IdResolver::new();
        assert_eq!(resolver.resolve(&id("5")), Ok(5));
        resolver.bind(id("5"), 5);
        assert!(resolver.is_bound(&id("5")));
        resolver.retire(9);
        assert_eq!(resolver.resolve(&id("9")), Err(Unresolved(id("9"))));
        assert_eq!(resolver.promotions().count(), 0);
    }
}
