//! Validation and dense sibling positions, computed before any write.

use hashbrown::{HashMap, HashSet};

use crate::{
    node::{ClassroomTree, LessonNode, ModuleNode, NodeHeader, ResourceNode},
    record::ResourceKind,
    types::NodeId,
};

use super::error::ReconcileError;

/// A node with its effective parent and planned position.
///
/// `position` is `None` for nodes the client deleted.
#[derive(Debug)]
pub struct Planned<'a, N> {
    /// The snapshot node.
    pub node: &'a N,
    /// Effective parent; `None` for modules.
    pub parent: Option<NodeId>,
    /// Dense rank among live siblings.
    pub position: Option<i64>,
}

/// Every node of a tree, level by level, in snapshot order.
#[derive(Debug)]
pub struct SyncPlan<'a> {
    /// Every module.
    pub modules: Vec<Planned<'a, ModuleNode>>,
    /// Every lesson, regrouped under its effective module.
    pub lessons: Vec<Planned<'a, LessonNode>>,
    /// Every resource.
    pub resources: Vec<Planned<'a, ResourceNode>>,
}

/// Sorts `(index, declared position)` pairs by position, ties by index,
/// and returns each index with its rank `0..N-1`.
pub fn dense_ranks(live: &[(usize, i64)]) -> Vec<(usize, i64)> {
    let mut sorted = live.to_vec();
    sorted.sort_by_key(|&(idx, position)| (position, idx));
    sorted
        .into_iter()
        .enumerate()
        .map(|(rank, (idx, _))| (idx, rank as i64))
        .collect()
}

/// Validates `tree` and plans every node.
///
/// Fails with [`ReconcileError::InvalidTree`] on duplicate ids, when a
/// live node hangs under a parent that is missing or deleted, or when a
/// resource names a lesson other than the one enclosing it.
pub fn plan(tree: &ClassroomTree) -> Result<SyncPlan<'_>, ReconcileError> {
    let mut modules: Vec<Planned<'_, ModuleNode>> = Vec::new();
    let mut lessons: Vec<Planned<'_, LessonNode>> = Vec::new();
    let mut resources: Vec<Planned<'_, ResourceNode>> = Vec::new();

    for module in &tree.modules {
        modules.push(Planned {
            node: module,
            parent: None,
            position: None,
        });
        for lesson in &module.lessons {
            let parent = effective_parent(&lesson.header, &module.header);
            lessons.push(Planned {
                node: lesson,
                parent: Some(parent),
                position: None,
            });
            for resource in &lesson.resources {
                let parent = effective_parent(&resource.header, &lesson.header);
                if parent != lesson.header.id && !resource.header.mutation.is_deleted() {
                    return Err(ReconcileError::InvalidTree(format!(
                        "resource {} cannot move to lesson {parent}",
                        resource.header.id
                    )));
                }
                resources.push(Planned {
                    node: resource,
                    parent: Some(parent),
                    position: None,
                });
            }
        }
    }

    let live_modules = live_ids("module", modules.iter().map(|p| &p.node.header))?;
    let live_lessons = live_ids("lesson", lessons.iter().map(|p| &p.node.header))?;
    live_ids("resource", resources.iter().map(|p| &p.node.header))?;

    check_parents("lesson", "module", &lessons, &live_modules)?;
    check_parents("resource", "lesson", &resources, &live_lessons)?;
    for p in &resources {
        let resource = p.node;
        if !resource.header.mutation.is_deleted()
            && resource.kind == ResourceKind::Link
            && resource.url.inline().is_some()
        {
            return Err(ReconcileError::InvalidTree(format!(
                "link resource {} carries an inline payload",
                resource.header.id
            )));
        }
    }

    assign_positions(&mut modules);
    assign_positions(&mut lessons);
    assign_positions(&mut resources);

    Ok(SyncPlan {
        modules,
        lessons,
        resources,
    })
}

trait HasHeader {
    fn header(&self) -> &NodeHeader;
}

impl HasHeader for ModuleNode {
    fn header(&self) -> &NodeHeader {
        &self.header
    }
}

impl HasHeader for LessonNode {
    fn header(&self) -> &NodeHeader {
        &self.header
    }
}

impl HasHeader for ResourceNode {
    fn header(&self) -> &NodeHeader {
        &self.header
    }
}

fn effective_parent(child: &NodeHeader, enclosing: &NodeHeader) -> NodeId {
    child
        .parent_id
        .clone()
        .unwrap_or_else(|| enclosing.id.clone())
}

fn live_ids<'a>(
    level: &str,
    headers: impl Iterator<Item = &'a NodeHeader>,
) -> Result<HashSet<NodeId>, ReconcileError> {
    let mut seen = HashSet::new();
    let mut live = HashSet::new();
    for header in headers {
        if !seen.insert(header.id.clone()) {
            return Err(ReconcileError::InvalidTree(format!(
                "duplicate {level} id {}",
                header.id
            )));
        }
        if !header.mutation.is_deleted() {
            live.insert(header.id.clone());
        }
    }
    Ok(live)
}

fn check_parents<N: HasHeader>(
    level: &str,
    parent_level: &str,
    planned: &[Planned<'_, N>],
    live_parents: &HashSet<NodeId>,
) -> Result<(), ReconcileError> {
    for p in planned {
        let header = p.node.header();
        if header.mutation.is_deleted() {
            continue;
        }
        if let Some(parent) = &p.parent {
            if !live_parents.contains(parent) {
                return Err(ReconcileError::InvalidTree(format!(
                    "{level} {} references {parent_level} {parent} which is missing or deleted",
                    header.id
                )));
            }
        }
    }
    Ok(())
}

fn assign_positions<N: HasHeader>(planned: &mut [Planned<'_, N>]) {
    let mut groups: HashMap<Option<NodeId>, Vec<(usize, i64)>> = HashMap::new();
    for (idx, p) in planned.iter().enumerate() {
        let header = p.node.header();
        if !header.mutation.is_deleted() {
            groups
                .entry(p.parent.clone())
                .or_default()
                .push((idx, header.position));
        }
    }
    for live in groups.values() {
        for (idx, rank) in dense_ranks(live) {
            planned[idx].position = Some(rank);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Mutation;

    fn module(id: &str, position: i64, mutation: Mutation, lessons: Vec<LessonNode>) -> ModuleNode {
        ModuleNode {
            header: NodeHeader {
                mutation,
                ..NodeHeader::new(NodeId::parse(id).expect("id"), position)
            },
            name: id.to_string(),
            description: String::new(),
            lessons,
        }
    }

    fn lesson(id: &str, parent: Option<&str>, position: i64, mutation: Mutation) -> LessonNode {
        LessonNode {
            header: NodeHeader {
                id: NodeId::parse(id).expect("id"),
                parent_id: parent.map(|p| NodeId::parse(p).expect("id")),
                position,
                mutation,
            },
            name: id.to_string(),
            video_url: None,
            video_type: None,
            text_content: None,
            resources: Vec::new(),
        }
    }

    #[test]
    fn ranks_are_dense_and_stable() {
        assert_eq!(
            dense_ranks(&[(0, 5), (1, 2), (2, 5), (3, -1)]),
            vec![(3, 0), (1, 1), (0, 2), (2, 3)]
        );
    }

    #[test]
    fn gaps_and_deleted_siblings_are_closed_up() {
        let mut tree = ClassroomTree::new(1);
        tree.modules = vec![
            module("10", 0, Mutation::Deleted, vec![]),
            module("11", 4, Mutation::Clean, vec![]),
            module("m-new", 2, Mutation::Clean, vec![lesson("l-a", None, 9, Mutation::Clean)]),
        ];
        let plan = plan(&tree).expect("plan");
        let positions: Vec<Option<i64>> = plan.modules.iter().map(|p| p.position).collect();
        assert_eq!(positions, vec![None, Some(1), Some(0)]);
        assert_eq!(plan.lessons[0].position, Some(0));
        assert_eq!(plan.lessons[0].parent, Some(NodeId::parse("m-new").expect("id")));
    }

    #[test]
    fn moved_lessons_are_grouped_under_their_declared_parent() {
        let mut tree = ClassroomTree::new(1);
        tree.modules = vec![
            module("1", 0, Mutation::Clean, vec![lesson("20", None, 0, Mutation::Clean)]),
            module(
                "2",
                1,
                Mutation::Clean,
                vec![lesson("21", Some("1"), 0, Mutation::Moved)],
            ),
        ];
        let plan = plan(&tree).expect("plan");
        assert_eq!(plan.lessons[0].position, Some(0));
        assert_eq!(plan.lessons[1].position, Some(1));
    }

    #[test]
    fn live_children_of_deleted_parents_are_rejected() {
        let mut tree = ClassroomTree::new(1);
        tree.modules = vec![module(
            "1",
            0,
            Mutation::Deleted,
            vec![lesson("20", None, 0, Mutation::Clean)],
        )];
        assert!(matches!(plan(&tree), Err(ReconcileError::InvalidTree(_))));

        tree.modules[0].lessons[0].header.mutation = Mutation::Deleted;
        assert!(plan(&tree).is_ok());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut tree = ClassroomTree::new(1);
        tree.modules = vec![
            module("m-x", 0, Mutation::Clean, vec![]),
            module("m-x", 1, Mutation::Clean, vec![]),
        ];
        assert!(matches!(plan(&tree), Err(ReconcileError::InvalidTree(_))));
    }

    #[test]
    fn resources_stay_under_their_enclosing_lesson() {
        let mut l = lesson("20", None, 0, Mutation::Clean);
        l.resources.push(ResourceNode {
            header: NodeHeader {
                parent_id: Some(NodeId::parse("20").expect("id")),
                ..NodeHeader::new(NodeId::parse("30").expect("id"), 0)
            },
            kind: ResourceKind::Link,
            url: crate::node::AssetRef::Url("https://example.com".to_string()),
            display_name: "docs".to_string(),
            file_type: None,
            file_size: None,
        });
        let mut tree = ClassroomTree::new(1);
        tree.modules = vec![module(
            "1",
            0,
            Mutation::Clean,
            vec![l, lesson("21", None, 1, Mutation::Clean)],
        )];
        assert!(plan(&tree).is_ok());

        let resource = &mut tree.modules[0].lessons[0].resources[0];
        resource.header.parent_id = Some(NodeId::parse("21").expect("id"));
        assert!(matches!(plan(&tree), Err(ReconcileError::InvalidTree(_))));

        tree.modules[0].lessons[0].resources[0].header.mutation = Mutation::Deleted;
        assert!(plan(&tree).is_ok());
    }
}
