//! Store operations and the mutation-flag interpreter.

use serde::Serialize;

use crate::{node::Mutation, types::Classification};

/// The single store action derived for one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Operation {
    /// Write a new row.
    Insert,
    /// Rewrite every editable column plus parent and position.
    Update,
    /// Remove the row.
    Delete,
    /// Rewrite parent and position only.
    UpdateOrder,
    /// No store mutation.
    Skip,
}

/// Result of comparing a clean node's stored placement with its planned one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementCheck {
    /// No lookup was made.
    NotChecked,
    /// Stored parent and position equal the planned ones.
    Matches,
    /// Stored placement differs; order must be resynced.
    Drifted,
}

/// True when [`interpret`] can only decide after a placement lookup.
pub fn needs_placement_check(classification: Classification, mutation: Mutation) -> bool {
    matches!(
        (classification, mutation),
        (Classification::Persisted, Mutation::Clean)
    )
}

/// Derives exactly one [`Operation`].
///
/// Structural identity (create/delete) dominates field edits, and pure
/// order or parent changes never become full rewrites.
pub fn interpret(
    classification: Classification,
    mutation: Mutation,
    placement: PlacementCheck,
) -> Operation {
    use Classification::{Pending, Persisted};

    match (classification, mutation) {
        (Pending, Mutation::Deleted) => Operation::Skip,
        (Persisted, Mutation::Deleted) => Operation::Delete,
        (Pending, _) => Operation::Insert,
        (Persisted, Mutation::Edited) => Operation::Update,
        (Persisted, Mutation::Reordered | Mutation::Moved) => Operation::UpdateOrder,
        (Persisted, Mutation::Clean) => match placement {
            PlacementCheck::Drifted => Operation::UpdateOrder,
            PlacementCheck::Matches | PlacementCheck::NotChecked => Operation::Skip,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Mutation; 5] = [
        Mutation::Clean,
        Mutation::Reordered,
        Mutation::Moved,
        Mutation::Edited,
        Mutation::Deleted,
    ];

    #[test]
    fn pending_nodes_insert_unless_deleted() {
        for m in ALL {
            let expected = if m.is_deleted() {
                Operation::Skip
            } else {
                Operation::Insert
            };
            assert_eq!(
                interpret(Classification::Pending, m, PlacementCheck::Drifted),
                expected
            );
        }
    }

    #[test]
    fn persisted_priority_order() {
        let p = Classification::Persisted;
        assert_eq!(interpret(p, Mutation::Deleted, PlacementCheck::NotChecked), Operation::Delete);
        assert_eq!(interpret(p, Mutation::Edited, PlacementCheck::NotChecked), Operation::Update);
        assert_eq!(interpret(p, Mutation::Moved, PlacementCheck::NotChecked), Operation::UpdateOrder);
        assert_eq!(
            interpret(p, Mutation::Reordered, PlacementCheck::NotChecked),
            Operation::UpdateOrder
        );
        assert_eq!(interpret(p, Mutation::Clean, PlacementCheck::Matches), Operation::Skip);
    }

    #[test]
    fn clean_persisted_nodes_resync_drifted_order() {
        assert!(needs_placement_check(Classification::Persisted, Mutation::Clean));
        assert!(!needs_placement_check(Classification::Persisted, Mutation::Moved));
        assert!(!needs_placement_check(Classification::Pending, Mutation::Clean));
        assert_eq!(
            interpret(Classification::Persisted, Mutation::Clean, PlacementCheck::Drifted),
            Operation::UpdateOrder
        );
    }
}
