//! Replay of a candidate onto a modification overlay.

use super::types::{Candidate, CandidateNode, ModificationType};
use crate::error::{Result, StoreError};
use crate::modification::Modification;
use crate::types::Path;

/// Replay `candidate` as operations against `modification`, reproducing the
/// candidate's after state without re-deriving intent.
///
/// Replay proceeds root-to-leaf: a write or delete short-circuits its
/// descendants. Applying the same candidate more than once to the same
/// overlay converges on the same state.
pub fn apply_to_modification(
    modification: &mut Modification,
    candidate: &Candidate,
) -> Result<()> {
    apply_node(modification, candidate.root_path(), candidate.root_node())
}

fn apply_node(
    modification: &mut Modification,
    path: &Path,
    node: &CandidateNode,
) -> Result<()> {
    match node.modification_type() {
        ModificationType::Unmodified => Ok(()),
        ModificationType::Write | ModificationType::Appeared => {
            let after = node.after().cloned().ok_or_else(|| {
                StoreError::ApplyFailure(format!(
                    "{:?} candidate node at {} has no after image",
                    node.modification_type(),
                    path
                ))
            })?;
            modification.write(path, after)
        }
        ModificationType::Delete | ModificationType::Disappeared => modification.delete(path),
        ModificationType::SubtreeModified => {
            for (segment, child) in node.children() {
                apply_node(modification, &path.child(segment.clone()), child)?;
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::diff;
    use crate::tree::{Node, Snapshot};
    use crate::types::Version;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn replayed_root(base: &Snapshot, candidate: &Candidate) -> Arc<Node> {
        let mut modification = Modification::new(base.clone());
        apply_to_modification(&mut modification, candidate).unwrap();
        modification.ready();
        modification.materialize().unwrap()
    }

    #[test]
    fn test_replay_reproduces_after_state() {
        let before = Arc::new(Node::container().with_child(
            "cars",
            Node::container().with_child("altima", Node::leaf(json!(100))),
        ));
        let after = Arc::new(
            Node::container()
                .with_child(
                    "cars",
                    Node::container().with_child("optima", Node::leaf(json!(200))),
                )
                .with_child("people", Node::container().with_child("jack", Node::leaf(json!(1)))),
        );

        let candidate = diff(&before, &after, Path::root());
        let base = Snapshot::new(before, Version(0));
        assert_eq!(replayed_root(&base, &candidate), after);
    }

    #[test]
    fn test_replay_is_idempotent() {
        let before = Arc::new(Node::container().with_child("a", Node::leaf(json!(1))));
        let after = Arc::new(Node::container().with_child("b", Node::leaf(json!(2))));
        let candidate = diff(&before, &after, Path::root());

        let base = Snapshot::new(before, Version(0));
        let mut modification = Modification::new(base);
        apply_to_modification(&mut modification, &candidate).unwrap();
        apply_to_modification(&mut modification, &candidate).unwrap();
        modification.ready();

        assert_eq!(modification.materialize().unwrap(), after);
    }

    #[test]
    fn test_replay_of_empty_candidate_records_nothing() {
        let root = Arc::new(Node::container().with_child("a", Node::leaf(json!(1))));
        let candidate = diff(&root, &root, Path::root());

        let base = Snapshot::new(root.clone(), Version(0));
        let mut modification = Modification::new(base);
        apply_to_modification(&mut modification, &candidate).unwrap();
        modification.ready();

        assert!(Arc::ptr_eq(&modification.materialize().unwrap(), &root));
    }

    #[test]
    fn test_replay_rejects_write_without_after_image() {
        let malformed = Candidate::new(
            Path::root(),
            CandidateNode::new(ModificationType::Write, None, None, BTreeMap::new()),
        );

        let mut modification = Modification::new(Snapshot::empty());
        let err = apply_to_modification(&mut modification, &malformed).unwrap_err();
        assert!(matches!(err, StoreError::ApplyFailure(_)));
    }
}
