//! Candidates: ordered, replayable diffs between two tree states.

mod diff;
mod replay;
mod types;

pub use diff::diff;
pub use replay::apply_to_modification;
pub use types::{Candidate, CandidateNode, ModificationType};
