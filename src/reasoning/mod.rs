//! ReAct-style reasoning traces and knowledge-graph export.

mod trace;
mod visualize;

pub use trace::{ReActStep, ReActStepKind, ReActTrace};
pub use visualize::{to_graphml, to_json};
