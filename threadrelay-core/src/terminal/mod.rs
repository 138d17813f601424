//! Terminal side of the pipeline: snapshot classification, prompt dedup and
//! prompt notifications.

pub mod classify;
pub mod dedup;
pub mod prompt;

pub use classify::{classify, StateClassifier};
pub use dedup::InteractiveTracker;
pub use prompt::{parse_question_options, render_exit, render_prompt};
