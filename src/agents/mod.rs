//! The model-backed stages of a research run.

pub mod citations;
pub mod cleaner;
pub mod filter;
pub mod intake;
pub mod planner;
pub mod prompts;
pub mod writer;

pub use cleaner::{apply_cleaning, Cleaner};
pub use filter::DocFilter;
pub use intake::Intake;
pub use planner::Planner;
pub use writer::Writer;
