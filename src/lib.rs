//! Section-by-section generation of Detailed Project Reports for MSME ideas.

pub mod cli;
pub mod config;
pub mod errors;
pub mod export;
pub mod log;
pub mod model;
pub mod normalize;
pub mod placeholder;
pub mod prompt;
pub mod provider;
pub mod report;
pub mod store;
pub mod ux;
pub mod wire;
pub mod wizard;

pub use errors::DprError;
pub use model::{ChapterList, ReportProject, VariableMap};
pub use store::{MemoryStore, ProgressStore, SqliteStore};
pub use wizard::{ChapterView, Phase, ReportSession, Wizard};
