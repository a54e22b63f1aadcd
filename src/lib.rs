pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod generate;
pub mod llm;
pub mod project;
pub mod store;

pub use config::Config;
pub use error::{Error, Result};
pub use generate::Orchestrator;
pub use llm::{CommandModel, LanguageModel, ModelRequest};
pub use project::{Chapter, ContinuityLedger, Project, Stage};
pub use store::ProjectStore;
