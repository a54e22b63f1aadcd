//! Export command implementation

use anyhow::{Context, Result};
use std::path::Path;

use crate::export::to_markdown;
use crate::store::ProjectStore;

pub fn run(store: &ProjectStore, query: &str, output: Option<&Path>) -> Result<()> {
    let id = store.resolve_id(query)?;
    let project = store.get(&id)?.project;
    let markdown = to_markdown(&project);

    match output {
        Some(path) => {
            std::fs::write(path, &markdown)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Exported '{}' to {}", project.title(), path.display());
        }
        None => print!("{}", markdown),
    }
    Ok(())
}
