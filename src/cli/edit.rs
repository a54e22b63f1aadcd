//! Edit command: store a human edit and/or user-authored continuity facts

use anyhow::{Context, Result};
use std::path::Path;

use crate::generate::Orchestrator;
use crate::llm::LanguageModel;
use crate::project::Continuity;

pub fn run<M: LanguageModel>(
    orc: &Orchestrator<M>,
    query: &str,
    index: u32,
    text_file: Option<&Path>,
    continuity_file: Option<&Path>,
) -> Result<()> {
    if text_file.is_none() && continuity_file.is_none() {
        anyhow::bail!("Nothing to edit: pass --file and/or --continuity");
    }
    let id = orc.store().resolve_id(query)?;

    if let Some(path) = text_file {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let project = orc.set_user_text(&id, index, text)?;
        let approved = project.chapter(index).is_some_and(|c| c.approved);
        println!(
            "Saved edit for chapter {} ({})",
            index,
            if approved { "approved" } else { "not approved: edit too short" }
        );
    }

    if let Some(path) = continuity_file {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let continuity: Continuity = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid continuity JSON in {}", path.display()))?;
        orc.set_user_continuity(&id, index, continuity)?;
        println!("Replaced continuity for chapter {}; ledger rebuilt", index);
    }
    Ok(())
}
