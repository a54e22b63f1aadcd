//! Project commands: new, list, show, delete

use anyhow::Result;

use crate::project::{Inputs, Project};
use crate::store::ProjectStore;

pub fn create(store: &ProjectStore, inputs: Inputs) -> Result<()> {
    let project = Project::new(inputs);
    store.create(&project)?;
    println!(
        "Project '{}' created with ID: {}",
        project.title(),
        project.id
    );
    Ok(())
}

pub fn list(store: &ProjectStore, limit: usize) -> Result<()> {
    let projects = store.list_recent(limit)?;
    if projects.is_empty() {
        println!("No projects found. Run 'storyloom new' first.");
        return Ok(());
    }

    println!(
        "{:<10} {:<30} {:<26} {}",
        "ID", "Title", "Stage", "Updated"
    );
    println!("{}", "-".repeat(90));
    for p in projects {
        let updated = if p.updated_at.len() >= 16 {
            format!("{} {}", &p.updated_at[..10], &p.updated_at[11..16])
        } else {
            p.updated_at.clone()
        };
        println!(
            "{:<10} {:<30} {:<26} {}",
            &p.id[..8],
            truncate(&p.title, 30),
            p.stage,
            updated
        );
    }
    Ok(())
}

pub fn show(store: &ProjectStore, query: &str, chapter: Option<u32>) -> Result<()> {
    let id = store.resolve_id(query)?;
    let project = store.get(&id)?.project;

    if let Some(index) = chapter {
        let chapter = project
            .chapter(index)
            .ok_or_else(|| anyhow::anyhow!("Chapter {} not found in '{}'", index, project.title()))?;
        println!("\n{}", "=".repeat(80));
        println!("Chapter {}: {}", chapter.index, chapter.title);
        println!(
            "Approved: {} | Edited: {}",
            chapter.approved,
            !chapter.user_text.is_empty()
        );
        println!("{}", "=".repeat(80));
        let text = chapter.effective_text();
        if text.is_empty() {
            println!("\n[Not drafted yet]");
        } else {
            println!("\n{}", text);
        }
        return Ok(());
    }

    println!("\n{}", "=".repeat(80));
    println!("{} ({})", project.title(), project.id);
    println!("Stage: {}", project.stage());
    if let Some(hook) = project.brief.as_ref().and_then(|b| b.one_sentence_hook.as_deref()) {
        println!("Hook: {}", hook);
    }
    if let Some(concept) = &project.inputs.core_concept {
        println!("Concept: {}", concept);
    }
    println!("{}", "=".repeat(80));

    if project.chapters.is_empty() {
        println!("\nNo chapters yet. Run 'storyloom outline' or 'storyloom next'.");
    } else {
        println!("\n{:<6} {:<40} {:<8} {:<8} {}", "Index", "Title", "Drafted", "Edited", "Approved");
        println!("{}", "-".repeat(80));
        for c in &project.chapters {
            println!(
                "{:<6} {:<40} {:<8} {:<8} {}",
                c.index,
                truncate(&c.title, 40),
                yes_no(c.is_drafted()),
                yes_no(!c.user_text.is_empty()),
                yes_no(c.approved)
            );
        }
    }

    let ledger = &project.continuity_ledger;
    if !ledger.is_empty() {
        println!("\nContinuity ledger");
        println!("{}", "-".repeat(40));
        for (name, state) in &ledger.characters_state {
            println!("  👤 {}: {}", name, state);
        }
        for (name, state) in &ledger.locations_state {
            println!("  📍 {}: {}", name, state);
        }
        println!("  🕰  {} timeline events", ledger.timeline.len());
        for open_loop in &ledger.open_loops {
            println!("  🧵 {}", open_loop);
        }
    }
    Ok(())
}

pub fn delete(store: &ProjectStore, query: &str) -> Result<()> {
    let id = store.resolve_id(query)?;
    store.delete(&id)?;
    println!("Deleted project {}", id);
    Ok(())
}

fn truncate(text: &str, max: usize) -> String {
    let line = text.lines().next().unwrap_or(text);
    if line.chars().count() > max {
        let cut: String = line.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    } else {
        line.to_string()
    }
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}
