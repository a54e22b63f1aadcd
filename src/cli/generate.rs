//! Generation commands: brief, outline, next, regenerate, redraft, rewind

use anyhow::Result;
use std::collections::BTreeSet;

use crate::generate::Orchestrator;
use crate::llm::LanguageModel;
use crate::project::Project;

pub async fn brief<M: LanguageModel>(orc: &Orchestrator<M>, query: &str) -> Result<()> {
    let id = orc.store().resolve_id(query)?;
    println!("✍️  Generating brief and bible...");
    let project = orc.generate_brief_and_bible(&id).await?;

    if let Some(brief) = &project.brief {
        println!("Title: {}", project.title());
        if let Some(hook) = &brief.one_sentence_hook {
            println!("Hook: {}", hook);
        }
        if !brief.themes.is_empty() {
            println!("Themes: {}", brief.themes.join(", "));
        }
    }
    if let Some(bible) = &project.bible {
        println!(
            "Bible: {} characters, {} locations",
            bible.characters.len(),
            bible.locations.len()
        );
    }
    Ok(())
}

pub async fn outline<M: LanguageModel>(orc: &Orchestrator<M>, query: &str) -> Result<()> {
    let id = orc.store().resolve_id(query)?;
    println!("🗺  Generating outline...");
    let project = orc.generate_outline(&id).await?;

    if let Some(outline) = &project.outline {
        for summary in &outline.chapter_summaries {
            let index = summary.index.unwrap_or_default();
            let drafted = project.chapter(index).is_some_and(|c| c.is_drafted());
            println!(
                "  {:>3}. {}{}",
                index,
                summary.title,
                if drafted { " (drafted, kept)" } else { "" }
            );
        }
    }
    Ok(())
}

pub async fn next<M: LanguageModel>(orc: &Orchestrator<M>, query: &str) -> Result<()> {
    let id = orc.store().resolve_id(query)?;
    let before = drafted_indices(&orc.store().get(&id)?.project);
    let project = orc.generate_next_chapter(&id).await?;

    match drafted_indices(&project).difference(&before).next() {
        Some(index) => report_chapter(&project, *index),
        None => println!("All chapters are drafted ({}).", project.stage()),
    }
    Ok(())
}

pub async fn regenerate<M: LanguageModel>(
    orc: &Orchestrator<M>,
    query: &str,
    index: u32,
) -> Result<()> {
    let id = orc.store().resolve_id(query)?;
    let project = orc.regenerate_chapter(&id, index).await?;
    report_chapter(&project, index);
    Ok(())
}

pub async fn redraft<M: LanguageModel>(
    orc: &Orchestrator<M>,
    query: &str,
    index: u32,
) -> Result<()> {
    let id = orc.store().resolve_id(query)?;
    let project = orc.rewind_and_redraft(&id, index).await?;
    report_chapter(&project, index);
    Ok(())
}

pub fn rewind<M: LanguageModel>(orc: &Orchestrator<M>, query: &str, index: u32) -> Result<()> {
    let id = orc.store().resolve_id(query)?;
    let (project, report) = orc.rewind(&id, index)?;
    println!(
        "⏪ Rewound '{}' to chapter {}: removed {} chapters and {} contracts",
        project.title(),
        index,
        report.removed_chapters,
        report.removed_contracts
    );
    Ok(())
}

fn drafted_indices(project: &Project) -> BTreeSet<u32> {
    project
        .chapters
        .iter()
        .filter(|c| c.is_drafted())
        .map(|c| c.index)
        .collect()
}

fn report_chapter(project: &Project, index: u32) {
    let Some(chapter) = project.chapter(index) else {
        return;
    };
    let words = chapter.draft_text.split_whitespace().count();
    println!("✅ Chapter {}: {} ({} words)", index, chapter.title, words);
    if let Some(facts) = &chapter.continuity {
        if let Some(summary) = &facts.chapter_summary {
            println!("   {}", summary);
        }
        println!(
            "   {} character updates, {} open loops",
            facts.characters_state.len(),
            facts.open_loops.len()
        );
    }
}
