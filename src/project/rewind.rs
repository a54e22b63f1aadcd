//! Rewind: discard chapters and contracts from a cutoff onward.

use tracing::info;

use super::{rebuild_ledger_from_chapters, Project};

/// What a rewind removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RewindReport {
    pub removed_chapters: usize,
    pub removed_contracts: usize,
}

/// Delete every chapter and contract with `index >= chapter_index`, then
/// rebuild the ledger from the retained prefix. This is the only path that
/// invalidates chapter state.
pub fn clear_and_rewind_from_chapter(project: &mut Project, chapter_index: u32) -> RewindReport {
    let chapters_before = project.chapters.len();
    let contracts_before = project.chapter_contracts.len();

    project.chapters.retain(|c| c.index < chapter_index);
    project
        .chapter_contracts
        .retain(|c| c.index.is_some_and(|i| i < chapter_index));
    project.continuity_ledger = rebuild_ledger_from_chapters(&project.chapters, Some(chapter_index));

    let report = RewindReport {
        removed_chapters: chapters_before - project.chapters.len(),
        removed_contracts: contracts_before - project.chapter_contracts.len(),
    };
    info!(
        project = %project.id,
        from = chapter_index,
        removed_chapters = report.removed_chapters,
        removed_contracts = report.removed_contracts,
        "rewound project"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::{
        Bible, Brief, ChapterContract, Continuity, ContinuityLedger, Inputs, Outline,
    };
    use serde_json::json;

    fn drafted_project(count: u32) -> Project {
        let mut project = Project::new(Inputs {
            total_chapters: count,
            ..Inputs::default()
        });
        project.apply_brief_and_bible(Brief::default(), Bible::default());
        let outline: Outline = serde_json::from_value(json!({
            "chapterSummaries": (0..count).map(|i| json!({"index": i})).collect::<Vec<_>>()
        }))
        .unwrap();
        let contracts: Vec<ChapterContract> = (0..count)
            .map(|i| ChapterContract {
                index: Some(i),
                ..ChapterContract::default()
            })
            .collect();
        project.apply_outline(outline, contracts);

        for i in 0..count {
            let chapter = project.chapter_mut(i).unwrap();
            chapter.draft_text = format!("prose {}", i);
            let mut facts = Continuity::default();
            facts
                .characters_state
                .insert("Alice".into(), format!("state {}", i));
            facts.timeline_events.push(format!("event {}", i));
            facts.open_loops.push(format!("loop {}", i));
            chapter.continuity = Some(facts);
        }
        project.rebuild_ledger();
        project
    }

    #[test]
    fn test_rewind_prefix_invariant_for_every_cutoff() {
        for k in 0..=5 {
            let mut project = drafted_project(4);
            clear_and_rewind_from_chapter(&mut project, k);

            assert!(project.chapters.iter().all(|c| c.index < k));
            assert!(project
                .chapter_contracts
                .iter()
                .all(|c| c.index.is_some_and(|i| i < k)));

            let prefix: Vec<_> = project
                .chapters
                .iter()
                .filter(|c| c.index < k)
                .cloned()
                .collect();
            assert_eq!(
                project.continuity_ledger,
                rebuild_ledger_from_chapters(&prefix, None)
            );
        }
    }

    #[test]
    fn test_rewind_reports_removed_counts() {
        let mut project = drafted_project(3);
        let report = clear_and_rewind_from_chapter(&mut project, 1);
        assert_eq!(
            report,
            RewindReport {
                removed_chapters: 2,
                removed_contracts: 2
            }
        );
        assert_eq!(project.continuity_ledger.characters_state["Alice"], "state 0");
        assert_eq!(project.continuity_ledger.timeline, vec!["event 0"]);
    }

    #[test]
    fn test_rewind_to_zero_clears_ledger() {
        let mut project = drafted_project(2);
        clear_and_rewind_from_chapter(&mut project, 0);
        assert!(project.chapters.is_empty());
        assert_eq!(project.continuity_ledger, ContinuityLedger::default());
        assert!(project.outline.is_some());
    }
}
