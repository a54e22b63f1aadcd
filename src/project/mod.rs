//! Project aggregate and chapter record store
//!
//! A project is persisted as one JSON document. The continuity ledger inside
//! it is derived data: every mutation site below either merges one chapter's
//! facts or rebuilds the ledger from the chapter list.

mod ledger;
pub(crate) mod lenient;
mod outline;
mod rewind;

pub use ledger::{
    merge_ledger, rebuild_ledger_from_chapters, Continuity, ContinuityLedger, ContinuitySource,
};
pub use outline::{
    renumber_outline, Bible, BibleCharacter, BibleLocation, Brief, ChapterContract,
    ChapterSummary, Outline,
};
pub use rewind::{clear_and_rewind_from_chapter, RewindReport};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Default minimum length (exclusive) of `userText` for a chapter to count as approved
pub const APPROVAL_THRESHOLD: usize = 50;

/// Generation parameters and user canon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Inputs {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub genre: String,
    #[serde(default)]
    pub tone: String,
    #[serde(default)]
    pub voice: String,
    #[serde(default)]
    pub audience: String,
    #[serde(default)]
    pub humour_level: String,

    pub total_chapters: u32,
    pub target_words: u32,
    pub min_words: u32,
    pub max_words: u32,

    #[serde(default)]
    pub core_concept: Option<String>,

    // Canon: authoritative over anything the model invents
    #[serde(default)]
    pub characters: String,
    #[serde(default)]
    pub locations: String,
    #[serde(default)]
    pub notes: String,
}

impl Default for Inputs {
    fn default() -> Self {
        Self {
            title: None,
            genre: String::new(),
            tone: String::new(),
            voice: String::new(),
            audience: String::new(),
            humour_level: String::new(),
            total_chapters: 12,
            target_words: 2500,
            min_words: 2000,
            max_words: 3200,
            core_concept: None,
            characters: String::new(),
            locations: String::new(),
            notes: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    pub index: u32,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub draft_text: String,
    #[serde(default)]
    pub user_text: String,
    #[serde(default)]
    pub continuity: Option<Continuity>,
    #[serde(default)]
    pub approved: bool,
}

impl Chapter {
    pub fn shell(index: u32, title: impl Into<String>) -> Self {
        Self {
            index,
            title: title.into(),
            draft_text: String::new(),
            user_text: String::new(),
            continuity: None,
            approved: false,
        }
    }

    /// User edit if present, else the draft, else empty
    pub fn effective_text(&self) -> &str {
        if !self.user_text.is_empty() {
            &self.user_text
        } else {
            &self.draft_text
        }
    }

    pub fn is_drafted(&self) -> bool {
        !self.draft_text.is_empty()
    }

    pub fn refresh_approval(&mut self, threshold: usize) {
        self.approved = is_approved(&self.user_text, threshold);
    }
}

/// "The user has meaningfully edited this chapter". Whitespace-trimmed
/// length must strictly exceed `threshold`.
pub fn is_approved(user_text: &str, threshold: usize) -> bool {
    user_text.trim().chars().count() > threshold
}

/// Where a project sits in the brief → bible → outline → chapters pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Empty,
    HasBriefBible,
    HasOutline,
    HasChapters { drafted: usize, planned: usize },
}

impl Stage {
    pub fn is_complete(&self) -> bool {
        matches!(self, Stage::HasChapters { drafted, planned } if drafted >= planned)
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Empty => write!(f, "empty"),
            Stage::HasBriefBible => write!(f, "brief+bible"),
            Stage::HasOutline => write!(f, "outlined"),
            Stage::HasChapters { drafted, planned } => {
                write!(f, "drafting ({}/{} chapters)", drafted, planned)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub inputs: Inputs,
    #[serde(default)]
    pub brief: Option<Brief>,
    #[serde(default)]
    pub bible: Option<Bible>,
    #[serde(default)]
    pub outline: Option<Outline>,
    #[serde(default)]
    pub chapter_contracts: Vec<ChapterContract>,
    #[serde(default)]
    pub chapters: Vec<Chapter>,
    #[serde(default)]
    pub continuity_ledger: ContinuityLedger,
}

impl Project {
    pub fn new(inputs: Inputs) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            inputs,
            brief: None,
            bible: None,
            outline: None,
            chapter_contracts: vec![],
            chapters: vec![],
            continuity_ledger: ContinuityLedger::default(),
        }
    }

    /// Display title: brief suggestion, then the user's working title
    pub fn title(&self) -> &str {
        self.brief
            .as_ref()
            .and_then(|b| b.title_suggestion.as_deref())
            .or(self.inputs.title.as_deref())
            .unwrap_or("Untitled")
    }

    pub fn stage(&self) -> Stage {
        if self.brief.is_none() || self.bible.is_none() {
            return Stage::Empty;
        }
        let Some(outline) = &self.outline else {
            return Stage::HasBriefBible;
        };
        let planned = outline.planned_indices();
        let drafted = planned
            .iter()
            .filter(|i| self.chapter(**i).is_some_and(Chapter::is_drafted))
            .count();
        if drafted == 0 {
            Stage::HasOutline
        } else {
            Stage::HasChapters {
                drafted,
                planned: planned.len(),
            }
        }
    }

    pub fn chapter(&self, index: u32) -> Option<&Chapter> {
        self.chapters.iter().find(|c| c.index == index)
    }

    pub fn chapter_mut(&mut self, index: u32) -> Result<&mut Chapter> {
        let project_id = self.id.clone();
        self.chapters
            .iter_mut()
            .find(|c| c.index == index)
            .ok_or(Error::ChapterNotFound { project_id, index })
    }

    pub fn contract(&self, index: u32) -> Option<&ChapterContract> {
        self.chapter_contracts
            .iter()
            .find(|c| c.index == Some(index))
    }

    /// Store brief+bible, backfilling the core concept when the user gave none.
    pub fn apply_brief_and_bible(&mut self, brief: Brief, bible: Bible) {
        let user_concept_missing = self
            .inputs
            .core_concept
            .as_deref()
            .map_or(true, |c| c.trim().is_empty());
        if user_concept_missing {
            if let Some(concept) = brief.core_concept.as_ref().filter(|c| !c.is_empty()) {
                self.inputs.core_concept = Some(concept.clone());
            }
        }
        self.brief = Some(brief);
        self.bible = Some(bible);
    }

    /// Install a new outline. Chapter progress is merged by index, never
    /// wiped, and the ledger is rebuilt from the reconciled list.
    pub fn apply_outline(&mut self, outline: Outline, contracts: Vec<ChapterContract>) {
        let (outline, contracts) =
            renumber_outline(outline, contracts, self.inputs.total_chapters);

        let previous = std::mem::take(&mut self.chapters);
        self.chapters = reconcile_chapters(previous, &outline);
        self.chapter_contracts = contracts;
        self.outline = Some(outline);
        self.rebuild_ledger();
    }

    /// Lowest planned index whose chapter is missing or undrafted
    pub fn next_undrafted_index(&self) -> Option<u32> {
        let outline = self.outline.as_ref()?;
        outline
            .planned_indices()
            .into_iter()
            .find(|i| !self.chapter(*i).is_some_and(Chapter::is_drafted))
    }

    /// Chapter at `index`, recreating an empty shell titled from the outline
    /// if a rewind removed it. Keeps `chapters` sorted by index.
    pub fn ensure_chapter(&mut self, index: u32) -> &mut Chapter {
        let position = match self.chapters.binary_search_by_key(&index, |c| c.index) {
            Ok(position) => position,
            Err(position) => {
                let title = self
                    .outline
                    .as_ref()
                    .and_then(|o| o.summary_for(index))
                    .map(|s| s.title.clone())
                    .unwrap_or_else(|| format!("Chapter {}", index + 1));
                self.chapters.insert(position, Chapter::shell(index, title));
                position
            }
        };
        &mut self.chapters[position]
    }

    pub fn rebuild_ledger(&mut self) {
        self.continuity_ledger = rebuild_ledger_from_chapters(&self.chapters, None);
    }

    /// Store a human edit. The draft is left alone.
    pub fn set_user_text(&mut self, index: u32, text: String, threshold: usize) -> Result<()> {
        let chapter = self.chapter_mut(index)?;
        chapter.user_text = text;
        chapter.refresh_approval(threshold);
        Ok(())
    }

    /// Replace a chapter's facts with user-authored ones and rebuild.
    pub fn set_user_continuity(&mut self, index: u32, continuity: Continuity) -> Result<()> {
        let chapter = self.chapter_mut(index)?;
        chapter.continuity = Some(continuity.tagged(ContinuitySource::User));
        self.rebuild_ledger();
        Ok(())
    }
}

/// The outline decides which indices exist and their titles; anything a
/// chapter already holds at a surviving index is carried over.
fn reconcile_chapters(previous: Vec<Chapter>, outline: &Outline) -> Vec<Chapter> {
    let mut by_index: HashMap<u32, Chapter> =
        previous.into_iter().map(|c| (c.index, c)).collect();

    let mut chapters: Vec<Chapter> = outline
        .chapter_summaries
        .iter()
        .filter_map(|s| s.index.map(|i| (i, s)))
        .map(|(index, summary)| match by_index.remove(&index) {
            Some(mut existing) => {
                existing.title = summary.title.clone();
                existing
            }
            None => Chapter::shell(index, summary.title.clone()),
        })
        .collect();
    chapters.sort_by_key(|c| c.index);
    chapters
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn outlined_project(count: u32) -> Project {
        let mut project = Project::new(Inputs {
            total_chapters: count,
            ..Inputs::default()
        });
        project.apply_brief_and_bible(Brief::default(), Bible::default());
        let outline: Outline = serde_json::from_value(json!({
            "chapterSummaries": (0..count)
                .map(|i| json!({"index": i, "title": format!("T{}", i)}))
                .collect::<Vec<_>>()
        }))
        .unwrap();
        project.apply_outline(outline, vec![]);
        project
    }

    #[test]
    fn test_approval_threshold_boundary() {
        let fifty = "a".repeat(50);
        let fifty_one = "a".repeat(51);
        assert!(!is_approved(&fifty, APPROVAL_THRESHOLD));
        assert!(is_approved(&fifty_one, APPROVAL_THRESHOLD));
        assert!(!is_approved(&format!("   {}\n\n", fifty), APPROVAL_THRESHOLD));
        assert!(!is_approved("", APPROVAL_THRESHOLD));
    }

    #[test]
    fn test_effective_text_prefers_user_edit() {
        let mut chapter = Chapter::shell(0, "One");
        assert_eq!(chapter.effective_text(), "");
        chapter.draft_text = "draft".into();
        assert_eq!(chapter.effective_text(), "draft");
        chapter.user_text = "edited".into();
        assert_eq!(chapter.effective_text(), "edited");
    }

    #[test]
    fn test_stage_progression() {
        let mut project = Project::new(Inputs::default());
        assert_eq!(project.stage(), Stage::Empty);

        project = outlined_project(3);
        assert_eq!(project.stage(), Stage::HasOutline);
        assert_eq!(project.chapters.len(), 3);

        project.chapter_mut(0).unwrap().draft_text = "prose".into();
        assert_eq!(
            project.stage(),
            Stage::HasChapters {
                drafted: 1,
                planned: 3
            }
        );
        assert!(!project.stage().is_complete());
    }

    #[test]
    fn test_backfills_core_concept_only_when_missing() {
        let brief = Brief {
            core_concept: Some("a lighthouse that remembers".into()),
            ..Brief::default()
        };

        let mut project = Project::new(Inputs::default());
        project.apply_brief_and_bible(brief.clone(), Bible::default());
        assert_eq!(
            project.inputs.core_concept.as_deref(),
            Some("a lighthouse that remembers")
        );

        let mut project = Project::new(Inputs {
            core_concept: Some("mine".into()),
            ..Inputs::default()
        });
        project.apply_brief_and_bible(brief, Bible::default());
        assert_eq!(project.inputs.core_concept.as_deref(), Some("mine"));
    }

    #[test]
    fn test_outline_regeneration_preserves_progress() {
        let mut project = outlined_project(5);
        {
            let chapter = project.chapter_mut(3).unwrap();
            chapter.draft_text = "the draft".into();
            chapter.user_text = "x".repeat(60);
            chapter.approved = true;
            let mut facts = Continuity::default().tagged(ContinuitySource::Model);
            facts
                .characters_state
                .insert("Alice".into(), "at sea".into());
            chapter.continuity = Some(facts);
        }
        let before = project.chapter(3).cloned().unwrap();

        let outline: Outline = serde_json::from_value(json!({
            "chapterSummaries": [
                {"index": 0, "title": "New zero"},
                {"index": 1, "title": "New one"},
                {"index": 2, "title": "New two"},
                {"index": 3, "title": "New three"}
            ]
        }))
        .unwrap();
        project.apply_outline(outline, vec![]);

        let after = project.chapter(3).unwrap();
        assert_eq!(after.draft_text, before.draft_text);
        assert_eq!(after.user_text, before.user_text);
        assert_eq!(after.continuity, before.continuity);
        assert_eq!(after.approved, before.approved);
        assert_eq!(after.title, "New three");
        assert!(project.chapter(4).is_none());
        assert_eq!(project.continuity_ledger.characters_state["Alice"], "at sea");
    }

    #[test]
    fn test_next_undrafted_recreates_missing_shell() {
        let mut project = outlined_project(3);
        project.chapter_mut(0).unwrap().draft_text = "zero".into();
        project.chapters.retain(|c| c.index == 0);

        assert_eq!(project.next_undrafted_index(), Some(1));
        let chapter = project.ensure_chapter(1);
        assert_eq!(chapter.title, "T1");
        let indices: Vec<u32> = project.chapters.iter().map(|c| c.index).collect();
        assert_eq!(indices, vec![0, 1]);
    }

    #[test]
    fn test_user_edits_do_not_touch_draft() {
        let mut project = outlined_project(2);
        project.chapter_mut(1).unwrap().draft_text = "model prose".into();
        project
            .set_user_text(1, "y".repeat(51), APPROVAL_THRESHOLD)
            .unwrap();
        let chapter = project.chapter(1).unwrap();
        assert!(chapter.approved);
        assert_eq!(chapter.draft_text, "model prose");

        let err = project.set_user_text(7, String::new(), APPROVAL_THRESHOLD);
        assert!(matches!(err, Err(Error::ChapterNotFound { index: 7, .. })));
    }

    #[test]
    fn test_user_continuity_is_tagged_and_rebuilt() {
        let mut project = outlined_project(2);
        let mut facts = Continuity::default();
        facts.open_loops.push("who lit the lamp".into());
        project.set_user_continuity(0, facts).unwrap();

        let stored = project.chapter(0).unwrap().continuity.as_ref().unwrap();
        assert_eq!(stored.source, Some(ContinuitySource::User));
        assert_eq!(project.continuity_ledger.open_loops, vec!["who lit the lamp"]);
    }

    #[test]
    fn test_document_round_trips_camel_case() {
        let project = outlined_project(1);
        let json = serde_json::to_value(&project).unwrap();
        assert!(json.get("chapterContracts").is_some());
        assert!(json.get("continuityLedger").is_some());
        assert!(json["chapters"][0].get("draftText").is_some());
        let back: Project = serde_json::from_value(json).unwrap();
        assert_eq!(back, project);
    }
}
