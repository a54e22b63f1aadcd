//! Continuity facts and the project-wide continuity ledger.
//!
//! The ledger is never authored directly. It is either merged from one new
//! chapter's facts or rebuilt by folding every chapter's facts in index
//! order, so "later chapter wins" holds for character and location state.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use super::lenient;
use super::Chapter;

/// Who produced a chapter's continuity facts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContinuitySource {
    Model,
    ModelRegenerate,
    User,
}

impl ContinuitySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContinuitySource::Model => "model",
            ContinuitySource::ModelRegenerate => "model-regenerate",
            ContinuitySource::User => "user",
        }
    }
}

/// Chapter-scoped continuity facts emitted alongside a draft
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Continuity {
    #[serde(default, deserialize_with = "lenient::optional_text")]
    pub chapter_summary: Option<String>,

    #[serde(default, deserialize_with = "lenient::text_map")]
    pub characters_state: BTreeMap<String, String>,

    #[serde(default, deserialize_with = "lenient::text_map")]
    pub locations_state: BTreeMap<String, String>,

    #[serde(default, deserialize_with = "lenient::text_list")]
    pub timeline_events: Vec<String>,

    #[serde(default, deserialize_with = "lenient::text_list")]
    pub open_loops: Vec<String>,

    #[serde(default, deserialize_with = "lenient::optional_text")]
    pub style_notes: Option<String>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::optional_tag"
    )]
    pub source: Option<ContinuitySource>,
}

impl Continuity {
    pub fn tagged(mut self, source: ContinuitySource) -> Self {
        self.source = Some(source);
        self
    }
}

/// Rolling "last known state" of the story
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinuityLedger {
    #[serde(default)]
    pub characters_state: BTreeMap<String, String>,

    #[serde(default)]
    pub locations_state: BTreeMap<String, String>,

    /// Chronological by chapter; duplicates allowed
    #[serde(default)]
    pub timeline: Vec<String>,

    /// Deduplicated; existing order first, then new items as first seen
    #[serde(default)]
    pub open_loops: Vec<String>,
}

impl ContinuityLedger {
    pub fn is_empty(&self) -> bool {
        self.characters_state.is_empty()
            && self.locations_state.is_empty()
            && self.timeline.is_empty()
            && self.open_loops.is_empty()
    }
}

/// Overlay one chapter's facts onto the ledger. `None` is a no-op.
pub fn merge_ledger(ledger: &mut ContinuityLedger, facts: Option<&Continuity>) {
    let Some(facts) = facts else {
        return;
    };

    for (name, state) in &facts.characters_state {
        ledger.characters_state.insert(name.clone(), state.clone());
    }
    for (name, state) in &facts.locations_state {
        ledger.locations_state.insert(name.clone(), state.clone());
    }

    ledger.timeline.extend(facts.timeline_events.iter().cloned());

    let mut seen: HashSet<String> = ledger.open_loops.iter().cloned().collect();
    for open_loop in &facts.open_loops {
        if seen.insert(open_loop.clone()) {
            ledger.open_loops.push(open_loop.clone());
        }
    }
}

/// Fold every chapter with `index < stop_before_index` into a fresh ledger,
/// in ascending index order. `None` means no cutoff.
pub fn rebuild_ledger_from_chapters(
    chapters: &[Chapter],
    stop_before_index: Option<u32>,
) -> ContinuityLedger {
    let mut ordered: Vec<&Chapter> = chapters.iter().collect();
    ordered.sort_by_key(|c| c.index);

    let mut ledger = ContinuityLedger::default();
    for chapter in ordered {
        if stop_before_index.is_some_and(|stop| chapter.index >= stop) {
            break;
        }
        merge_ledger(&mut ledger, chapter.continuity.as_ref());
    }
    ledger
}
