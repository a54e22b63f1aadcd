//! Stage outputs authored by the model: brief, bible, outline and contracts.
//!
//! Unknown fields are ignored; free-text fields go through the lenient
//! deserializers so a model answering with a list where a string was
//! asked for does not sink the whole stage.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::lenient;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Brief {
    #[serde(default, deserialize_with = "lenient::optional_text")]
    pub title_suggestion: Option<String>,
    #[serde(default, deserialize_with = "lenient::optional_text")]
    pub one_sentence_hook: Option<String>,
    #[serde(default, deserialize_with = "lenient::optional_text")]
    pub core_concept: Option<String>,
    #[serde(default, deserialize_with = "lenient::text_list")]
    pub themes: Vec<String>,
    #[serde(default, deserialize_with = "lenient::optional_text")]
    pub target_audience_label: Option<String>,
    #[serde(default, deserialize_with = "lenient::optional_text")]
    pub positioning: Option<String>,
    #[serde(default, deserialize_with = "lenient::text_list")]
    pub comparable_titles: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BibleCharacter {
    #[serde(default, deserialize_with = "lenient::text")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub role: String,
    #[serde(default, deserialize_with = "lenient::text_list")]
    pub traits: Vec<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub wants: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub fears: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub voice_notes: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub appearance: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BibleLocation {
    #[serde(default, deserialize_with = "lenient::text")]
    pub name: String,
    #[serde(rename = "type", default, deserialize_with = "lenient::text")]
    pub kind: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub sensory_notes: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub rules: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bible {
    #[serde(default)]
    pub characters: Vec<BibleCharacter>,
    #[serde(default)]
    pub locations: Vec<BibleLocation>,
    #[serde(default, deserialize_with = "lenient::text_list")]
    pub world_rules: Vec<String>,
    #[serde(default, deserialize_with = "lenient::text_list")]
    pub timeline_seed: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterSummary {
    #[serde(default, deserialize_with = "lenient::optional_index")]
    pub index: Option<u32>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub summary: String,
    #[serde(default, deserialize_with = "lenient::text_list")]
    pub beats: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Outline {
    #[serde(default, deserialize_with = "lenient::optional_text")]
    pub overall_arc: Option<String>,
    #[serde(default, deserialize_with = "lenient::text_list")]
    pub act_structure: Vec<String>,
    #[serde(default)]
    pub chapter_summaries: Vec<ChapterSummary>,
}

impl Outline {
    pub fn summary_for(&self, index: u32) -> Option<&ChapterSummary> {
        self.chapter_summaries
            .iter()
            .find(|s| s.index == Some(index))
    }

    /// Indices the outline plans, ascending
    pub fn planned_indices(&self) -> Vec<u32> {
        let mut indices: Vec<u32> = self
            .chapter_summaries
            .iter()
            .filter_map(|s| s.index)
            .collect();
        indices.sort_unstable();
        indices.dedup();
        indices
    }
}

/// Per-chapter drafting constraints produced by the outline stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterContract {
    #[serde(default, deserialize_with = "lenient::optional_index")]
    pub index: Option<u32>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient::text_list")]
    pub must_include: Vec<String>,
    #[serde(default, deserialize_with = "lenient::text_list")]
    pub must_avoid: Vec<String>,
    #[serde(default, deserialize_with = "lenient::text_list")]
    pub continuity_focus: Vec<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub ending_hook_intent: String,
}

/// Renumber summaries to `0..n` (stable by the model's index, positional when
/// missing), cap at `total_chapters`, and re-key contracts through the same
/// mapping. Contracts that point at no surviving chapter are dropped.
pub fn renumber_outline(
    mut outline: Outline,
    contracts: Vec<ChapterContract>,
    total_chapters: u32,
) -> (Outline, Vec<ChapterContract>) {
    let mut keyed: Vec<(u32, usize, ChapterSummary)> = outline
        .chapter_summaries
        .into_iter()
        .enumerate()
        .map(|(pos, s)| (s.index.unwrap_or(pos as u32), pos, s))
        .collect();
    keyed.sort_by_key(|(original, pos, _)| (*original, *pos));
    keyed.truncate(total_chapters as usize);

    let mut mapping: HashMap<u32, u32> = HashMap::new();
    let mut summaries = Vec::with_capacity(keyed.len());
    for (new_index, (original, _, mut summary)) in keyed.into_iter().enumerate() {
        let new_index = new_index as u32;
        mapping.entry(original).or_insert(new_index);
        summary.index = Some(new_index);
        if summary.title.is_empty() {
            summary.title = format!("Chapter {}", new_index + 1);
        }
        summaries.push(summary);
    }
    outline.chapter_summaries = summaries;

    let mut rekeyed: Vec<ChapterContract> = contracts
        .into_iter()
        .enumerate()
        .filter_map(|(pos, mut contract)| {
            let original = contract.index.unwrap_or(pos as u32);
            let new_index = *mapping.get(&original)?;
            contract.index = Some(new_index);
            Some(contract)
        })
        .collect();
    rekeyed.sort_by_key(|c| c.index);
    rekeyed.dedup_by_key(|c| c.index);

    (outline, rekeyed)
}
