//! Request construction for each generation stage.
//!
//! Everything here is a pure function of the loaded project. The `input`
//! of every request is a JSON document; the `instructions` carry the
//! output schema the response decoders in `llm::parse` expect.

use serde_json::{json, Value};

use crate::llm::ModelRequest;
use crate::project::{Inputs, Project};

const BRIEF_BIBLE_INSTRUCTIONS: &str = "\
You are planning a long-form work of fiction. Using the style card and canon in the input, \
produce a brief and a story bible. Canon is authoritative: keep every supplied character, \
location and note. Where canon is missing, invent plausible content that fits the style card. \
Respond with a single JSON object and nothing else: \
{\"brief\": {\"titleSuggestion\", \"oneSentenceHook\", \"coreConcept\", \"themes\": [], \
\"targetAudienceLabel\", \"positioning\"}, \
\"bible\": {\"characters\": [{\"name\", \"role\", \"traits\": [], \"wants\", \"fears\", \
\"voiceNotes\", \"appearance\"}], \"locations\": [{\"name\", \"type\", \"sensoryNotes\", \
\"rules\"}], \"worldRules\": [], \"timelineSeed\": []}}";

const OUTLINE_INSTRUCTIONS: &str = "\
Outline the book described by the brief and bible in the input, using exactly the requested \
number of chapters, indexed from 0. For every chapter also write a contract that constrains \
its drafting. Respond with a single JSON object and nothing else: \
{\"outline\": {\"overallArc\", \"actStructure\": [], \"chapterSummaries\": [{\"index\", \
\"title\", \"summary\", \"beats\": []}]}, \"chapterContracts\": [{\"index\", \"title\", \
\"mustInclude\": [], \"mustAvoid\": [], \"continuityFocus\": [], \"endingHookIntent\"}]}";

const CHAPTER_INSTRUCTIONS: &str = "\
Write the chapter described in the input. Treat the outline summary and the contract as a \
set of constraints, not as text to reproduce. Preserve every established character and \
location fact in the continuity ledger and prior chapters. Stay within the word range. End \
with a hook that matches the contract's endingHookIntent. Respond with a single JSON object \
and nothing else: {\"title\", \"prose\", \"continuity\": {\"chapterSummary\", \
\"charactersState\": {\"<name>\": \"<current state>\"}, \"locationsState\": {\"<name>\": \
\"<current state>\"}, \"timelineEvents\": [], \"openLoops\": [], \"styleNotes\"}}";

const REGENERATE_NOTE: &str = "\
This chapter is being rewritten. The input includes the author's current edit of it under \
userTextPreview; keep its key beats.";

/// Whether a chapter is drafted for the first time or rewritten in place
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftMode {
    Next,
    Regenerate,
}

/// Style parameters every stage sees
pub fn style_card(inputs: &Inputs) -> Value {
    json!({
        "genre": inputs.genre,
        "tone": inputs.tone,
        "voice": inputs.voice,
        "audience": inputs.audience,
        "humourLevel": inputs.humour_level,
        "coreConcept": inputs.core_concept,
        "workingTitle": inputs.title,
        "totalChapters": inputs.total_chapters,
        "wordCount": word_range(inputs),
    })
}

fn word_range(inputs: &Inputs) -> Value {
    json!({
        "target": inputs.target_words,
        "min": inputs.min_words,
        "max": inputs.max_words,
    })
}

fn canon(inputs: &Inputs) -> Value {
    json!({
        "characters": inputs.characters,
        "locations": inputs.locations,
        "notes": inputs.notes,
    })
}

pub fn brief_and_bible_request(project: &Project) -> ModelRequest {
    let input = json!({
        "styleCard": style_card(&project.inputs),
        "canon": canon(&project.inputs),
    });
    ModelRequest {
        stage: "brief+bible",
        instructions: BRIEF_BIBLE_INSTRUCTIONS.to_string(),
        input: input.to_string(),
    }
}

pub fn outline_request(project: &Project) -> ModelRequest {
    let input = json!({
        "styleCard": style_card(&project.inputs),
        "canon": canon(&project.inputs),
        "brief": project.brief,
        "bible": project.bible,
        "chapterCount": project.inputs.total_chapters,
    });
    ModelRequest {
        stage: "outline",
        instructions: OUTLINE_INSTRUCTIONS.to_string(),
        input: input.to_string(),
    }
}

/// Ledger plus a compact view of every earlier chapter that carries text or facts
pub fn continuity_context(project: &Project, index: u32) -> Value {
    let prior: Vec<Value> = project
        .chapters
        .iter()
        .filter(|c| c.index < index)
        .filter(|c| c.continuity.is_some() || !c.effective_text().is_empty())
        .map(|c| {
            json!({
                "index": c.index,
                "title": c.title,
                "continuity": c.continuity,
            })
        })
        .collect();

    json!({
        "ledger": project.continuity_ledger,
        "priorChapters": prior,
    })
}

pub fn chapter_request(
    project: &Project,
    index: u32,
    mode: DraftMode,
    user_text_preview_chars: usize,
) -> ModelRequest {
    let summary = project
        .outline
        .as_ref()
        .and_then(|o| o.summary_for(index));

    let mut input = json!({
        "styleCard": style_card(&project.inputs),
        "brief": project.brief,
        "bible": project.bible,
        "chapterIndex": index,
        "outlineSummary": summary,
        "contract": project.contract(index),
        "continuity": continuity_context(project, index),
        "wordCount": word_range(&project.inputs),
    });

    let mut instructions = CHAPTER_INSTRUCTIONS.to_string();
    if mode == DraftMode::Regenerate {
        let preview: String = project
            .chapter(index)
            .map(|c| c.user_text.chars().take(user_text_preview_chars).collect())
            .unwrap_or_default();
        if !preview.is_empty() {
            input["userTextPreview"] = Value::String(preview);
            instructions.push(' ');
            instructions.push_str(REGENERATE_NOTE);
        }
    }

    ModelRequest {
        stage: match mode {
            DraftMode::Next => "chapter",
            DraftMode::Regenerate => "chapter-regenerate",
        },
        instructions,
        input: input.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::{Bible, Brief, Continuity, Outline};

    fn project_with_chapters() -> Project {
        let mut project = Project::new(Inputs {
            total_chapters: 3,
            genre: "gothic".into(),
            ..Inputs::default()
        });
        project.apply_brief_and_bible(Brief::default(), Bible::default());
        let outline: Outline = serde_json::from_value(json!({
            "chapterSummaries": [
                {"index": 0, "title": "Arrival", "summary": "She arrives."},
                {"index": 1, "title": "Storm", "summary": "It storms."},
                {"index": 2, "title": "Dawn", "summary": "It ends."}
            ]
        }))
        .unwrap();
        project.apply_outline(outline, vec![]);
        project
    }

    #[test]
    fn test_continuity_context_only_prior_chapters_with_content() {
        let mut project = project_with_chapters();
        let mut facts = Continuity::default();
        facts.open_loops.push("the letter".into());
        project.chapter_mut(0).unwrap().continuity = Some(facts);
        project.chapter_mut(2).unwrap().draft_text = "later".into();
        project.rebuild_ledger();

        let context = continuity_context(&project, 2);
        let prior = context["priorChapters"].as_array().unwrap();
        assert_eq!(prior.len(), 1);
        assert_eq!(prior[0]["index"], 0);
        assert_eq!(prior[0]["title"], "Arrival");
        assert!(prior[0].get("draftText").is_none());
        assert_eq!(context["ledger"]["openLoops"][0], "the letter");
    }

    #[test]
    fn test_chapter_request_carries_outline_and_word_range() {
        let project = project_with_chapters();
        let request = chapter_request(&project, 1, DraftMode::Next, 2000);
        let input: Value = serde_json::from_str(&request.input).unwrap();
        assert_eq!(request.stage, "chapter");
        assert_eq!(input["outlineSummary"]["title"], "Storm");
        assert_eq!(input["wordCount"]["target"], 2500);
        assert_eq!(input["styleCard"]["genre"], "gothic");
        assert!(input.get("userTextPreview").is_none());
    }

    #[test]
    fn test_regenerate_request_bounds_user_text_preview() {
        let mut project = project_with_chapters();
        project.chapter_mut(1).unwrap().user_text = "é".repeat(3000);
        let request = chapter_request(&project, 1, DraftMode::Regenerate, 2000);
        let input: Value = serde_json::from_str(&request.input).unwrap();
        let preview = input["userTextPreview"].as_str().unwrap();
        assert_eq!(preview.chars().count(), 2000);
        assert!(request.instructions.contains("userTextPreview"));
    }
}
