//! Markdown rendering of a project's chapters

use crate::project::Project;

/// Title, optional hook blockquote, then every chapter in index order with
/// its effective text.
pub fn to_markdown(project: &Project) -> String {
    let mut out = format!("# {}\n\n", project.title());

    if let Some(hook) = project
        .brief
        .as_ref()
        .and_then(|b| b.one_sentence_hook.as_deref())
        .filter(|h| !h.trim().is_empty())
    {
        out.push_str(&format!("> {}\n\n", hook.trim()));
    }

    let mut chapters: Vec<_> = project.chapters.iter().collect();
    chapters.sort_by_key(|c| c.index);

    for chapter in chapters {
        let heading = if chapter.title.is_empty() {
            format!("## Chapter {}\n\n", chapter.index + 1)
        } else {
            format!("## Chapter {}: {}\n\n", chapter.index + 1, chapter.title)
        };
        out.push_str(&heading);

        let text = chapter.effective_text().trim();
        if !text.is_empty() {
            out.push_str(text);
            out.push_str("\n\n");
        }
    }

    out
}
