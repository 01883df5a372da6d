use std::collections::HashSet;

use crate::docs::types::Document;

/// Marks the start of the locally built source list in a composed answer.
pub const SOURCES_HEADING: &str = "\n\n**Sources:**\n";

/// Short label from the last non-empty URL path segment.
pub fn url_label(url: &str) -> &str {
    url.trim_end_matches('/')
        .rsplit('/')
        .find(|s| !s.is_empty())
        .unwrap_or(url)
}

/// Render the trailing source list for the documents shown to the writer.
///
/// Numbers match the `[i]` labels used in the writer's context (1-based), so
/// entries without a URL leave a gap rather than shifting later numbers.
/// Returns an empty string when no document has a URL.
pub fn render_references(docs: &[&Document]) -> String {
    let mut seen = HashSet::new();
    let mut lines = Vec::new();

    for (i, doc) in docs.iter().enumerate() {
        let Some(url) = doc.url.as_deref().map(str::trim).filter(|u| !u.is_empty()) else {
            continue;
        };
        if !seen.insert(url.to_lowercase()) {
            continue;
        }
        let title = doc
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| url_label(url));
        lines.push(format!("{}. [{}]({})", i + 1, title, url));
    }

    if lines.is_empty() {
        return String::new();
    }
    format!("{}{}\n", SOURCES_HEADING, lines.join("\n"))
}
