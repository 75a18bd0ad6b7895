//! Visible-text extraction from HTML.

use scraper::{Html, Node};

/// Elements whose text never counts as visible content.
const SKIPPED_ELEMENTS: [&str; 2] = ["script", "style"];

/// Extract the visible text of an HTML document.
///
/// Script and style contents are dropped, the remaining text nodes are
/// trimmed and joined with single spaces, and the result is passed through
/// [`normalize_whitespace`].
pub fn extract_visible_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut parts: Vec<&str> = Vec::new();

    for node in document.root_element().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| match a.value() {
            Node::Element(el) => SKIPPED_ELEMENTS.contains(&el.name()),
            _ => false,
        });
        if hidden {
            continue;
        }
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            parts.push(trimmed);
        }
    }

    normalize_whitespace(&parts.join(" "))
}

/// Collapse every whitespace run to one space and trim both ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
