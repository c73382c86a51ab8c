//! Rendering of stored text into the HTML shown to viewers.

use std::borrow::Cow;

/// Escapes HTML special characters.
///
/// Returns the input unchanged when nothing needs escaping.
pub fn html_escape(s: &str) -> Cow<'_, str> {
    if s.contains(['&', '<', '>', '"', '\'']) {
        let mut escaped = String::with_capacity(s.len() + 8);
        for c in s.chars() {
            match c {
                '&' => escaped.push_str("&amp;"),
                '<' => escaped.push_str("&lt;"),
                '>' => escaped.push_str("&gt;"),
                '"' => escaped.push_str("&quot;"),
                '\'' => escaped.push_str("&#039;"),
                _ => escaped.push(c),
            }
        }
        Cow::Owned(escaped)
    } else {
        Cow::Borrowed(s)
    }
}

/// Renders a raw description into paragraphs.
///
/// Blank lines separate paragraphs and single newlines become `<br />`.
/// An empty or whitespace-only description renders as an empty string.
pub fn render_paragraphs(raw: &str) -> String {
    let normalized = raw.replace("\r\n", "\n");
    let mut out = String::new();
    for block in normalized.split("\n\n") {
        let block = block.trim();
        if block.is_empty() {
            continue;
        }
        let lines: Vec<Cow<'_, str>> = block.lines().map(|l| html_escape(l.trim())).collect();
        out.push_str("<p>");
        out.push_str(&lines.join("<br />\n"));
        out.push_str("</p>\n");
    }
    out
}

/// Renders a list of stored values as a single escaped display string.
pub fn render_values(values: &[String]) -> String {
    values
        .iter()
        .map(|v| html_escape(v).into_owned())
        .collect::<Vec<_>>()
        .join(", ")
}
