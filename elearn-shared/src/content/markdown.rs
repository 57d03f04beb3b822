/// Markdown rendering
///
/// Parsing is delegated to `pulldown-cmark` (tables, footnotes,
/// strikethrough, task lists and heading attributes enabled) and the
/// resulting HTML is cleaned by `ammonia` before it leaves the server.
/// Soft line breaks are rendered as hard breaks so that authors' single
/// newlines survive.
///
/// # Example
///
/// ```
/// use elearn_shared::content::markdown::render_markdown;
///
/// let html = render_markdown("# Ownership\n\nEvery value has **one** owner.");
/// assert!(html.contains("<h1>Ownership</h1>"));
/// assert!(html.contains("<strong>one</strong>"));
/// ```

use pulldown_cmark::{html, Event, Options, Parser, TagEnd};

fn options() -> Options {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);
    options.insert(Options::ENABLE_HEADING_ATTRIBUTES);
    options
}

/// Renders Markdown to sanitized HTML
pub fn render_markdown(source: &str) -> String {
    let parser = Parser::new_ext(source, options()).map(|event| match event {
        Event::SoftBreak => Event::HardBreak,
        other => other,
    });

    let mut unsafe_html = String::with_capacity(source.len() * 3 / 2);
    html::push_html(&mut unsafe_html, parser);

    ammonia::clean(&unsafe_html)
}

/// Plain-text excerpt of a Markdown document, cut on a word boundary
pub fn excerpt(source: &str, max_chars: usize) -> String {
    let text: String = Parser::new_ext(source, options())
        .filter_map(|event| match event {
            Event::Text(text) | Event::Code(text) => Some(text.into_string()),
            Event::SoftBreak | Event::HardBreak => Some(" ".to_string()),
            Event::End(
                TagEnd::Paragraph | TagEnd::Heading(_) | TagEnd::Item | TagEnd::CodeBlock,
            ) => Some(" ".to_string()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("");

    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if text.chars().count() <= max_chars {
        return text;
    }

    let mut cut: String = text.chars().take(max_chars).collect();
    if let Some(space) = cut.rfind(' ') {
        cut.truncate(space);
    }
    format!("{}…", cut.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_renders_basic_markdown() {
        let html = render_markdown("Some *emphasis* and `code`.");
        assert!(html.contains("<em>emphasis</em>"));
        assert!(html.contains("<code>code</code>"));
    }

    #[test]
    fn test_soft_breaks_become_line_breaks() {
        let html = render_markdown("line one\nline two");
        assert!(html.contains("<br"));
        assert!(html.contains("line two"));
    }

    #[test]
    fn test_tables() {
        let html = render_markdown("| a | b |\n|---|---|\n| 1 | 2 |");
        assert!(html.contains("<table>"));
        assert!(html.contains("<td>1</td>"));
    }

    #[test]
    fn test_strikethrough() {
        let html = render_markdown("~~gone~~");
        assert!(html.contains("<del>gone</del>"));
    }

    #[test]
    fn test_strips_scripts_and_handlers() {
        let html = render_markdown("<script>alert(1)</script>\n\n<img src=\"x.png\" onerror=\"alert(1)\">");
        assert!(!html.contains("<script"));
        assert!(!html.contains("onerror"));
    }

    #[test]
    fn test_strips_javascript_links() {
        let html = render_markdown("[click](javascript:alert(1))");
        assert!(!html.contains("javascript:"));
    }

    #[test]
    fn test_excerpt() {
        assert_eq!(excerpt("# Title\n\nShort **body**.", 100), "Title Short body.");
        let long = excerpt("alpha beta gamma delta", 12);
        assert_eq!(long, "alpha beta…");
    }
}
