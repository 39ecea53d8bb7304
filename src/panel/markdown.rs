//! Minimal markdown → HTML for helper answers
//!
//! Rewrites are applied in a fixed order: headers (levels 1 to 4), fenced code blocks,
//! inline code, bold, italic, blank-line paragraphs, single line breaks.
//! The result is wrapped in `<p>` unless the text opens with a header line.
//! Raw HTML in the input counts as text. This is not a markdown parser.

use lazy_static::lazy_static;
use regex::{Captures, Regex};

lazy_static! {
    static ref H4: Regex = Regex::new(r"(?m)^#### (.*?)(?:\n|$)").expect("h4 pattern compiles");
    static ref H3: Regex = Regex::new(r"(?m)^### (.*?)(?:\n|$)").expect("h3 pattern compiles");
    static ref H2: Regex = Regex::new(r"(?m)^## (.*?)(?:\n|$)").expect("h2 pattern compiles");
    static ref H1: Regex = Regex::new(r"(?m)^# (.*?)(?:\n|$)").expect("h1 pattern compiles");
    static ref CODE_BLOCK: Regex =
        Regex::new(r"```(\w*)((?s).*?)```").expect("code block pattern compiles");
    static ref INLINE_CODE: Regex = Regex::new(r"`([^`]+)`").expect("inline code pattern compiles");
    static ref BOLD: Regex = Regex::new(r"\*\*(.*?)\*\*").expect("bold pattern compiles");
    static ref ITALIC: Regex = Regex::new(r"\*(.*?)\*").expect("italic pattern compiles");
    static ref HEADER_START: Regex = Regex::new(r"^#{1,4} ").expect("header start pattern compiles");
}

/// Render answer text as HTML
pub fn render(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let opens_with_header = HEADER_START.is_match(text);

    let text = H4.replace_all(text, "<h4>$1</h4>\n");
    let text = H3.replace_all(&text, "<h3>$1</h3>\n");
    let text = H2.replace_all(&text, "<h2>$1</h2>\n");
    let text = H1.replace_all(&text, "<h1>$1</h1>\n");

    let text = CODE_BLOCK.replace_all(&text, |caps: &Captures| {
        format!(
            r#"<pre class="code-block"><code class="{}">{}</code></pre>"#,
            &caps[1],
            caps[2].trim()
        )
    });
    let text = INLINE_CODE.replace_all(&text, "<code>$1</code>");
    let text = BOLD.replace_all(&text, "<strong>$1</strong>");
    let text = ITALIC.replace_all(&text, "<em>$1</em>");

    let text = text.replace("\n\n", "</p><p>").replace('\n', "<br>");

    if opens_with_header {
        text
    } else {
        format!("<p>{}</p>", text)
    }
}

/// Escape text for safe inclusion in HTML
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_wrapped_in_paragraph() {
        for text in ["hello world", "Index exceeds matrix dimensions.", "a_b (c) 1+2=3"] {
            assert_eq!(render(text), format!("<p>{}</p>", text));
        }
    }

    #[test]
    fn test_leading_html_is_still_wrapped() {
        assert_eq!(render("<p>x"), "<p><p>x</p>");
        assert_eq!(render("<h2>x</h2>"), "<p><h2>x</h2></p>");
        assert_eq!(render("#hashtag"), "<p>#hashtag</p>");
    }

    #[test]
    fn test_empty_text_renders_empty() {
        assert_eq!(render(""), "");
    }

    #[test]
    fn test_headers_not_wrapped() {
        assert_eq!(render("## Fix\nUse size()"), "<h2>Fix</h2><br>Use size()");
        assert_eq!(render("### Improved Answer"), "<h3>Improved Answer</h3><br>");
        assert_eq!(render("#### Solutions:"), "<h4>Solutions:</h4><br>");
    }

    #[test]
    fn test_code_block_keeps_language() {
        let html = render("Try:\n```matlab\nA = zeros(3);\n```");
        assert!(html.contains(r#"<pre class="code-block"><code class="matlab">A = zeros(3);</code></pre>"#));
        assert!(html.starts_with("<p>Try:<br>"));
    }

    #[test]
    fn test_inline_styles() {
        assert_eq!(
            render("use `size` for **dims** and *rows*"),
            "<p>use <code>size</code> for <strong>dims</strong> and <em>rows</em></p>"
        );
    }

    #[test]
    fn test_paragraph_breaks() {
        assert_eq!(render("one\n\ntwo\nthree"), "<p>one</p><p>two<br>three</p>");
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("<b>&\"x'"), "&lt;b&gt;&amp;&quot;x&#39;");
    }
}
