//! Page text and link extraction.
//!
//! Markup is reached only through the narrow [`HtmlDocument`] capability so the
//! rest of the crate does not depend on a particular HTML parser. The default
//! implementation, [`ScrapedDocument`], is backed by `scraper`.
//!
//! Parsing never fails: malformed input degrades to whatever the parser could
//! recover, which is often nothing.

use scraper::{Html, Selector};
use url::Url;

/// Label prefixed to the page title in captured text.
pub const TITLE_LABEL: &str = "Page Title: ";

/// Read-only view of a parsed HTML document.
pub trait HtmlDocument {
    /// Text of the `<title>` element, whitespace-normalized. `None` when absent or blank.
    fn title(&self) -> Option<String>;

    /// Text of every `<p>` element in document order, whitespace-normalized, blanks dropped.
    fn paragraph_texts(&self) -> Vec<String>;

    /// Raw `href` values of every `<a href>` in document order.
    fn links(&self) -> Vec<String>;
}

/// [`HtmlDocument`] backed by `scraper::Html`.
///
/// `scraper::Html` is not `Send`; parse, read, and drop it without holding it
/// across an `.await`.
pub struct ScrapedDocument {
    html: Html,
}

impl ScrapedDocument {
    /// Parses `body` as an HTML document.
    #[must_use]
    pub fn parse(body: &str) -> Self {
        Self {
            html: Html::parse_document(body),
        }
    }

    fn select_texts(&self, selector: &str) -> Vec<String> {
        let Ok(selector) = Selector::parse(selector) else {
            return Vec::new();
        };
        self.html
            .select(&selector)
            .map(|element| normalize_whitespace(&element.text().collect::<String>()))
            .filter(|text| !text.is_empty())
            .collect()
    }
}

impl HtmlDocument for ScrapedDocument {
    fn title(&self) -> Option<String> {
        self.select_texts("title").into_iter().next()
    }

    fn paragraph_texts(&self) -> Vec<String> {
        self.select_texts("p")
    }

    fn links(&self) -> Vec<String> {
        let Ok(selector) = Selector::parse("a[href]") else {
            return Vec::new();
        };
        self.html
            .select(&selector)
            .filter_map(|element| element.value().attr("href"))
            .map(|href| href.trim().to_string())
            .filter(|href| !href.is_empty())
            .collect()
    }
}

/// Renders the captured text of a document: a labeled title line and a blank
/// line (when a title exists), then one line per paragraph.
#[must_use]
pub fn render_page_text<D: HtmlDocument + ?Sized>(document: &D) -> String {
    let mut content = String::new();
    if let Some(title) = document.title() {
        content.push_str(TITLE_LABEL);
        content.push_str(&title);
        content.push_str("\n\n");
    }
    for paragraph in document.paragraph_texts() {
        content.push_str(&paragraph);
        content.push('\n');
    }
    content
}

/// Parses `body` and returns its normalized page text.
#[must_use]
pub fn extract_page_text(body: &str) -> String {
    render_page_text(&ScrapedDocument::parse(body))
}

/// Parses `body` and resolves every link against `base`.
///
/// Hrefs that cannot be joined (e.g. `javascript:` garbage) are dropped.
#[must_use]
pub fn extract_links(base: &Url, body: &str) -> Vec<Url> {
    ScrapedDocument::parse(body)
        .links()
        .iter()
        .filter_map(|href| base.join(href).ok())
        .collect()
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SAMPLE_PAGE: &str = r#"
        <!DOCTYPE html>
        <html>
        <head><title>  Opening   Hours </title></head>
        <body>
            <nav><a href="/about">About</a></nav>
            <p>We are open
               every day.</p>
            <div>Not a paragraph</div>
            <p>   </p>
            <p>Closed on <b>holidays</b>.</p>
            <a href="https://other.test/x">Elsewhere</a>
        </body>
        </html>
    "#;

    #[test]
    fn test_extract_page_text_title_and_paragraphs() {
        let text = extract_page_text(SAMPLE_PAGE);
        assert_eq!(
            text,
            "Page Title: Opening Hours\n\nWe are open every day.\nClosed on holidays.\n"
        );
    }

    #[test]
    fn test_extract_page_text_without_title() {
        let text = extract_page_text("<html><body><p>only text</p></body></html>");
        assert_eq!(text, "only text\n");
    }

    #[test]
    fn test_extract_page_text_degrades_on_garbage() {
        assert_eq!(extract_page_text(""), "");
        assert_eq!(extract_page_text("<<<>>> not html at all"), "");
        assert_eq!(extract_page_text("<p>unclosed"), "unclosed\n");
    }

    #[test]
    fn test_extract_page_text_is_deterministic() {
        assert_eq!(extract_page_text(SAMPLE_PAGE), extract_page_text(SAMPLE_PAGE));
    }

    #[test]
    fn test_document_links_in_order() {
        let document = ScrapedDocument::parse(SAMPLE_PAGE);
        assert_eq!(document.links(), vec!["/about", "https://other.test/x"]);
    }

    #[test]
    fn test_extract_links_resolves_relative() {
        let base = Url::parse("https://ex.com/a/page").unwrap();
        let body = r#"<a href="b">b</a><a href="/c">c</a><a href="../d">d</a><a href="">e</a>"#;
        let links: Vec<String> = extract_links(&base, body)
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(
            links,
            vec!["https://ex.com/a/b", "https://ex.com/c", "https://ex.com/d"]
        );
    }

    struct FixedDocument;

    impl HtmlDocument for FixedDocument {
        fn title(&self) -> Option<String> {
            None
        }
        fn paragraph_texts(&self) -> Vec<String> {
            vec!["one".to_string(), "two".to_string()]
        }
        fn links(&self) -> Vec<String> {
            Vec::new()
        }
    }

    #[test]
    fn test_render_page_text_over_any_document() {
        assert_eq!(render_page_text(&FixedDocument), "one\ntwo\n");
    }
}
