use chrono::NaiveDate;
use ordertrail_core::RawMessage;
use scraper::{ElementRef, Html, Selector};

use crate::ExtractError;

const SKIPPED_ELEMENTS: &[&str] = &["head", "script", "style", "noscript", "template", "title"];

const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "dd", "div", "dl", "dt", "fieldset",
    "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr",
    "li", "main", "nav", "ol", "p", "pre", "section", "table", "tbody", "td", "tfoot", "th",
    "thead", "tr", "ul",
];

/// Immutable view over one message: the parsed markup tree plus its visible
/// text split into lines. Every extraction stage reads from this.
#[derive(Debug, Clone)]
pub struct Document {
    html: Html,
    lines: Vec<String>,
    text: String,
    sender: String,
    reference_date: NaiveDate,
}

impl Document {
    pub fn parse(html_body: &str, text_body: &str, reference_date: NaiveDate) -> Self {
        let html = Html::parse_document(html_body);
        let mut lines = visible_lines(&html);
        if lines.is_empty() {
            lines = text_body
                .lines()
                .map(normalize_whitespace)
                .filter(|line| !line.is_empty())
                .collect();
        }
        let text = lines.join("\n");
        Self {
            html,
            lines,
            text,
            sender: String::new(),
            reference_date,
        }
    }

    pub fn from_text(text_body: &str, reference_date: NaiveDate) -> Self {
        Self::parse("", text_body, reference_date)
    }

    pub fn from_message(message: &RawMessage) -> Self {
        let mut document = Self::parse(
            &message.html_body,
            &message.text_body,
            message.received_at.date_naive(),
        );
        document.sender = message.sender.clone();
        document
    }

    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = sender.into();
        self
    }

    pub fn html(&self) -> &Html {
        &self.html
    }

    /// Visible text, one rendered block per line.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    /// Date that relative or year-less dates are resolved against.
    pub fn reference_date(&self) -> NaiveDate {
        self.reference_date
    }

    pub fn select(
        &self,
        field: &'static str,
        css: &str,
    ) -> Result<Vec<ElementRef<'_>>, ExtractError> {
        let selector = parse_selector(field, css)?;
        Ok(self.html.select(&selector).collect())
    }

    pub fn exists(&self, field: &'static str, css: &str) -> Result<bool, ExtractError> {
        let selector = parse_selector(field, css)?;
        Ok(self.html.select(&selector).next().is_some())
    }

    pub fn select_first_text(
        &self,
        field: &'static str,
        css: &str,
    ) -> Result<Option<String>, ExtractError> {
        let selector = parse_selector(field, css)?;
        Ok(self
            .html
            .select(&selector)
            .next()
            .and_then(|el| text_or_none(&element_text(el))))
    }

    pub fn select_first_attr(
        &self,
        field: &'static str,
        css: &str,
        attr: &str,
    ) -> Result<Option<String>, ExtractError> {
        let selector = parse_selector(field, css)?;
        Ok(self
            .html
            .select(&selector)
            .next()
            .and_then(|el| el.value().attr(attr))
            .and_then(text_or_none))
    }
}

pub(crate) fn parse_selector(field: &'static str, css: &str) -> Result<Selector, ExtractError> {
    Selector::parse(css).map_err(|e| ExtractError::Selector {
        field,
        selector: css.to_string(),
        reason: e.to_string(),
    })
}

/// Text under an element with whitespace collapsed to single spaces.
pub fn element_text(element: ElementRef<'_>) -> String {
    let mut out = String::new();
    for chunk in element.text() {
        push_words(&mut out, chunk);
    }
    out
}

pub(crate) fn text_or_none(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub(crate) fn normalize_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn visible_lines(html: &Html) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    collect_lines(html.root_element(), &mut current, &mut lines);
    flush(&mut current, &mut lines);
    lines
}

fn collect_lines(element: ElementRef<'_>, current: &mut String, lines: &mut Vec<String>) {
    for child in element.children() {
        if let Some(child_element) = ElementRef::wrap(child) {
            let name = child_element.value().name();
            if SKIPPED_ELEMENTS.contains(&name) {
                continue;
            }
            let block = BLOCK_ELEMENTS.contains(&name);
            if block {
                flush(current, lines);
            }
            collect_lines(child_element, current, lines);
            if block {
                flush(current, lines);
            }
        } else if let Some(text) = child.value().as_text() {
            current.push_str(text);
        }
    }
}

fn push_words(out: &mut String, chunk: &str) {
    for word in chunk.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
}

fn flush(current: &mut String, lines: &mut Vec<String>) {
    let line = normalize_whitespace(current);
    current.clear();
    if !line.is_empty() {
        lines.push(line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 15).unwrap()
    }

    #[test]
    fn visible_text_skips_head_script_and_style() {
        let html = r#"<html><head><title>Order shipped</title><style>.x{}</style></head>
            <body><script>var delivered = true;</script>
            <div>Hello <b>Asha</b>,</div><p>Your order is confirmed.</p></body></html>"#;
        let doc = Document::parse(html, "", reference());
        assert_eq!(doc.lines(), &["Hello Asha,", "Your order is confirmed."]);
        assert!(!doc.text().contains("delivered"));
        assert!(!doc.text().contains("shipped"));
    }

    #[test]
    fn falls_back_to_plain_text_body() {
        let doc = Document::from_text("Order ID: OD123\n\n  Total:   Rs. 499 \n", reference());
        assert_eq!(doc.lines(), &["Order ID: OD123", "Total: Rs. 499"]);
    }

    #[test]
    fn invalid_selector_reports_field() {
        let doc = Document::parse("<p>x</p>", "", reference());
        let err = doc.select_first_text("order_id", "li[[").unwrap_err();
        assert_eq!(err.field(), "order_id");
    }

    #[test]
    fn selects_first_text_and_attr() {
        let doc = Document::parse(
            r#"<ul><li id="OrderId"> 1234 5678 </li></ul><a href="https://t.example/x">Track</a>"#,
            "",
            reference(),
        );
        assert_eq!(
            doc.select_first_text("order_id", "li#OrderId").unwrap().as_deref(),
            Some("1234 5678")
        );
        assert_eq!(
            doc.select_first_attr("tracking_url", "a[href]", "href").unwrap().as_deref(),
            Some("https://t.example/x")
        );
    }
}
