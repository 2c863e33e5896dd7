//! Product extraction cascade.
//!
//! Five independent strategies run in a fixed order over the immutable
//! [`Document`]; the first one that produces at least one validated,
//! deduplicated line item wins. When none does, a single placeholder item
//! is returned so callers always have something to attach an order to.

use std::collections::HashSet;
use std::sync::LazyLock;

use ordertrail_core::ParsedProduct;
use regex::Regex;
use rust_decimal::Decimal;
use scraper::ElementRef;
use serde::Serialize;
use tracing::{debug, warn};

use crate::document::{element_text, Document};
use crate::patterns::{parse_amount, CURRENCY_AMOUNT};

pub const PLACEHOLDER_PRODUCT: &str = "Unknown Product";

const MIN_ROW_CHARS: usize = 10;
const MAX_ROW_CHARS: usize = 500;
const MAX_LABEL_CHARS: usize = 80;
const ANCHOR_MIN_LABEL: usize = 3;
const DEFAULT_MIN_LABEL: usize = 5;
const TEXT_WINDOW_LINES: usize = 5;
const MAX_SIZE_CHARS: usize = 10;

static MIN_PRICE: LazyLock<Decimal> = LazyLock::new(|| Decimal::from(50));
static MAX_PRICE: LazyLock<Decimal> = LazyLock::new(|| Decimal::from(5000));

/// Financial summary lines, navigation chrome and legal boilerplate that
/// look like line items but never are. Anchored at the start of the label.
static EXCLUDED_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?ix)^(?:
            sub\s*-?\s*total | grand\s+total | order\s+total | bag\s+total | item\s+total
            | total(?:\s+(?:amount|paid|payable|price|mrp))? | amount(?:\s+paid)? | net\s+(?:paid|amount)
            | tax(?:es)? | gst | igst | cgst | sgst | vat | cess
            | shipping(?:\s*(?:&|and)\s*handling)? | shipping\s+(?:fee|charges?|cost)
            | delivery\s+(?:fee|charges?) | handling(?:\s+(?:fee|charges?))? | convenience\s+fee
            | platform\s+fee | cod\s+(?:fee|charges?) | gift\s+wrap(?:ping)?(?:\s+charges?)?
            | discount | coupon(?:\s+(?:discount|savings))? | savings | you\s+saved | mrp | price
            | wallet | refund | payment(?:\s+method)? | order\s+summary | price\s+details
        )\b",
    )
    .expect("exclusion regex")
});

static BOILERPLATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:unsubscribe|privacy\s+policy|terms\s+(?:of\s+use|and\s+conditions|&\s+conditions)|contact\s+us|help\s+cent(?:er|re)|customer\s+care|download\s+(?:the\s+)?app|view\s+in\s+browser|all\s+rights\s+reserved|copyright|track\s+(?:your\s+|my\s+)?order|my\s+orders|shop\s+now|click\s+here|order\s+(?:id|number|no)|manage\s+orders)\b",
    )
    .expect("boilerplate regex")
});

static SIZE_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bsize\b\s*[:\-]?\s*([A-Z0-9/]{1,12})").expect("size label regex")
});

static SIZE_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(XXXL|XXL|XL|2XL|3XL|XXS|XS|S|M|L)\b").expect("size token regex")
});

static QTY_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:qty|quantity)\b\s*[:\-]?\s*(\d{1,3})").expect("qty regex")
});

static LABEL_NOISE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:size|qty|quantity)\b\s*[:\-]?\s*[A-Z0-9/]{1,12}\b|\b(?:price|mrp|amount)\s*[:\-]?\s*$")
        .expect("label noise regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductStrategy {
    AnchorLink,
    TaggedRow,
    TableScan,
    ContainerScan,
    TextWindow,
}

impl ProductStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AnchorLink => "anchor_link",
            Self::TaggedRow => "tagged_row",
            Self::TableScan => "table_scan",
            Self::ContainerScan => "container_scan",
            Self::TextWindow => "text_window",
        }
    }
}

/// Merchant-specific hints for the first two strategies.
#[derive(Debug, Clone, Copy)]
pub struct CascadeProfile {
    /// Lowercase substrings that mark an `href` as a product page.
    pub product_link_markers: &'static [&'static str],
    /// Selectors for elements carrying a line-item marker.
    pub line_item_selectors: &'static [&'static str],
    pub placeholder_name: &'static str,
}

impl CascadeProfile {
    pub const GENERIC: CascadeProfile = CascadeProfile {
        product_link_markers: &["/dp/", "/p/", "/product/", "/products/", "/item/", "/buy"],
        line_item_selectors: &[
            "tr.line-item",
            "tr.item",
            "[class*=\"line-item\"]",
            "[class*=\"product-row\"]",
            "[data-line-item]",
        ],
        placeholder_name: PLACEHOLDER_PRODUCT,
    };
}

impl Default for CascadeProfile {
    fn default() -> Self {
        Self::GENERIC
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CascadeOutcome {
    /// `None` when nothing was found and `products` holds the placeholder.
    pub strategy: Option<ProductStrategy>,
    pub products: Vec<ParsedProduct>,
}

impl CascadeOutcome {
    pub fn is_placeholder(&self) -> bool {
        self.strategy.is_none()
    }

    /// Found products only; empty when the cascade fell through.
    pub fn found(self) -> Vec<ParsedProduct> {
        if self.is_placeholder() {
            Vec::new()
        } else {
            self.products
        }
    }
}

type Strategy = fn(&Document, &CascadeProfile) -> Vec<ParsedProduct>;

const STRATEGIES: [(ProductStrategy, Strategy); 5] = [
    (ProductStrategy::AnchorLink, anchor_links),
    (ProductStrategy::TaggedRow, tagged_rows),
    (ProductStrategy::TableScan, table_rows),
    (ProductStrategy::ContainerScan, block_containers),
    (ProductStrategy::TextWindow, text_windows),
];

pub fn extract_products(document: &Document, profile: &CascadeProfile) -> CascadeOutcome {
    for (strategy, run) in STRATEGIES {
        let products = dedup_products(run(document, profile));
        if !products.is_empty() {
            debug!(strategy = strategy.as_str(), count = products.len(), "product cascade hit");
            return CascadeOutcome {
                strategy: Some(strategy),
                products,
            };
        }
    }
    debug!("product cascade fell through to placeholder");
    CascadeOutcome {
        strategy: None,
        products: vec![ParsedProduct::new(profile.placeholder_name, Decimal::ZERO)],
    }
}

/// Merge candidates with the same label whose prices differ by less than one
/// unit: quantities add up, the higher price is kept.
pub fn dedup_products(candidates: Vec<ParsedProduct>) -> Vec<ParsedProduct> {
    let mut out: Vec<ParsedProduct> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let existing = out
            .iter_mut()
            .find(|p| p.name == candidate.name && (p.price - candidate.price).abs() < Decimal::ONE);
        match existing {
            Some(existing) => {
                existing.quantity = existing.quantity.saturating_add(candidate.quantity);
                if candidate.price > existing.price {
                    existing.price = candidate.price;
                }
                if existing.size.is_empty() {
                    existing.size = candidate.size;
                }
            }
            None => out.push(candidate),
        }
    }
    out
}

pub fn is_plausible_price(price: Decimal) -> bool {
    price >= *MIN_PRICE && price < *MAX_PRICE
}

pub fn is_valid_label(label: &str, min_chars: usize) -> bool {
    let chars = label.chars().count();
    if chars < min_chars || chars > MAX_LABEL_CHARS {
        return false;
    }
    if !label.chars().any(char::is_alphabetic) {
        return false;
    }
    if label
        .chars()
        .all(|c| c.is_ascii_digit() || c.is_ascii_punctuation() || c.is_whitespace() || c == '₹')
    {
        return false;
    }
    !is_excluded(label)
}

fn is_excluded(label: &str) -> bool {
    EXCLUDED_LABEL.is_match(label.trim()) || BOILERPLATE.is_match(label)
}

fn clean_label(raw: &str) -> String {
    let stripped = LABEL_NOISE.replace_all(raw, " ");
    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .trim_matches(|c: char| c.is_whitespace() || "-|:•·,–—*".contains(c))
        .to_string()
}

pub fn extract_size(text: &str) -> String {
    let size = SIZE_LABEL
        .captures(text)
        .or_else(|| SIZE_TOKEN.captures(text))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();
    size.chars().take(MAX_SIZE_CHARS).collect()
}

pub fn extract_quantity(text: &str) -> u32 {
    QTY_LABEL
        .captures(text)
        .and_then(|caps| caps.get(1)?.as_str().parse::<u32>().ok())
        .filter(|qty| *qty > 0)
        .unwrap_or(1)
}

/// First plausible currency figure in `text` with the byte range it spans.
fn plausible_price(text: &str) -> Option<(Decimal, usize, usize)> {
    CURRENCY_AMOUNT.captures_iter(text).find_map(|caps| {
        let whole = caps.get(0)?;
        let price = parse_amount(caps.get(1)?.as_str())?;
        is_plausible_price(price).then_some((price, whole.start(), whole.end()))
    })
}

fn select_or_warn<'a>(
    document: &'a Document,
    strategy: ProductStrategy,
    css: &str,
) -> Vec<ElementRef<'a>> {
    document.select("products", css).unwrap_or_else(|err| {
        warn!(strategy = strategy.as_str(), %err, "skipping selector");
        Vec::new()
    })
}

/// Label, price, size and quantity from one row or container's text. The
/// label is the text between the previous figure and the matched price.
fn candidate_from_text(text: &str, min_label: usize) -> Option<ParsedProduct> {
    let chars = text.chars().count();
    if !(MIN_ROW_CHARS..=MAX_ROW_CHARS).contains(&chars) {
        return None;
    }
    let mut label_start = 0;
    for caps in CURRENCY_AMOUNT.captures_iter(text) {
        let (Some(whole), Some(figure)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let label = clean_label(&text[label_start..whole.start()]);
        label_start = whole.end();
        let Some(price) = parse_amount(figure.as_str()) else {
            continue;
        };
        if !is_plausible_price(price) || !is_valid_label(&label, min_label) {
            continue;
        }
        return Some(ParsedProduct {
            name: label,
            size: extract_size(text),
            quantity: extract_quantity(text),
            price,
            seller: String::new(),
        });
    }
    None
}

/// Keep only the innermost matching elements that produced a candidate, so
/// a wrapper around a product row does not re-report it.
fn innermost_candidates(elements: Vec<ElementRef<'_>>, min_label: usize) -> Vec<ParsedProduct> {
    let hits: Vec<(ElementRef<'_>, ParsedProduct)> = elements
        .into_iter()
        .filter_map(|el| candidate_from_text(&element_text(el), min_label).map(|p| (el, p)))
        .collect();
    let hit_ids: HashSet<_> = hits.iter().map(|(el, _)| el.id()).collect();
    hits.into_iter()
        .filter(|(el, _)| !el.descendants().skip(1).any(|node| hit_ids.contains(&node.id())))
        .map(|(_, product)| product)
        .collect()
}

fn anchor_links(document: &Document, profile: &CascadeProfile) -> Vec<ParsedProduct> {
    let mut out = Vec::new();
    for link in select_or_warn(document, ProductStrategy::AnchorLink, "a[href]") {
        let href = link.value().attr("href").unwrap_or_default().to_ascii_lowercase();
        if !profile.product_link_markers.iter().any(|m| href.contains(m)) {
            continue;
        }
        let label = clean_label(&element_text(link));
        if !is_valid_label(&label, ANCHOR_MIN_LABEL) {
            continue;
        }
        let container = link
            .ancestors()
            .filter_map(ElementRef::wrap)
            .filter(|el| matches!(el.value().name(), "tr" | "td" | "li" | "div" | "table"))
            .map(element_text)
            .take_while(|text| text.chars().count() <= MAX_ROW_CHARS)
            .find_map(|text| plausible_price(&text).map(|(price, _, _)| (price, text)));
        let Some((price, container_text)) = container else {
            continue;
        };
        out.push(ParsedProduct {
            name: label,
            size: extract_size(&container_text),
            quantity: extract_quantity(&container_text),
            price,
            seller: String::new(),
        });
    }
    out
}

fn tagged_rows(document: &Document, profile: &CascadeProfile) -> Vec<ParsedProduct> {
    let mut out = Vec::new();
    for css in profile.line_item_selectors {
        let rows = select_or_warn(document, ProductStrategy::TaggedRow, css);
        out.extend(innermost_candidates(rows, DEFAULT_MIN_LABEL));
        if !out.is_empty() {
            break;
        }
    }
    out
}

fn table_rows(document: &Document, _profile: &CascadeProfile) -> Vec<ParsedProduct> {
    let rows = select_or_warn(document, ProductStrategy::TableScan, "tr");
    innermost_candidates(rows, DEFAULT_MIN_LABEL)
}

fn block_containers(document: &Document, _profile: &CascadeProfile) -> Vec<ParsedProduct> {
    let containers =
        select_or_warn(document, ProductStrategy::ContainerScan, "div, li, p, section");
    innermost_candidates(containers, DEFAULT_MIN_LABEL)
}

fn text_windows(document: &Document, _profile: &CascadeProfile) -> Vec<ParsedProduct> {
    let lines = document.lines();
    let mut out = Vec::new();
    for (index, line) in lines.iter().enumerate() {
        let Some((price, start, _)) = plausible_price(line) else {
            continue;
        };
        let prefix = clean_label(&line[..start]);
        let label_index = if prefix.is_empty() {
            look_back_for_label(lines, index)
        } else if is_valid_label(&prefix, DEFAULT_MIN_LABEL) {
            Some(index)
        } else {
            None
        };
        let Some(label_index) = label_index else {
            continue;
        };
        let name = if label_index == index {
            prefix
        } else {
            clean_label(&lines[label_index])
        };
        let window = lines[label_index..=index].join(" ");
        out.push(ParsedProduct {
            name,
            size: extract_size(&window),
            quantity: extract_quantity(&window),
            price,
            seller: String::new(),
        });
    }
    out
}

/// Walk back up to five lines from a bare price. A line with its own figure
/// or a financial term ends the search: the price belongs to that line.
fn look_back_for_label(lines: &[String], price_index: usize) -> Option<usize> {
    let floor = price_index.saturating_sub(TEXT_WINDOW_LINES);
    for index in (floor..price_index).rev() {
        let line = &lines[index];
        if CURRENCY_AMOUNT.is_match(line) || is_excluded(line) {
            return None;
        }
        if is_valid_label(&clean_label(line), DEFAULT_MIN_LABEL) {
            return Some(index);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn doc(html: &str) -> Document {
        Document::parse(html, "", NaiveDate::from_ymd_opt(2025, 1, 1).unwrap())
    }

    fn text_doc(text: &str) -> Document {
        Document::from_text(text, NaiveDate::from_ymd_opt(2025, 1, 1).unwrap())
    }

    #[test]
    fn anchor_links_win_when_present() {
        let html = r#"<table><tr>
            <td><a href="https://shop.example/p/123"><span>Classic</span> <span>Denim Jacket</span></a></td>
            <td>Size: L</td><td>₹1,999</td></tr></table>"#;
        let outcome = extract_products(&doc(html), &CascadeProfile::GENERIC);
        assert_eq!(outcome.strategy, Some(ProductStrategy::AnchorLink));
        assert_eq!(outcome.products.len(), 1);
        let product = &outcome.products[0];
        assert_eq!(product.name, "Classic Denim Jacket");
        assert_eq!(product.price, dec!(1999));
        assert_eq!(product.size, "L");
    }

    #[test]
    fn tagged_rows_use_profile_selectors() {
        let html = r#"<table>
            <tr class="line-item"><td>Cotton Kurta Set</td><td>Qty: 2</td><td>Rs. 1,299</td></tr>
            <tr><td>Subtotal</td><td>Rs. 2,598</td></tr></table>"#;
        let outcome = extract_products(&doc(html), &CascadeProfile::GENERIC);
        assert_eq!(outcome.strategy, Some(ProductStrategy::TaggedRow));
        assert_eq!(outcome.products[0].name, "Cotton Kurta Set");
        assert_eq!(outcome.products[0].quantity, 2);
    }

    #[test]
    fn table_scan_skips_financial_rows() {
        let html = r#"<table>
            <tr><td>Slim Fit Chinos</td><td>₹1,499</td></tr>
            <tr><td>Shipping &amp; Handling</td><td>₹99</td></tr>
            <tr><td>Tax</td><td>₹75</td></tr>
            <tr><td>Grand Total</td><td>₹1,673</td></tr></table>"#;
        let outcome = extract_products(&doc(html), &CascadeProfile::GENERIC);
        assert_eq!(outcome.strategy, Some(ProductStrategy::TableScan));
        assert_eq!(outcome.products.len(), 1);
        assert_eq!(outcome.products[0].name, "Slim Fit Chinos");
    }

    #[test]
    fn container_scan_reads_innermost_cards() {
        let html = r#"<div class="wrap"><div><p>Linen Shirt</p><p>₹899</p></div>
            <div><p>Canvas Sneakers</p><p>₹2,199</p></div></div>"#;
        let outcome = extract_products(&doc(html), &CascadeProfile::GENERIC);
        assert_eq!(outcome.strategy, Some(ProductStrategy::ContainerScan));
        let names: Vec<_> = outcome.products.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["Linen Shirt", "Canvas Sneakers"]);
    }

    #[test]
    fn text_window_looks_back_for_a_label() {
        let text = "Hi Asha,\nSoft Cotton Hoodie\nSize: M\n₹1,099\nTotal\n₹1,099";
        let outcome = extract_products(&text_doc(text), &CascadeProfile::GENERIC);
        assert_eq!(outcome.strategy, Some(ProductStrategy::TextWindow));
        assert_eq!(outcome.products.len(), 1);
        assert_eq!(outcome.products[0].name, "Soft Cotton Hoodie");
        assert_eq!(outcome.products[0].size, "M");
    }

    #[test]
    fn only_financial_lines_yield_placeholder() {
        let document = text_doc("Tax: ₹75.00\nShipping: ₹40.00");
        let outcome = extract_products(&document, &CascadeProfile::GENERIC);
        assert!(outcome.is_placeholder());
        assert_eq!(outcome.products[0].name, PLACEHOLDER_PRODUCT);
        assert!(outcome.found().is_empty());
    }

    #[test]
    fn implausible_prices_are_dropped() {
        let html = r#"<table><tr><td>Gift Card Balance</td><td>₹10,000</td></tr>
            <tr><td>Sticker Pack Mini</td><td>₹49</td></tr></table>"#;
        let outcome = extract_products(&doc(html), &CascadeProfile::GENERIC);
        assert!(outcome.is_placeholder());
        for product in outcome.found() {
            assert!(is_plausible_price(product.price));
        }
    }

    #[test]
    fn dedup_merges_near_identical_prices() {
        let mut a = ParsedProduct::new("Wool Scarf", dec!(599.00));
        a.quantity = 1;
        let b = ParsedProduct::new("Wool Scarf", dec!(599.50));
        let c = ParsedProduct::new("Wool Scarf", dec!(799));
        let merged = dedup_products(vec![a, b, c]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].quantity, 2);
        assert_eq!(merged[0].price, dec!(599.50));
        assert_eq!(merged[1].price, dec!(799));
    }

    #[test]
    fn label_rules() {
        assert!(is_valid_label("Tee", ANCHOR_MIN_LABEL));
        assert!(!is_valid_label("Tee", DEFAULT_MIN_LABEL));
        assert!(!is_valid_label("12345 ---", DEFAULT_MIN_LABEL));
        assert!(!is_valid_label("Subtotal (2 items)", DEFAULT_MIN_LABEL));
        assert!(!is_valid_label("Privacy Policy and more", DEFAULT_MIN_LABEL));
        assert!(!is_valid_label(&"x".repeat(81), DEFAULT_MIN_LABEL));
        assert_eq!(extract_size("Size: XXL-Long fit"), "XXL");
        assert_eq!(extract_size("a 2XL tee"), "2XL");
        assert_eq!(extract_size("no sizes here"), "");
        assert_eq!(extract_quantity("Qty 3"), 3);
        assert_eq!(extract_quantity("Qty: 0"), 1);
    }
}
