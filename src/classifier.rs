//! Stock status inference for LEGO.com product pages.
//!
//! Precedence is first-match-wins: the structured availability metadata tag,
//! then keyword scanning of the visible page text, then `Unknown`. Purchase
//! button detection runs independently and never influences the status.
//!
//! Everything here is pure. The same document always classifies the same way.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;
use tracing::debug;

use crate::models::{Classification, StockStatus};

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector must parse")
}

fn selector_list(css: &[&str]) -> Vec<Selector> {
    css.iter().map(|s| selector(s)).collect()
}

/// Availability metadata, in lookup order.
static META_PRODUCT_AVAILABILITY: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"meta[property="product:availability"]"#));
static META_ITEMPROP_AVAILABILITY: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"meta[itemprop="availability"]"#));
static LINK_ITEMPROP_AVAILABILITY: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"link[itemprop="availability"]"#));

/// Sticky purchase container near the fold.
static PURCHASE_CONTAINER: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"[data-test="add-to-bag-sticky-container"]"#));
static CLICKABLE: LazyLock<Selector> = LazyLock::new(|| selector(r#"button, [role="button"]"#));

static NAME_SELECTORS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    selector_list(&[
        r#"h1[data-test="product-overview-name"]"#,
        "h1.product-overview__name",
        "h1",
        r#"[data-test="product-title"]"#,
        ".product-title",
    ])
});

static PRICE_SELECTORS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    selector_list(&[
        r#"[data-test="product-price"]"#,
        ".product-price",
        ".price",
        r#"[class*="price"]"#,
    ])
});

const DATE: &str = r"([A-Za-z]+\s+\d{1,2},\s+\d{4})";

static SHIPS_FROM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"(?i)ships?\s+from\s+{DATE}")).expect("static regex"));
static COMING_SOON_ON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"(?i)coming\s+soon\s+on\s+{DATE}")).expect("static regex"));
static AVAILABLE_ON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"(?i)available\s+{DATE}")).expect("static regex"));

const CURRENCY_SYMBOLS: [char; 3] = ['$', '€', '£'];

const OUT_OF_STOCK_KEYWORDS: [&str; 4] = [
    "out of stock",
    "sold out",
    "unavailable",
    "temporarily out of stock",
];
const IN_STOCK_KEYWORDS: [&str; 3] = ["in stock", "add to cart", "add to bag"];

// Matched as whole words so "x" does not hit every label containing the letter.
const BUTTON_SKIP_WORDS: [&str; 5] = ["wishlist", "close", "cancel", "dismiss", "x"];
const BUTTON_PURCHASE_KEYWORDS: [&str; 6] = [
    "add to bag",
    "add to cart",
    "pre-order",
    "preorder",
    "buy",
    "purchase",
];
const PURCHASE_INTENT_MARKER: &str = "add-to-cart";

/// Elements whose text is never shown to the shopper.
const HIDDEN_TEXT_PARENTS: [&str; 4] = ["script", "style", "template", "noscript"];

pub fn classify_html(html: &str) -> Classification {
    classify(&Html::parse_document(html))
}

pub fn classify(document: &Html) -> Classification {
    let button_detected = detect_button(document);
    let text = page_text(document);

    let (status, message) = match metadata_availability(document)
        .and_then(|content| classify_metadata(&content, &text))
    {
        Some(tier) => tier,
        None => classify_text(&text),
    };

    Classification {
        available: status == StockStatus::InStock,
        status,
        message,
        button_detected,
    }
}

/// Content of the first availability metadata field present on the page.
pub fn metadata_availability(document: &Html) -> Option<String> {
    let content = first_attr(document, &META_PRODUCT_AVAILABILITY, "content")
        .or_else(|| first_attr(document, &META_ITEMPROP_AVAILABILITY, "content"))
        .or_else(|| first_attr(document, &LINK_ITEMPROP_AVAILABILITY, "href"))?;

    debug!("Found availability metadata: {}", content);
    Some(content.to_string())
}

/// First non-blank value of `attr` among elements matching `selector`.
fn first_attr<'a>(document: &'a Html, selector: &Selector, attr: &str) -> Option<&'a str> {
    document
        .select(selector)
        .filter_map(|e| e.value().attr(attr))
        .map(str::trim)
        .find(|value| !value.is_empty())
}

fn classify_metadata(content: &str, text: &str) -> Option<(StockStatus, String)> {
    let content = content.to_lowercase();

    if content.contains("in stock") || content.contains("instock") {
        Some((StockStatus::InStock, "In Stock".to_string()))
    } else if content.contains("out of stock")
        || content.contains("outofstock")
        || content.contains("oos")
    {
        Some((StockStatus::OutOfStock, "Out of Stock".to_string()))
    } else if content.contains("preorder") || content.contains("pre-order") {
        Some((StockStatus::PreOrder, pre_order_message(text)))
    } else if content.contains("backorder") {
        Some((StockStatus::OutOfStock, "Backorder".to_string()))
    } else {
        None
    }
}

fn classify_text(text: &str) -> (StockStatus, String) {
    let lower = text.to_lowercase();

    if lower.contains("pre-order") || lower.contains("preorder") {
        return (StockStatus::PreOrder, pre_order_message(text));
    }

    if lower.contains("coming soon") {
        let message = match extract_date_info(text) {
            Some(date) => format!("Coming Soon - {}", date),
            None => "Coming Soon".to_string(),
        };
        return (StockStatus::PreOrder, message);
    }

    if lower.contains("available now") {
        return (StockStatus::InStock, "In Stock".to_string());
    }

    if OUT_OF_STOCK_KEYWORDS.iter().any(|k| lower.contains(k)) {
        return (StockStatus::OutOfStock, "Out of Stock".to_string());
    }

    if IN_STOCK_KEYWORDS.iter().any(|k| lower.contains(k)) {
        return (StockStatus::InStock, "In Stock".to_string());
    }

    (StockStatus::Unknown, "Status Unknown".to_string())
}

fn pre_order_message(text: &str) -> String {
    match extract_date_info(text) {
        Some(date) => format!("Pre-Order - {}", date),
        None => "Pre-Order Available".to_string(),
    }
}

/// Ship or release date mentioned in the page text, already phrased for a
/// message, e.g. "Ships from March 3, 2026".
pub fn extract_date_info(text: &str) -> Option<String> {
    if let Some(caps) = SHIPS_FROM.captures(text) {
        return Some(format!("Ships from {}", &caps[1]));
    }
    if let Some(caps) = COMING_SOON_ON.captures(text) {
        return Some(format!("Available {}", &caps[1]));
    }
    AVAILABLE_ON
        .captures(text)
        .map(|caps| format!("Available {}", &caps[1]))
}

/// Visible text of the whole document with whitespace collapsed.
pub fn page_text(document: &Html) -> String {
    let mut parts: Vec<&str> = Vec::new();

    for node in document.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };

        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|e| HIDDEN_TEXT_PARENTS.contains(&e.name()))
        });
        if !hidden {
            parts.push(&**text);
        }
    }

    collapse_whitespace(&parts.join(" "))
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn element_text(element: &ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<Vec<_>>().join(" "))
}

/// Text (or aria label) of the primary purchase button, if the sticky
/// purchase container is on the page.
pub fn detect_button(document: &Html) -> Option<String> {
    let container = document.select(&PURCHASE_CONTAINER).next()?;

    for button in container.select(&CLICKABLE) {
        let text = element_text(&button);
        let aria = button.value().attr("aria-label").unwrap_or_default().trim();
        let data_test = button.value().attr("data-test").unwrap_or_default();

        let text_lower = text.to_lowercase();
        let aria_lower = aria.to_lowercase();

        let skipped = BUTTON_SKIP_WORDS
            .iter()
            .any(|w| text_lower.contains(w) || aria_lower.contains(w));
        if skipped {
            continue;
        }

        let purchase = BUTTON_PURCHASE_KEYWORDS
            .iter()
            .any(|k| text_lower.contains(k) || aria_lower.contains(k))
            || data_test.to_lowercase().contains(PURCHASE_INTENT_MARKER);
        if !purchase {
            continue;
        }

        if !text.is_empty() {
            return Some(text);
        }
        if !aria.is_empty() {
            return Some(aria.to_string());
        }
    }

    None
}

pub fn extract_product_name(document: &Html, target_code: &str) -> String {
    NAME_SELECTORS
        .iter()
        .filter_map(|s| document.select(s).next())
        .map(|e| element_text(&e))
        .find(|name| !name.is_empty())
        .unwrap_or_else(|| format!("LEGO Set {}", target_code))
}

pub fn extract_price(document: &Html) -> Option<String> {
    PRICE_SELECTORS
        .iter()
        .filter_map(|s| document.select(s).next())
        .map(|e| element_text(&e))
        .find(|price| price.contains(CURRENCY_SYMBOLS))
}
