use async_trait::async_trait;
use scraper::{Html, Selector};
use std::sync::{Arc, LazyLock};
use tracing::{debug, info, warn};
use url::Url;

use crate::classifier;
use crate::fetcher::{FetchError, PageSource, RawPage};
use crate::models::StockResult;

pub const BLOCKED_MESSAGE: &str = "Unable to access LEGO.com. The site may be blocking automated requests. Please try again later or check the set code.";
pub const FORBIDDEN_MESSAGE: &str =
    "403 Forbidden: LEGO.com is blocking automated requests. Please try again later.";
pub const INVALID_CODE_MESSAGE: &str = "Invalid set code";

const PRODUCT_PATH_MARKER: &str = "/en-us/product/";

static LINKS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("static selector must parse"));

/// Anything that can produce a stock result for a target code.
///
/// Implementations never fail: problems resolve to an `Error` status.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StockSource: Send + Sync {
    async fn check_stock(&self, target_code: &str) -> StockResult;
}

/// Codes are ASCII alphanumerics and dashes, e.g. "10312" or "40567-1".
pub fn is_valid_target_code(code: &str) -> bool {
    !code.is_empty()
        && code.len() <= 32
        && code.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

pub struct StockChecker {
    pages: Arc<dyn PageSource>,
    base_url: String,
}

impl StockChecker {
    pub fn new(pages: Arc<dyn PageSource>, base_url: &str) -> Self {
        Self {
            pages,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Product URL guesses, most likely first.
    pub fn candidate_urls(&self, code: &str) -> Vec<String> {
        vec![
            format!("{}/en-us/product/{}", self.base_url, code),
            format!("{}/en-us/product/lego-set-{}", self.base_url, code),
            format!("{}/product/{}", self.base_url, code),
        ]
    }

    pub fn search_url(&self, code: &str) -> String {
        format!("{}/en-us/search?q={}", self.base_url, code)
    }

    async fn fetch_and_classify(&self, url: &str, code: &str) -> StockResult {
        match self.pages.fetch(url).await {
            Ok(page) => build_result(&page, code),
            Err(e) => {
                warn!(target_code = code, url, "Error checking set: {}", e);
                let message = match &e {
                    FetchError::Forbidden { .. } => FORBIDDEN_MESSAGE.to_string(),
                    FetchError::Transport { detail, .. } => {
                        format!("Error fetching product page: {}", detail)
                    }
                };
                StockResult::error(code, url, message)
            }
        }
    }

    async fn search_for_product(&self, code: &str) -> Option<String> {
        let url = self.search_url(code);

        match self.pages.fetch(&url).await {
            Ok(page) => find_product_link(&page.body, code, &self.base_url),
            Err(e) => {
                warn!(target_code = code, "Error searching for set: {}", e);
                None
            }
        }
    }

    async fn run_check(&self, code: &str) -> StockResult {
        let candidates = self.candidate_urls(code);

        if !is_valid_target_code(code) {
            return StockResult::error(code, candidates[0].as_str(), INVALID_CODE_MESSAGE);
        }

        for url in &candidates {
            let result = self.fetch_and_classify(url, code).await;
            if !result.is_error() {
                return result;
            }
            debug!(target_code = code, url = url.as_str(), "Candidate failed, trying next format");
        }

        info!(target_code = code, "All direct URLs failed, trying search");
        if let Some(url) = self.search_for_product(code).await {
            let result = self.fetch_and_classify(&url, code).await;
            if !result.is_error() {
                return result;
            }
        }

        StockResult::error(code, candidates[0].as_str(), BLOCKED_MESSAGE)
    }
}

#[async_trait]
impl StockSource for StockChecker {
    async fn check_stock(&self, target_code: &str) -> StockResult {
        let code = target_code.trim();
        let result = self.run_check(code).await;

        metrics::counter!("brickwatch_stock_checks_total", "status" => result.status.as_str())
            .increment(1);
        debug!(target_code = code, status = %result.status, "Stock check finished");
        result
    }
}

fn build_result(page: &RawPage, code: &str) -> StockResult {
    let document = Html::parse_document(&page.body);

    StockResult::from_classification(
        classifier::classify(&document),
        classifier::extract_product_name(&document, code),
        classifier::extract_price(&document),
        page.url.clone(),
    )
}

/// First search result link that points at a product page for `code`,
/// resolved against `base_url`.
pub fn find_product_link(html: &str, code: &str, base_url: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let base = Url::parse(base_url).ok()?;

    document
        .select(&LINKS)
        .filter_map(|a| a.value().attr("href"))
        .find(|href| href.contains(PRODUCT_PATH_MARKER) && href.contains(code))
        .and_then(|href| base.join(href).ok())
        .map(|url| url.to_string())
}
