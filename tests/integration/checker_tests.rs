use super::*;
use brickwatch::{PageFetcher, StockChecker};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PRODUCT_PAGE: &str = r#"<html><head>
    <meta property="product:availability" content="OutOfStock">
    </head><body>
    <h1 data-test="product-overview-name">Jazz Club</h1>
    <span data-test="product-price">$229.99</span>
    <div data-test="add-to-bag-sticky-container"><button data-test="add-to-cart-button" disabled>Sold Out</button></div>
    </body></html>"#;

async fn checker_for(server: &MockServer) -> anyhow::Result<StockChecker> {
    let fetcher = PageFetcher::new(&server.uri(), Duration::ZERO, Duration::from_secs(5))?;
    Ok(StockChecker::new(Arc::new(fetcher), &server.uri()))
}

#[tokio::test]
async fn test_search_fallback_against_live_server() -> anyhow::Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>home</html>"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/en-us/search"))
        .and(query_param("q", "10312"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<a href="/en-us/product/jazz-club-10312">Jazz Club</a>"#,
        ))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/en-us/product/jazz-club-10312"))
        .respond_with(ResponseTemplate::new(200).set_body_string(PRODUCT_PAGE))
        .expect(1)
        .mount(&server)
        .await;

    let checker = checker_for(&server).await?;
    let result = checker.check_stock("10312").await;

    assert_eq!(result.status, StockStatus::OutOfStock);
    assert!(!result.available);
    assert_eq!(result.product_name, "Jazz Club");
    assert_eq!(result.price.as_deref(), Some("$229.99"));
    assert_eq!(result.button_detected.as_deref(), Some("Sold Out"));
    assert_eq!(
        result.source_url,
        format!("{}/en-us/product/jazz-club-10312", server.uri())
    );
    Ok(())
}

#[tokio::test]
async fn test_unknown_set_resolves_to_error() -> anyhow::Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/en-us/search"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<p>No results</p>"))
        .mount(&server)
        .await;

    let checker = checker_for(&server).await?;
    let result = checker.check_stock("99999").await;

    assert_eq!(result.status, StockStatus::Error);
    assert!(!result.available);
    assert_eq!(result.button_detected, None);
    assert_eq!(result.product_name, "Set 99999");
    Ok(())
}
