use chromiumoxide::page::Page;
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{Result, ScraperError};
use crate::marketplace::{ListingSource, SearchProfile};
use crate::models::{Listing, SortBy, SortOrder};
use crate::pages::detail::parse_float_loose;

/// Parameters for one search call.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub min_price: Option<u32>,
    pub max_price: Option<u32>,
    pub max_items: usize,
    pub sort: SortBy,
    pub order: SortOrder,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            min_price: None,
            max_price: None,
            max_items: 10,
            sort: SortBy::default(),
            order: SortOrder::default(),
        }
    }
}

/// Terminal readiness states of a search page.
#[derive(Debug, PartialEq, Eq)]
enum SearchOutcome {
    Empty,
    HasResults,
}

/// Drives one page context through a single search: navigate, wait for a
/// terminal readiness state, parse the result grid.
pub struct SearchPage<'a> {
    page: &'a Page,
    profile: &'a SearchProfile,
    page_ready_timeout: Duration,
}

impl<'a> SearchPage<'a> {
    pub fn new(page: &'a Page, profile: &'a SearchProfile, page_ready_timeout: Duration) -> Self {
        Self {
            page,
            profile,
            page_ready_timeout,
        }
    }

    pub async fn search(&self, request: &SearchRequest) -> Result<Vec<Listing>> {
        let url = build_search_url(self.profile, request)?;
        info!(
            "Searching for '{}' (min: {:?}, max: {:?})",
            request.query, request.min_price, request.max_price
        );

        self.page
            .goto(url.as_str())
            .await
            .map_err(|e| ScraperError::Browser(format!("Failed to navigate to {}: {}", url, e)))?;

        match self.wait_for_page_ready().await? {
            SearchOutcome::Empty => {
                info!("Search returned no results");
                Err(ScraperError::NotFound)
            }
            SearchOutcome::HasResults => {
                let html = self
                    .page
                    .content()
                    .await
                    .map_err(|e| ScraperError::Browser(format!("Failed to get page content: {}", e)))?;
                let listings = parse_search_results(&html, self.profile, request.max_items)?;
                info!("Found {} listings", listings.len());
                Ok(listings)
            }
        }
    }

    /// Poll until either the empty-result text or the results grid shows up.
    /// A timeout is a generic transient failure, never silently swallowed.
    async fn wait_for_page_ready(&self) -> Result<SearchOutcome> {
        let deadline = tokio::time::Instant::now() + self.page_ready_timeout;
        loop {
            if self.page.find_element(self.profile.grid_selector).await.is_ok() {
                return Ok(SearchOutcome::HasResults);
            }
            if self.empty_state_visible().await {
                return Ok(SearchOutcome::Empty);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(ScraperError::Browser(
                    "timed out waiting for search results".to_string(),
                ));
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    }

    async fn empty_state_visible(&self) -> bool {
        let needle = serde_json::to_string(self.profile.empty_text).unwrap_or_default();
        let script = format!(
            "document.body !== null && document.body.innerText.includes({})",
            needle
        );
        match self.page.evaluate(script).await {
            Ok(value) => value.into_value::<bool>().unwrap_or(false),
            Err(e) => {
                debug!("Empty-state probe failed: {}", e);
                false
            }
        }
    }
}

/// Bit-exact search URL for the marketplace variant: keyword URL-encoded,
/// price bounds scaled into the site's native unit, sort/order only when a
/// non-default ordering was requested.
pub fn build_search_url(profile: &SearchProfile, request: &SearchRequest) -> Result<Url> {
    let mut url = Url::parse(profile.base_url)
        .map_err(|e| ScraperError::Parse(format!("invalid base url: {}", e)))?;
    url.set_path(profile.search_path);

    {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair(profile.keyword_param, &request.query);
        if let Some(min) = request.min_price {
            let scaled = min as u64 * profile.price_scale as u64;
            pairs.append_pair(profile.min_price_param, &scaled.to_string());
        }
        if let Some(max) = request.max_price {
            let scaled = max as u64 * profile.price_scale as u64;
            pairs.append_pair(profile.max_price_param, &scaled.to_string());
        }
        if let Some(sort) = (profile.sort_value)(request.sort) {
            pairs.append_pair(profile.sort_param, sort);
            pairs.append_pair(profile.order_param, (profile.order_value)(request.order));
        }
    }

    Ok(url)
}

/// Parse the rendered result grid into listings. A block that fails to
/// parse is logged and skipped; only a missing grid fails the batch.
pub fn parse_search_results(
    html: &str,
    profile: &SearchProfile,
    max_items: usize,
) -> Result<Vec<Listing>> {
    let document = Html::parse_document(html);
    let grid_selector = Selector::parse(profile.grid_selector)
        .map_err(|e| ScraperError::Parse(format!("invalid grid selector: {}", e)))?;
    let item_selector = Selector::parse(profile.item_selector)
        .map_err(|e| ScraperError::Parse(format!("invalid item selector: {}", e)))?;

    let grid = document
        .select(&grid_selector)
        .next()
        .ok_or_else(|| ScraperError::Parse("results grid missing from page".to_string()))?;

    let mut listings = Vec::new();
    for block in grid.select(&item_selector).take(max_items) {
        match parse_listing_block(&block, profile) {
            Ok(listing) => listings.push(listing),
            Err(e) => warn!("Could not parse listing block: {}", e),
        }
    }

    Ok(listings)
}

fn parse_listing_block(block: &ElementRef, profile: &SearchProfile) -> Result<Listing> {
    match &profile.source {
        ListingSource::StructuredData { script_selector } => {
            parse_structured_block(block, profile, script_selector)
        }
        ListingSource::NodeAttrs {
            link_selector,
            image_selector,
            currency_selector,
            price_selector,
        } => parse_node_block(
            block,
            profile,
            link_selector,
            image_selector,
            currency_selector,
            price_selector,
        ),
    }
}

/// One result block carrying an embedded ld+json product fragment.
fn parse_structured_block(
    block: &ElementRef,
    profile: &SearchProfile,
    script_selector: &str,
) -> Result<Listing> {
    let selector = Selector::parse(script_selector)
        .map_err(|e| ScraperError::Parse(format!("invalid script selector: {}", e)))?;
    let script = block
        .select(&selector)
        .next()
        .ok_or_else(|| ScraperError::Parse("no structured-data fragment in block".to_string()))?;

    let raw: String = script.text().collect();
    let data: serde_json::Value = serde_json::from_str(raw.trim())?;
    let offers = &data["offers"];

    let item_path = offers["url"]
        .as_str()
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ScraperError::Parse("offer url missing".to_string()))?;
    let id = item_path
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string();
    if id.is_empty() {
        return Err(ScraperError::Parse(format!("no item id in '{}'", item_path)));
    }

    let price = match &offers["price"] {
        serde_json::Value::Number(n) => n.as_f64().unwrap_or(0.0),
        serde_json::Value::String(s) => parse_float_loose(s).unwrap_or(0.0),
        _ => return Err(ScraperError::Parse("offer price missing".to_string())),
    };
    if price < 0.0 {
        return Err(ScraperError::Parse(format!("negative price for {}", id)));
    }

    let last_segment =
        |value: &serde_json::Value| -> String {
            value
                .as_str()
                .map(|s| s.trim_end_matches('/').rsplit('/').next().unwrap_or_default().to_string())
                .unwrap_or_default()
        };

    Ok(Listing {
        id,
        name: data["name"].as_str().unwrap_or_default().to_string(),
        price,
        currency: offers["priceCurrency"].as_str().unwrap_or_default().to_string(),
        brand: data["brand"]["name"].as_str().map(|s| s.to_string()),
        image_url: match &data["image"] {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Array(items) => items
                .first()
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            _ => String::new(),
        },
        condition_grade: last_segment(&offers["itemCondition"]),
        availability: last_segment(&offers["availability"]),
        detail_url: format!("{}{}", profile.base_url, item_path),
        detail: None,
    })
}

/// One result block read from individual text/attribute nodes.
fn parse_node_block(
    block: &ElementRef,
    profile: &SearchProfile,
    link_selector: &str,
    image_selector: &str,
    currency_selector: &str,
    price_selector: &str,
) -> Result<Listing> {
    let select_first = |raw: &str| -> Result<Selector> {
        Selector::parse(raw).map_err(|e| ScraperError::Parse(format!("invalid selector: {}", e)))
    };

    let href = block
        .select(&select_first(link_selector)?)
        .next()
        .and_then(|el| el.value().attr("href"))
        .ok_or_else(|| ScraperError::Parse("no item link in block".to_string()))?;
    if !href.starts_with("/item/") {
        return Err(ScraperError::Parse(format!("unexpected item link '{}'", href)));
    }
    let id = href
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string();

    let image = block.select(&select_first(image_selector)?).next();
    let name = image
        .and_then(|el| el.value().attr("alt"))
        .unwrap_or_default()
        .to_string();
    let image_url = image
        .and_then(|el| el.value().attr("src"))
        .unwrap_or_default()
        .to_string();

    let currency = block
        .select(&select_first(currency_selector)?)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .unwrap_or_default();

    let price_text = block
        .select(&select_first(price_selector)?)
        .next()
        .map(|el| el.text().collect::<String>())
        .ok_or_else(|| ScraperError::Parse(format!("no price node for {}", id)))?;
    let price = parse_float_loose(&price_text)
        .ok_or_else(|| ScraperError::Parse(format!("unparseable price '{}'", price_text.trim())))?;

    Ok(Listing {
        id: id.clone(),
        name,
        price,
        currency,
        brand: None,
        image_url,
        condition_grade: String::new(),
        availability: String::new(),
        detail_url: format!("{}/item/{}", profile.base_url, id),
        detail: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marketplace::MarketplaceProfile;

    const MOCK_US_GRID: &str = r#"
    <div data-testid="Search-items">
        <div data-itemstatus="on_sale">
            <script type="application/ld+json">
            {"name": "iPhone 13 Pro", "image": "https://img.example/m111.jpg",
             "brand": {"name": "Apple"},
             "offers": {"url": "/us/item/m111/", "price": "450", "priceCurrency": "USD",
                        "itemCondition": "https://schema.org/UsedCondition",
                        "availability": "https://schema.org/InStock"}}
            </script>
        </div>
        <div data-itemstatus="on_sale">
            <script type="application/ld+json">not valid json at all</script>
        </div>
        <div data-itemstatus="on_sale">
            <script type="application/ld+json">
            {"name": "iPhone 12", "image": ["https://img.example/m222.jpg"],
             "offers": {"url": "/us/item/m222/", "price": 300, "priceCurrency": "USD",
                        "itemCondition": "https://schema.org/NewCondition",
                        "availability": "https://schema.org/InStock"}}
            </script>
        </div>
    </div>
    "#;

    const MOCK_JP_GRID: &str = r#"
    <div data-testid="search-item-grid">
        <div data-testid="item-cell">
            <a data-testid="thumbnail-link" href="/item/m18276289519"></a>
            <img alt="ニンテンドースイッチ本体" src="https://img.example/m18276289519.jpg">
            <span class="currency__abc">¥</span>
            <span class="number__abc">19,800</span>
        </div>
        <div data-testid="item-cell">
            <a data-testid="thumbnail-link" href="/shop/product/xyz"></a>
        </div>
    </div>
    "#;

    #[test]
    fn test_url_has_keyword_and_scaled_prices_us() {
        let profile = MarketplaceProfile::mercari().search;
        let mut request = SearchRequest::new("iphone");
        request.min_price = Some(100);
        request.max_price = Some(500);

        let url = build_search_url(&profile, &request).unwrap();
        let s = url.as_str();
        assert!(s.starts_with("https://www.mercari.com/search/?"));
        assert!(s.contains("keyword=iphone"));
        // minor-unit pricing: dollars become cents
        assert!(s.contains("minPrice=10000"));
        assert!(s.contains("maxPrice=50000"));
    }

    #[test]
    fn test_url_has_raw_prices_jp() {
        let profile = MarketplaceProfile::mercari_jp().search;
        let mut request = SearchRequest::new("iphone");
        request.min_price = Some(100);
        request.max_price = Some(500);

        let url = build_search_url(&profile, &request).unwrap();
        let s = url.as_str();
        assert!(s.starts_with("https://jp.mercari.com/search/?"));
        assert!(s.contains("price_min=100"));
        assert!(s.contains("price_max=500"));
    }

    #[test]
    fn test_url_encodes_keyword_and_omits_default_sort() {
        let profile = MarketplaceProfile::mercari_jp().search;
        let request = SearchRequest::new("nintendo switch");

        let url = build_search_url(&profile, &request).unwrap();
        assert!(url.as_str().contains("keyword=nintendo+switch"));
        assert!(!url.as_str().contains("sort="));

        let mut sorted = SearchRequest::new("nintendo switch");
        sorted.sort = SortBy::Price;
        sorted.order = SortOrder::Asc;
        let url = build_search_url(&profile, &sorted).unwrap();
        assert!(url.as_str().contains("sort=price"));
        assert!(url.as_str().contains("order=asc"));
    }

    #[test]
    fn test_parse_us_grid_skips_bad_block() {
        let profile = MarketplaceProfile::mercari().search;
        let listings = parse_search_results(MOCK_US_GRID, &profile, 10).unwrap();

        // malformed middle block dropped, not fatal
        assert_eq!(listings.len(), 2);
        assert_eq!(listings[0].id, "m111");
        assert_eq!(listings[0].name, "iPhone 13 Pro");
        assert_eq!(listings[0].price, 450.0);
        assert_eq!(listings[0].currency, "USD");
        assert_eq!(listings[0].brand.as_deref(), Some("Apple"));
        assert_eq!(listings[0].condition_grade, "UsedCondition");
        assert_eq!(listings[0].availability, "InStock");
        assert_eq!(listings[0].detail_url, "https://www.mercari.com/us/item/m111/");

        assert_eq!(listings[1].id, "m222");
        assert_eq!(listings[1].image_url, "https://img.example/m222.jpg");
    }

    #[test]
    fn test_parse_jp_grid_reads_nodes() {
        let profile = MarketplaceProfile::mercari_jp().search;
        let listings = parse_search_results(MOCK_JP_GRID, &profile, 10).unwrap();

        // second cell links outside /item/ and is skipped
        assert_eq!(listings.len(), 1);
        let listing = &listings[0];
        assert_eq!(listing.id, "m18276289519");
        assert_eq!(listing.name, "ニンテンドースイッチ本体");
        assert_eq!(listing.price, 19800.0);
        assert_eq!(listing.currency, "¥");
        assert_eq!(listing.detail_url, "https://jp.mercari.com/item/m18276289519");
    }

    #[test]
    fn test_parse_respects_max_items() {
        let profile = MarketplaceProfile::mercari().search;
        let listings = parse_search_results(MOCK_US_GRID, &profile, 1).unwrap();
        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].id, "m111");
    }

    #[test]
    fn test_missing_grid_is_parse_error() {
        let profile = MarketplaceProfile::mercari().search;
        let err = parse_search_results("<html><body></body></html>", &profile, 10).unwrap_err();
        assert!(matches!(err, ScraperError::Parse(_)));
    }

    #[test]
    fn test_batch_ids_unique() {
        let profile = MarketplaceProfile::mercari().search;
        let listings = parse_search_results(MOCK_US_GRID, &profile, 10).unwrap();
        let mut ids: Vec<&str> = listings.iter().map(|l| l.id.as_str()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), listings.len());
    }
}
