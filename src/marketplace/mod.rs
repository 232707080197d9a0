use crate::error::{Result, ScraperError};
use crate::models::{SortBy, SortOrder};
use crate::pages::detail::{FieldCast, FieldSource, FieldSpec};

/// Locale/device identity a session presents to one marketplace.
#[derive(Debug, Clone)]
pub struct DeviceProfile {
    pub user_agent: &'static str,
    pub platform: &'static str,
    pub viewport: (u32, u32),
    pub accept_language: &'static str,
    pub timezone: &'static str,
    /// (latitude, longitude)
    pub geolocation: (f64, f64),
}

/// How one result block is turned into a `Listing`.
#[derive(Debug, Clone)]
pub enum ListingSource {
    /// Each block embeds an `application/ld+json` product fragment.
    StructuredData { script_selector: &'static str },
    /// Fields are read from individual text/attribute nodes.
    NodeAttrs {
        link_selector: &'static str,
        image_selector: &'static str,
        currency_selector: &'static str,
        price_selector: &'static str,
    },
}

#[derive(Debug, Clone)]
pub struct SearchProfile {
    pub base_url: &'static str,
    pub search_path: &'static str,
    pub keyword_param: &'static str,
    pub min_price_param: &'static str,
    pub max_price_param: &'static str,
    /// Multiplier into the marketplace's native price unit: 100 where the
    /// site expects minor currency units, 1 where it takes raw major units.
    pub price_scale: u32,
    pub sort_param: &'static str,
    pub order_param: &'static str,
    pub sort_value: fn(SortBy) -> Option<&'static str>,
    pub order_value: fn(SortOrder) -> &'static str,
    /// Text rendered by the empty-result page state.
    pub empty_text: &'static str,
    /// Results grid; its presence is the "has results" readiness signal.
    pub grid_selector: &'static str,
    pub item_selector: &'static str,
    pub source: ListingSource,
}

#[derive(Debug, Clone)]
pub struct DetailProfile {
    /// Canonical readiness anchor for the detail page.
    pub ready_selector: &'static str,
    /// Some variants lazy-load below-the-fold sections.
    pub scroll_after_ready: bool,
    /// Builds the field-extractor table with the configured per-field timeout.
    pub fields: fn(u64) -> Vec<FieldSpec>,
}

/// Everything that differs between marketplace variants, so one engine can
/// serve all of them.
#[derive(Debug, Clone)]
pub struct MarketplaceProfile {
    /// Also the cache namespace for this variant.
    pub name: &'static str,
    pub device: DeviceProfile,
    pub search: SearchProfile,
    pub detail: DetailProfile,
    pub max_concurrent_details: usize,
}

impl MarketplaceProfile {
    pub fn by_name(name: &str) -> Result<Self> {
        match name {
            "mercari" => Ok(Self::mercari()),
            "mercari_jp" => Ok(Self::mercari_jp()),
            other => Err(ScraperError::Config(format!(
                "unknown marketplace '{}', expected 'mercari' or 'mercari_jp'",
                other
            ))),
        }
    }

    /// Mercari US: minor-unit (cent) pricing, ld+json per result block.
    pub fn mercari() -> Self {
        Self {
            name: "mercari",
            device: DeviceProfile {
                user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                             (KHTML, like Gecko) Chrome/138.0.0.0 Safari/537.36",
                platform: "Win32",
                viewport: (1366, 768),
                accept_language: "en-US",
                timezone: "America/New_York",
                geolocation: (40.7128, -74.0060),
            },
            search: SearchProfile {
                base_url: "https://www.mercari.com",
                search_path: "/search/",
                keyword_param: "keyword",
                min_price_param: "minPrice",
                max_price_param: "maxPrice",
                price_scale: 100,
                sort_param: "sortBy",
                order_param: "order",
                sort_value: |sort| match sort {
                    SortBy::Relevance => None,
                    SortBy::Price => Some("price"),
                    SortBy::Created => Some("created"),
                    SortBy::Likes => Some("likes"),
                },
                order_value: |order| match order {
                    SortOrder::Asc => "asc",
                    SortOrder::Desc => "desc",
                },
                empty_text: "No results found",
                grid_selector: r#"[data-testid="Search-items"]"#,
                item_selector: r#"div[data-itemstatus="on_sale"]"#,
                source: ListingSource::StructuredData {
                    script_selector: r#"script[type="application/ld+json"]"#,
                },
            },
            detail: DetailProfile {
                ready_selector: r#"[data-testid="ItemDetailsDescription"]"#,
                scroll_after_ready: false,
                fields: mercari_detail_fields,
            },
            max_concurrent_details: 10,
        }
    }

    /// Mercari Japan: raw yen pricing, per-node listing reads.
    pub fn mercari_jp() -> Self {
        Self {
            name: "mercari_jp",
            device: DeviceProfile {
                user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                             (KHTML, like Gecko) Chrome/138.0.0.0 Safari/537.36",
                platform: "Win32",
                viewport: (1366, 768),
                accept_language: "ja-JP",
                timezone: "Asia/Tokyo",
                geolocation: (35.6895, 139.6917),
            },
            search: SearchProfile {
                base_url: "https://jp.mercari.com",
                search_path: "/search/",
                keyword_param: "keyword",
                min_price_param: "price_min",
                max_price_param: "price_max",
                price_scale: 1,
                sort_param: "sort",
                order_param: "order",
                sort_value: |sort| match sort {
                    SortBy::Relevance => None,
                    SortBy::Price => Some("price"),
                    SortBy::Created => Some("created_time"),
                    SortBy::Likes => Some("num_likes"),
                },
                order_value: |order| match order {
                    SortOrder::Asc => "asc",
                    SortOrder::Desc => "desc",
                },
                empty_text: "No results found",
                grid_selector: r#"[data-testid="search-item-grid"]"#,
                item_selector: r#"[data-testid="item-cell"]"#,
                source: ListingSource::NodeAttrs {
                    link_selector: r#"[data-testid="thumbnail-link"]"#,
                    image_selector: "img",
                    currency_selector: r#"span[class^="currency__"]"#,
                    price_selector: r#"span[class^="number__"]"#,
                },
            },
            detail: DetailProfile {
                ready_selector: r#"[data-testid="description"]"#,
                scroll_after_ready: true,
                fields: mercari_jp_detail_fields,
            },
            max_concurrent_details: 5,
        }
    }
}

fn mercari_detail_fields(timeout_ms: u64) -> Vec<FieldSpec> {
    vec![
        FieldSpec::new("price_drop", r#"[data-testid="ItemPriceDrop"]"#, FieldSource::Text, FieldCast::Text, timeout_ms),
        FieldSpec::new("description", r#"[data-testid="ItemDetailsDescription"]"#, FieldSource::Text, FieldCast::Text, timeout_ms),
        FieldSpec::new("condition_text", r#"[data-testid="ItemDetailsCondition"]"#, FieldSource::Text, FieldCast::Text, timeout_ms),
        FieldSpec::new("posted_date", r#"[data-testid="ItemDetailsPosted"]"#, FieldSource::Text, FieldCast::Text, timeout_ms),
        FieldSpec::new("delivery_origin", r#"[data-testid="MobileShippingAndPaymentsAreaName"]"#, FieldSource::Text, FieldCast::Text, timeout_ms),
        FieldSpec::new("shipping_fee", r#"[data-testid="ItemDetailsShipping"]"#, FieldSource::Text, FieldCast::Text, timeout_ms),
        FieldSpec::new("seller_name", r#"[data-testid="ItemDetailsSellerName"]"#, FieldSource::Text, FieldCast::Text, timeout_ms),
        FieldSpec::new("seller_handle", r#"[data-testid="ItemDetailsSellerUserName"]"#, FieldSource::Text, FieldCast::Text, timeout_ms),
        FieldSpec::new("seller_review_count", r#"[data-testid="SellerRatingCount"]"#, FieldSource::Text, FieldCast::Integer, timeout_ms),
        FieldSpec::new("seller_rating", r#"[data-testid="ReviewStarsWrapper"]"#, FieldSource::Attribute("data-stars"), FieldCast::Float, timeout_ms),
        FieldSpec::new("categories", r#"a[data-testid^="Category_"]"#, FieldSource::TextList, FieldCast::TextList, timeout_ms),
    ]
}

fn mercari_jp_detail_fields(timeout_ms: u64) -> Vec<FieldSpec> {
    vec![
        FieldSpec::new("converted_price", r#"[data-testid="converted-currency-section"]"#, FieldSource::Text, FieldCast::Text, timeout_ms),
        FieldSpec::new("description", r#"[data-testid="description"]"#, FieldSource::Text, FieldCast::Text, timeout_ms),
        FieldSpec::new("condition_text", r#"[data-testid="商品の状態"]"#, FieldSource::Text, FieldCast::Text, timeout_ms),
        FieldSpec::new("delivery_origin", r#"[data-testid="発送元の地域"]"#, FieldSource::Text, FieldCast::Text, timeout_ms),
        FieldSpec::new("seller_name", r#"[data-testid="seller-link"]"#, FieldSource::Attribute("aria-label"), FieldCast::Text, timeout_ms),
        FieldSpec::new("seller_rating", "div.merRating", FieldSource::Attribute("aria-label"), FieldCast::Float, timeout_ms),
        FieldSpec::new("seller_review_count", r#"div.merRating span[class^="count__"]"#, FieldSource::Text, FieldCast::Integer, timeout_ms),
        FieldSpec::new("seller_verification_status", r#"[data-testid="seller-link"] div[class^="verificationContainer__"]"#, FieldSource::Text, FieldCast::Text, timeout_ms),
        FieldSpec::new("num_likes", r#"[data-testid="icon-heart-button"]"#, FieldSource::Text, FieldCast::Integer, timeout_ms),
        FieldSpec::new("categories", r#"[data-testid="item-detail-category"] a"#, FieldSource::TextList, FieldCast::TextList, timeout_ms),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_name() {
        assert_eq!(MarketplaceProfile::by_name("mercari").unwrap().name, "mercari");
        assert_eq!(MarketplaceProfile::by_name("mercari_jp").unwrap().name, "mercari_jp");
        assert!(MarketplaceProfile::by_name("ebay").is_err());
    }

    #[test]
    fn test_price_units_differ_per_variant() {
        // US takes cents, JP takes raw yen
        assert_eq!(MarketplaceProfile::mercari().search.price_scale, 100);
        assert_eq!(MarketplaceProfile::mercari_jp().search.price_scale, 1);
    }

    #[test]
    fn test_sort_mappings() {
        let us = MarketplaceProfile::mercari().search;
        assert_eq!((us.sort_value)(SortBy::Relevance), None);
        assert_eq!((us.sort_value)(SortBy::Price), Some("price"));

        let jp = MarketplaceProfile::mercari_jp().search;
        assert_eq!((jp.sort_value)(SortBy::Created), Some("created_time"));
        assert_eq!((jp.order_value)(SortOrder::Asc), "asc");
    }

    #[test]
    fn test_detail_tables_carry_configured_timeout() {
        let fields = (MarketplaceProfile::mercari().detail.fields)(1500);
        assert!(!fields.is_empty());
        assert!(fields.iter().all(|f| f.timeout_ms == 1500));
        // every variant extracts a description
        let jp_fields = (MarketplaceProfile::mercari_jp().detail.fields)(1500);
        assert!(jp_fields.iter().any(|f| f.name == "description"));
    }
}
