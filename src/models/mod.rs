use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A search-result summary record for one marketplace item.
///
/// Produced by the search extractor; `detail` is attached later by the
/// orchestrator when enrichment succeeds. A listing without `detail` is a
/// valid partial result, never an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing {
    pub id: String,
    pub name: String,
    pub price: f64,
    pub currency: String,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub condition_grade: String,
    #[serde(default)]
    pub availability: String,
    pub detail_url: String,
    #[serde(default)]
    pub detail: Option<ItemDetail>,
}

/// The enriched record fetched from an item's own detail page.
///
/// Always fully populated: any field that fails to extract resolves to its
/// default instead of leaving the record partially absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemDetail {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub condition_text: String,
    #[serde(default)]
    pub posted_date: String,
    #[serde(default)]
    pub delivery_origin: String,
    #[serde(default)]
    pub shipping_fee: String,
    #[serde(default)]
    pub seller_name: String,
    #[serde(default)]
    pub seller_handle: String,
    #[serde(default)]
    pub seller_review_count: u32,
    #[serde(default)]
    pub seller_rating: f64,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub seller_verification_status: String,
    #[serde(default)]
    pub num_likes: u32,
    #[serde(default)]
    pub converted_price: String,
    #[serde(default)]
    pub price_drop: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    Relevance,
    Price,
    Created,
    Likes,
}

impl Default for SortBy {
    fn default() -> Self {
        SortBy::Relevance
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl Default for SortOrder {
    fn default() -> Self {
        SortOrder::Desc
    }
}

/// Drop listings whose id was already seen, keeping first-seen order.
///
/// Ids are unique within one search batch; this is for callers that
/// aggregate listings across several searches.
pub fn dedup_listings(listings: Vec<Listing>) -> Vec<Listing> {
    let mut seen = HashSet::new();
    listings
        .into_iter()
        .filter(|listing| seen.insert(listing.id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(id: &str, price: f64) -> Listing {
        Listing {
            id: id.to_string(),
            name: format!("item {}", id),
            price,
            currency: "USD".to_string(),
            brand: None,
            image_url: String::new(),
            condition_grade: String::new(),
            availability: String::new(),
            detail_url: format!("https://www.mercari.com/us/item/{}/", id),
            detail: None,
        }
    }

    #[test]
    fn test_dedup_keeps_first_seen_order() {
        let items = vec![
            listing("m1", 10.0),
            listing("m2", 20.0),
            listing("m1", 99.0),
            listing("m3", 30.0),
            listing("m2", 99.0),
        ];

        let unique = dedup_listings(items);
        let ids: Vec<&str> = unique.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m2", "m3"]);
        // first occurrence wins
        assert_eq!(unique[0].price, 10.0);
        assert_eq!(unique[1].price, 20.0);
    }

    #[test]
    fn test_item_detail_deserializes_with_defaults() {
        let detail: ItemDetail = serde_json::from_str(r#"{"description": "like new"}"#).unwrap();
        assert_eq!(detail.description, "like new");
        assert_eq!(detail.seller_review_count, 0);
        assert_eq!(detail.seller_rating, 0.0);
        assert!(detail.categories.is_empty());
        assert_eq!(detail.num_likes, 0);
    }

    #[test]
    fn test_listing_roundtrip_preserves_detail() {
        let mut item = listing("m42", 42.0);
        item.detail = Some(ItemDetail {
            description: "boxed".to_string(),
            ..ItemDetail::default()
        });

        let json = serde_json::to_string(&item).unwrap();
        let back: Listing = serde_json::from_str(&json).unwrap();
        assert_eq!(back.detail.unwrap().description, "boxed");
    }
}
