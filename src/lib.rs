//! Headless-browser scraper for Mercari marketplace search.
//!
//! Runs a search against a marketplace variant, parses the result grid into
//! listings, then enriches each listing from its item detail page with a
//! persistent cache, a concurrency bound, and retry with backoff.

pub mod browser;
pub mod cache;
pub mod config;
pub mod error;
pub mod limiter;
pub mod marketplace;
pub mod models;
pub mod pages;
pub mod retry;
pub mod scraper;

pub use cache::{DetailCache, FileCache, MemoryCache};
pub use config::{Config, FileConfigManager};
pub use error::{Result, ScraperError};
pub use limiter::ConcurrencyLimiter;
pub use marketplace::MarketplaceProfile;
pub use models::{dedup_listings, ItemDetail, Listing, SortBy, SortOrder};
pub use pages::SearchRequest;
pub use retry::RetryPolicy;
pub use scraper::MarketScraper;
