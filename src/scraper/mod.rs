use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::browser::SessionManager;
use crate::cache::{DetailCache, FileCache};
use crate::config::Config;
use crate::error::Result;
use crate::limiter::ConcurrencyLimiter;
use crate::marketplace::MarketplaceProfile;
use crate::models::{dedup_listings, ItemDetail, Listing};
use crate::pages::{DetailPage, SearchPage, SearchRequest};
use crate::retry::RetryPolicy;

/// Fetches one item's detail record, given its absolute URL.
///
/// The seam between orchestration and the browser: the real implementation
/// drives a page context, tests substitute a scripted fetcher.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DetailFetcher: Send + Sync {
    async fn fetch(&self, detail_url: &str) -> Result<ItemDetail>;
}

/// Fetcher that runs a fresh page context per detail fetch, releasing the
/// page on every exit path.
struct PageDetailFetcher<'a> {
    session: &'a SessionManager,
    profile: &'a MarketplaceProfile,
    page_ready_timeout: Duration,
    field_timeout_ms: u64,
}

#[async_trait]
impl DetailFetcher for PageDetailFetcher<'_> {
    async fn fetch(&self, detail_url: &str) -> Result<ItemDetail> {
        let page = self.session.new_page().await?;
        let result = DetailPage::new(
            &page,
            &self.profile.detail,
            self.page_ready_timeout,
            self.field_timeout_ms,
        )
        .get_detail(detail_url)
        .await;
        self.session.release_page(page).await;
        result
    }
}

/// Cache-aside enrichment over a batch of listings: per listing, try the
/// cache, then fetch under the concurrency bound, then write through.
///
/// Enrichment never fails the batch. A listing whose fetch fails keeps
/// `detail: None` and the rest of the batch proceeds.
pub(crate) struct EnrichmentPipeline {
    cache: Arc<dyn DetailCache>,
    limiter: ConcurrencyLimiter,
    namespace: &'static str,
}

impl EnrichmentPipeline {
    pub(crate) fn new(
        cache: Arc<dyn DetailCache>,
        limiter: ConcurrencyLimiter,
        namespace: &'static str,
    ) -> Self {
        Self {
            cache,
            limiter,
            namespace,
        }
    }

    /// Enrich every listing in place, preserving input order.
    pub(crate) async fn enrich(
        &self,
        listings: Vec<Listing>,
        fetcher: &dyn DetailFetcher,
    ) -> Vec<Listing> {
        let tasks = listings.into_iter().map(|mut listing| async move {
            self.enrich_one(&mut listing, fetcher).await;
            listing
        });
        futures::future::join_all(tasks).await
    }

    async fn enrich_one(&self, listing: &mut Listing, fetcher: &dyn DetailFetcher) {
        if let Some(cached) = self.cache.get(self.namespace, &listing.id).await {
            debug!("Cache hit for {}", listing.id);
            listing.detail = Some(cached);
            return;
        }

        // cache hits skip the limiter; only real fetches hold a slot
        let _permit = match self.limiter.acquire().await {
            Ok(permit) => permit,
            Err(e) => {
                warn!("Skipping enrichment of {}: {}", listing.id, e);
                return;
            }
        };

        match fetcher.fetch(&listing.detail_url).await {
            Ok(detail) => {
                self.cache.set(self.namespace, &listing.id, &detail).await;
                listing.detail = Some(detail);
            }
            Err(e) => {
                warn!("Failed to fetch detail for {}: {}", listing.id, e);
            }
        }
    }

    pub(crate) async fn clear(&self) -> Result<()> {
        self.cache.clear(self.namespace).await
    }
}

/// One browser session driving searches against one marketplace variant.
pub struct MarketScraper {
    session: SessionManager,
    profile: MarketplaceProfile,
    pipeline: EnrichmentPipeline,
    retry: RetryPolicy,
    page_ready_timeout: Duration,
    field_timeout_ms: u64,
}

impl MarketScraper {
    /// Launch a browser session for the configured marketplace, backed by
    /// an on-disk detail cache.
    pub async fn launch(config: Config) -> Result<Self> {
        let cache = Arc::new(FileCache::new(config.cache.directory.clone()));
        Self::launch_with_cache(config, cache).await
    }

    /// Same as `launch`, with a caller-supplied cache backend.
    pub async fn launch_with_cache(
        config: Config,
        cache: Arc<dyn DetailCache>,
    ) -> Result<Self> {
        let profile = MarketplaceProfile::by_name(&config.marketplace)?;
        let session = SessionManager::launch(profile.device.clone(), config.headless).await?;

        let bound = if config.concurrency.max_concurrent_details == 0 {
            profile.max_concurrent_details
        } else {
            config.concurrency.max_concurrent_details
        };
        let pipeline = EnrichmentPipeline::new(cache, ConcurrencyLimiter::new(bound), profile.name);

        info!(
            "Scraper ready for '{}' ({} concurrent detail fetches)",
            profile.name, bound
        );
        Ok(Self {
            session,
            retry: RetryPolicy::from_config(&config.retry),
            page_ready_timeout: Duration::from_millis(config.timeouts.page_ready_ms),
            field_timeout_ms: config.timeouts.field_ms,
            profile,
            pipeline,
        })
    }

    /// Run one search and enrich every result with its detail record.
    ///
    /// The search itself is retried end to end on transient failures; an
    /// empty result page surfaces as `ScraperError::NotFound` once retries
    /// are exhausted. Enrichment failures never fail the batch.
    pub async fn search_items(&self, request: &SearchRequest) -> Result<Vec<Listing>> {
        let session = &self.session;
        let profile = &self.profile;
        let page_ready_timeout = self.page_ready_timeout;

        let listings = self
            .retry
            .run(move || async move {
                let page = session.new_page().await?;
                let result = SearchPage::new(&page, &profile.search, page_ready_timeout)
                    .search(request)
                    .await;
                session.release_page(page).await;
                result
            })
            .await?;

        let listings = dedup_listings(listings);
        let fetcher = PageDetailFetcher {
            session: &self.session,
            profile: &self.profile,
            page_ready_timeout: self.page_ready_timeout,
            field_timeout_ms: self.field_timeout_ms,
        };
        Ok(self.pipeline.enrich(listings, &fetcher).await)
    }

    /// Drop every cached detail for this marketplace variant.
    pub async fn clear_cache(&self) -> Result<()> {
        info!("Clearing detail cache for '{}'", self.profile.name);
        self.pipeline.clear().await
    }

    pub fn marketplace(&self) -> &'static str {
        self.profile.name
    }

    pub async fn close(self) -> Result<()> {
        self.session.close().await
    }
}
