use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::{
    SetDeviceMetricsOverrideParams, SetGeolocationOverrideParams, SetTimezoneOverrideParams,
    SetUserAgentOverrideParams,
};
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{Result, ScraperError};
use crate::marketplace::DeviceProfile;

/// Owns the single headless-browser process for one scraper instance and
/// hands out isolated page contexts configured with the marketplace's
/// device/locale profile.
///
/// Launch failure is fatal: there is no retry path for a browser that will
/// not start.
pub struct SessionManager {
    browser: Browser,
    handler_task: tokio::task::JoinHandle<()>,
    device: DeviceProfile,
}

impl SessionManager {
    pub async fn launch(device: DeviceProfile, headless: bool) -> Result<Self> {
        // unique user data dir to avoid singleton lock issues between runs
        let user_data_dir = std::env::temp_dir().join(format!(
            "mercari-scraper-{}-{}",
            std::process::id(),
            chrono::Utc::now().timestamp_millis()
        ));
        std::fs::create_dir_all(&user_data_dir)
            .map_err(|e| ScraperError::Session(format!("Failed to create user data dir: {}", e)))?;

        let mut config = BrowserConfig::builder().no_sandbox().args(vec![
            "--disable-gpu",
            "--disable-dev-shm-usage",
            "--disable-extensions",
            "--disable-images",
            "--mute-audio",
            "--no-first-run",
            "--disable-default-apps",
            "--disable-sync",
            "--disable-background-networking",
            "--disable-blink-features=AutomationControlled",
            "--disable-background-timer-throttling",
            "--disable-renderer-backgrounding",
            "--log-level=3",
        ]);
        config = config.user_data_dir(&user_data_dir);
        if !headless {
            config = config.with_head();
        }

        let browser_config = config
            .build()
            .map_err(|e| ScraperError::Session(format!("Failed to build browser config: {}", e)))?;

        info!("Launching browser...");
        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| ScraperError::Session(format!("Failed to launch browser: {}", e)))?;

        let handler_task = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if let Err(e) = h {
                    // filter out common websocket deserialization noise
                    let error_msg = e.to_string();
                    if error_msg.contains("data did not match any variant")
                        || error_msg.contains("untagged enum Message")
                    {
                        debug!("Ignoring WebSocket deserialization error: {}", e);
                    } else {
                        warn!("Browser handler error: {}", e);
                    }
                }
            }
            debug!("Browser handler task ended");
        });

        info!("Browser launched");
        Ok(Self {
            browser,
            handler_task,
            device,
        })
    }

    /// Create a fresh page context carrying the marketplace device profile.
    ///
    /// Each page is scoped to exactly one navigation task; callers close it
    /// when that task ends.
    pub async fn new_page(&self) -> Result<Page> {
        let page = match tokio::time::timeout(
            Duration::from_secs(10),
            self.browser.new_page("about:blank"),
        )
        .await
        {
            Ok(Ok(page)) => page,
            Ok(Err(e)) => {
                return Err(ScraperError::Browser(format!(
                    "Failed to create new page: {}",
                    e
                )))
            }
            Err(_) => {
                return Err(ScraperError::Browser(
                    "Timeout creating new page".to_string(),
                ))
            }
        };

        self.apply_device_profile(&page).await?;
        Ok(page)
    }

    async fn apply_device_profile(&self, page: &Page) -> Result<()> {
        let user_agent = SetUserAgentOverrideParams::builder()
            .user_agent(self.device.user_agent)
            .accept_language(self.device.accept_language)
            .platform(self.device.platform)
            .build()
            .map_err(|e| ScraperError::Browser(format!("Failed to build user agent params: {}", e)))?;
        page.execute(user_agent).await?;

        let (width, height) = self.device.viewport;
        let device_metrics = SetDeviceMetricsOverrideParams::builder()
            .width(width as i64)
            .height(height as i64)
            .device_scale_factor(1.0)
            .mobile(false)
            .build()
            .map_err(|e| ScraperError::Browser(format!("Failed to build device metrics: {}", e)))?;
        page.execute(device_metrics).await?;

        page.execute(SetTimezoneOverrideParams::new(self.device.timezone))
            .await?;

        let (latitude, longitude) = self.device.geolocation;
        let geolocation = SetGeolocationOverrideParams::builder()
            .latitude(latitude)
            .longitude(longitude)
            .accuracy(1.0)
            .build();
        page.execute(geolocation).await?;

        debug!("Applied device profile to new page");
        Ok(())
    }

    /// Close a page context, logging rather than propagating failures so
    /// release never masks the task's own outcome.
    pub async fn release_page(&self, page: Page) {
        if let Err(e) = page.close().await {
            warn!("Failed to close page: {}", e);
        }
    }

    /// Tear down the browser process and its handler loop.
    pub async fn close(mut self) -> Result<()> {
        info!("Shutting down browser session");
        self.browser
            .close()
            .await
            .map_err(|e| ScraperError::Session(format!("Failed to close browser: {}", e)))?;
        self.handler_task.abort();
        Ok(())
    }
}
