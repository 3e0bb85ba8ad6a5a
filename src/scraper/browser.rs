//! Chrome session using chromiumoxide.

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::session::{is_not_found_url, NavigationResult, Session};
use crate::config::BrowserSettings;
use crate::errors::{CrawlError, SessionError};

/// One browser with a single reused tab
pub struct ChromeSession {
    browser: Browser,
    handle: tokio::task::JoinHandle<()>,
    page: Page,
    settings: BrowserSettings,
    not_found_markers: Vec<String>,
}

impl ChromeSession {
    /// Launch Chrome and open a blank tab
    pub async fn launch(
        settings: &BrowserSettings,
        not_found_markers: &[String],
    ) -> Result<Self, CrawlError> {
        let executable = settings.executable();
        info!("Launching browser: {}", executable);

        let mut builder = BrowserConfig::builder()
            .chrome_executable(&executable)
            .no_sandbox()
            .disable_default_args()
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-software-rasterizer")
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-extensions")
            .arg("--disable-background-networking")
            .arg("--disable-sync")
            .arg("--disable-translate")
            .arg("--mute-audio")
            .window_size(settings.window_width, settings.window_height)
            .launch_timeout(settings.launch_timeout());

        if settings.headless {
            builder = builder.arg("--headless=new");
        } else {
            builder = builder.with_head();
        }
        if let Some(agent) = settings.user_agent.as_deref() {
            builder = builder.arg(format!("--user-agent={}", agent));
        }
        for arg in &settings.extra_args {
            builder = builder.arg(arg.as_str());
        }

        let config = builder.build().map_err(CrawlError::SessionStart)?;

        let (browser, mut handler) = timeout(settings.launch_timeout(), Browser::launch(config))
            .await
            .map_err(|_| {
                CrawlError::SessionStart(format!(
                    "browser did not start within {:?}",
                    settings.launch_timeout()
                ))
            })?
            .map_err(|e| CrawlError::SessionStart(e.to_string()))?;

        // The handler drives the CDP connection and must keep running
        let handle = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler error: {}", e);
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                handle.abort();
                return Err(CrawlError::SessionStart(format!("failed to open tab: {}", e)));
            }
        };

        Ok(Self {
            browser,
            handle,
            page,
            settings: settings.clone(),
            not_found_markers: not_found_markers.to_vec(),
        })
    }

    async fn load(&self, url: &str) -> Result<String, String> {
        self.page.goto(url).await.map_err(|e| e.to_string())?;
        if self.settings.reload_after_navigate {
            self.page.reload().await.map_err(|e| e.to_string())?;
        }
        let final_url = self.page.url().await.map_err(|e| e.to_string())?;
        Ok(final_url.unwrap_or_else(|| url.to_string()))
    }
}

impl Session for ChromeSession {
    async fn navigate(&mut self, url: &str) -> NavigationResult {
        let limit = self.settings.navigation_timeout();
        match timeout(limit, self.load(url)).await {
            Ok(Ok(final_url)) if is_not_found_url(&final_url, &self.not_found_markers) => {
                debug!("{} redirected to {}", url, final_url);
                NavigationResult::NotFound { final_url }
            }
            Ok(Ok(final_url)) => NavigationResult::Loaded { final_url },
            Ok(Err(cause)) => NavigationResult::Failed { cause },
            Err(_) => NavigationResult::Failed {
                cause: format!("navigation timed out after {:?}", limit),
            },
        }
    }

    async fn snapshot(&mut self) -> Result<String, SessionError> {
        self.page
            .content()
            .await
            .map_err(|e| SessionError::Protocol(e.to_string()))
    }

    async fn close(mut self) -> anyhow::Result<()> {
        if let Err(e) = self.browser.close().await {
            warn!("Browser did not close cleanly: {}", e);
        }
        let _ = self.browser.wait().await;
        self.handle.abort();
        Ok(())
    }
}
