use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::CookieParam;
use chromiumoxide::error::CdpError;
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::{sync::Mutex, task::JoinHandle, time::Instant};
use tracing::{debug, info, warn};

use super::BrowserSession;
use crate::error::{Error, Result};
use crate::session::SessionCookie;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A single Chromium tab driven over the DevTools protocol.
pub struct ChromeSession {
    browser: Mutex<Browser>,
    handler: JoinHandle<()>,
    page: Page,
    wait_timeout: Duration,
}

fn cdp(err: CdpError) -> Error {
    Error::Automation(err.to_string())
}

impl ChromeSession {
    /// Start Chromium and open a blank tab.
    pub async fn launch(headless: bool, wait_timeout: Duration) -> Result<Self> {
        let mut builder = BrowserConfig::builder();
        if !headless {
            builder = builder.with_head();
        }
        let config = builder.build().map_err(Error::Automation)?;

        let (browser, mut events) = Browser::launch(config).await.map_err(cdp)?;
        let handler = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "browser event loop stopped");
                    break;
                }
            }
        });

        let page = browser.new_page("about:blank").await.map_err(cdp)?;
        info!(headless, "launched browser");

        Ok(Self {
            browser: Mutex::new(browser),
            handler,
            page,
            wait_timeout,
        })
    }

    pub async fn close(self) -> Result<()> {
        let mut browser = self.browser.into_inner();
        browser.close().await.map_err(cdp)?;
        reap_event_loop(self.handler).await;
        debug!("browser closed");
        Ok(())
    }
}

/// Wait for the event-loop task; a panic or cancellation there is logged,
/// not propagated. Returns whether the task finished cleanly.
async fn reap_event_loop(handler: JoinHandle<()>) -> bool {
    match handler.await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "browser event loop task failed");
            false
        }
    }
}

#[async_trait]
impl BrowserSession for ChromeSession {
    async fn set_cookie(&self, cookie: &SessionCookie) -> Result<()> {
        let param = CookieParam::builder()
            .name(cookie.name.clone())
            .value(cookie.value.clone())
            .domain(cookie.domain.clone())
            .build()
            .map_err(Error::Automation)?;
        self.page.set_cookie(param).await.map_err(cdp)?;
        Ok(())
    }

    async fn goto(&self, url: &str) -> Result<()> {
        self.page.goto(url).await.map_err(cdp)?;
        Ok(())
    }

    async fn wait_for_selector(&self, selector: &str) -> Result<()> {
        let deadline = Instant::now() + self.wait_timeout;
        loop {
            if self.page.find_element(selector).await.is_ok() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(Error::Automation(format!(
                    "`{}` did not appear within {:?}",
                    selector, self.wait_timeout
                )));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn click(&self, selector: &str) -> Result<()> {
        let element = self.page.find_element(selector).await.map_err(cdp)?;
        element.click().await.map_err(cdp)?;
        Ok(())
    }

    async fn wait_for_navigation(&self) -> Result<()> {
        tokio::time::timeout(self.wait_timeout, self.page.wait_for_navigation())
            .await
            .map_err(|_| {
                Error::Automation(format!("no navigation within {:?}", self.wait_timeout))
            })?
            .map_err(cdp)?;
        Ok(())
    }
}
