// src/trigger/mod.rs

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::session::{SessionContext, SessionCookie};

pub mod chrome;
pub mod range;

pub use chrome::ChromeSession;
pub use range::DateRange;

pub const DATE_PRESET_SELECTOR: &str = r#"[data-qa="service_export_date_preset"]"#;
pub const SUBMIT_SELECTOR: &str = r#"[data-qa="service_export_submit"]"#;

/// Selector for the n-th entry of the date preset dropdown.
pub fn preset_option_selector(index: usize) -> String {
    format!(r#"[data-qa="service_export_date_preset_option_{}"]"#, index)
}

/// The browser operations the export wizard needs.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    async fn set_cookie(&self, cookie: &SessionCookie) -> Result<()>;

    async fn goto(&self, url: &str) -> Result<()>;

    /// Block until an element matching `selector` is in the page.
    async fn wait_for_selector(&self, selector: &str) -> Result<()>;

    async fn click(&self, selector: &str) -> Result<()>;

    async fn wait_for_navigation(&self) -> Result<()>;
}

/// Where the wizard currently stands. Steps only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerState {
    Idle,
    Authenticated,
    Navigated,
    DropdownOpen,
    RangeSelected,
    Submitted,
    Confirmed,
}

/// Requests a new export by clicking through the export page.
///
/// Each transition is its own method so the sequence can be stepped (and
/// tested) one state at a time; [`ExportTrigger::run`] does all of them.
/// A failed step leaves the trigger in the state it failed from; there is
/// no retry.
pub struct ExportTrigger<'a, B: BrowserSession> {
    browser: &'a B,
    session: &'a SessionContext,
    page_url: Url,
    range: DateRange,
    state: TriggerState,
}

impl<'a, B: BrowserSession> ExportTrigger<'a, B> {
    pub fn new(browser: &'a B, session: &'a SessionContext, page_url: Url, range: DateRange) -> Self {
        Self {
            browser,
            session,
            page_url,
            range,
            state: TriggerState::Idle,
        }
    }

    pub fn state(&self) -> TriggerState {
        self.state
    }

    pub fn range(&self) -> DateRange {
        self.range
    }

    /// Idle → Authenticated: put every session cookie into the browser.
    pub async fn authenticate(&mut self) -> Result<()> {
        self.expect(TriggerState::Idle, "authenticate")?;
        let (browser, session) = (self.browser, self.session);
        for cookie in session.cookies() {
            browser
                .set_cookie(cookie)
                .await
                .map_err(|e| self.fail(&format!("cookie `{}` rejected", cookie.name), e))?;
        }
        info!(cookies = session.cookies().len(), "🔑 session cookies set");
        self.advance(TriggerState::Authenticated);
        Ok(())
    }

    /// Authenticated → Navigated: load the export page and wait for the wizard.
    pub async fn navigate(&mut self) -> Result<()> {
        self.expect(TriggerState::Authenticated, "navigate")?;
        let browser = self.browser;
        browser
            .goto(self.page_url.as_str())
            .await
            .map_err(|e| self.fail("loading export page", e))?;
        browser
            .wait_for_selector(DATE_PRESET_SELECTOR)
            .await
            .map_err(|e| self.fail("waiting for date preset", e))?;
        info!(url = %self.page_url, "🚀 on the export page");
        self.advance(TriggerState::Navigated);
        Ok(())
    }

    /// Navigated → DropdownOpen.
    pub async fn open_dropdown(&mut self) -> Result<()> {
        self.expect(TriggerState::Navigated, "open dropdown")?;
        self.browser
            .click(DATE_PRESET_SELECTOR)
            .await
            .map_err(|e| self.fail("opening date preset dropdown", e))?;
        info!("🔍 opened date preset dropdown");
        self.advance(TriggerState::DropdownOpen);
        Ok(())
    }

    /// DropdownOpen → RangeSelected: pick the option for the requested range.
    pub async fn select_range(&mut self) -> Result<()> {
        self.expect(TriggerState::DropdownOpen, "select range")?;
        let browser = self.browser;
        let option = preset_option_selector(self.range.option_index());
        browser
            .wait_for_selector(&option)
            .await
            .map_err(|e| self.fail("waiting for range option", e))?;
        browser
            .click(&option)
            .await
            .map_err(|e| self.fail("choosing range option", e))?;
        info!(range = %self.range, "📅 selected date range");
        self.advance(TriggerState::RangeSelected);
        Ok(())
    }

    /// RangeSelected → Submitted.
    pub async fn submit(&mut self) -> Result<()> {
        self.expect(TriggerState::RangeSelected, "submit")?;
        let browser = self.browser;
        browser
            .wait_for_selector(SUBMIT_SELECTOR)
            .await
            .map_err(|e| self.fail("waiting for submit button", e))?;
        browser
            .click(SUBMIT_SELECTOR)
            .await
            .map_err(|e| self.fail("clicking submit", e))?;
        info!("📨 submitted export request");
        self.advance(TriggerState::Submitted);
        Ok(())
    }

    /// Submitted → Confirmed: the page reloads and the wizard shows up again.
    pub async fn confirm(&mut self) -> Result<()> {
        self.expect(TriggerState::Submitted, "confirm")?;
        let browser = self.browser;
        tokio::try_join!(
            browser.wait_for_navigation(),
            browser.wait_for_selector(DATE_PRESET_SELECTOR)
        )
        .map_err(|e| self.fail("waiting for export page to reload", e))?;
        info!("🎉 export started");
        self.advance(TriggerState::Confirmed);
        Ok(())
    }

    /// Drive every step from the current state through to `Confirmed`.
    pub async fn run(&mut self) -> Result<()> {
        self.authenticate().await?;
        self.navigate().await?;
        self.open_dropdown().await?;
        self.select_range().await?;
        self.submit().await?;
        self.confirm().await
    }

    fn expect(&self, want: TriggerState, step: &str) -> Result<()> {
        if self.state == want {
            Ok(())
        } else {
            Err(Error::Automation(format!(
                "cannot {} from state {:?}; expected {:?}",
                step, self.state, want
            )))
        }
    }

    fn advance(&mut self, next: TriggerState) {
        debug!(from = ?self.state, to = ?next, "trigger transition");
        self.state = next;
    }

    fn fail(&self, action: &str, err: Error) -> Error {
        Error::Automation(format!("{} (from {:?}): {}", action, self.state, err))
    }
}

/// Validate `range_token`, then open a browser and request the export.
///
/// An unknown token is rejected before any browser is launched. The browser
/// is closed whether or not the wizard succeeded.
#[instrument(level = "info", skip(config, session))]
pub async fn start_export(config: &Config, session: &SessionContext, range_token: &str) -> Result<()> {
    let range: DateRange = range_token.parse()?;
    let page_url = config.export_page_url()?;

    let browser = ChromeSession::launch(config.headless, config.wait_timeout).await?;
    let outcome = ExportTrigger::new(&browser, session, page_url, range).run().await;

    if let Err(e) = browser.close().await {
        warn!(error = %e, "failed to close browser");
    }
    outcome
}
