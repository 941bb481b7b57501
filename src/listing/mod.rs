// src/listing/mod.rs

use reqwest::{header::COOKIE, Client};
use tracing::{debug, info, instrument};
use url::Url;

use crate::config::{Config, ParserKind};
use crate::error::{Error, Result};
use crate::session::SessionContext;

pub mod parse;
pub mod record;

pub use parse::{decode_href, strip_tags, HtmlTableParser, RegexTableParser, TableParser, STATUS_HEADER};
pub use record::ExportRecord;

/// Fetches the export listing page with the session cookie and parses it.
///
/// Nothing is cached: every call scrapes the page again.
pub struct ListingClient {
    client: Client,
    listing_url: Url,
    session: SessionContext,
    parser: Box<dyn TableParser>,
}

impl ListingClient {
    pub fn new(
        client: Client,
        listing_url: Url,
        session: SessionContext,
        parser: Box<dyn TableParser>,
    ) -> Self {
        Self {
            client,
            listing_url,
            session,
            parser,
        }
    }

    pub fn from_config(client: Client, config: &Config, session: SessionContext) -> Result<Self> {
        let parser: Box<dyn TableParser> = match config.parser {
            ParserKind::Regex => Box::new(RegexTableParser),
            ParserKind::Html => Box::new(HtmlTableParser),
        };
        Ok(Self::new(client, config.listing_url()?, session, parser))
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn listing_url(&self) -> &Url {
        &self.listing_url
    }

    /// Scrape the listing page, top row first.
    #[instrument(level = "info", skip(self), fields(url = %self.listing_url, parser = self.parser.name()))]
    pub async fn fetch_export_listing(&self) -> Result<Vec<ExportRecord>> {
        let html = self.get_text(&self.listing_url).await?;
        debug!(bytes = html.len(), "fetched listing page");
        let records = self.parser.parse(&html)?;
        info!(
            count = records.len(),
            ready = records.iter().filter(|r| r.is_ready()).count(),
            "found exports"
        );
        Ok(records)
    }

    async fn get_text(&self, url: &Url) -> Result<String> {
        let resp = self
            .client
            .get(url.clone())
            .header(COOKIE, self.session.cookie_header())
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Status {
                url: url.to_string(),
                status,
            });
        }
        Ok(resp.text().await?)
    }
}
