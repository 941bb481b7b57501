// src/download/mod.rs

use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use reqwest::{header::COOKIE, Client};
use tokio::{fs, io::AsyncWriteExt, time::Instant};
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::listing::{ExportRecord, ListingClient};
use crate::session::SessionContext;

const ARCHIVE_EXT: &str = "zip";
const PART_SUFFIX: &str = "part";
const PROGRESS_STEP: u64 = 10 * 1024 * 1024;

/// What one `download_all` pass did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DownloadSummary {
    /// Records left after filtering.
    pub matched: usize,
    pub downloaded: usize,
    /// Exports still being generated (no status link yet).
    pub skipped_pending: usize,
    /// Archives already present in the export directory.
    pub skipped_existing: usize,
    pub bytes: u64,
}

/// Downloads every ready export that is not already on disk.
///
/// The export directory is the only record of what has been fetched: an
/// archive named after the record's date range means "done". Transfers run
/// one at a time in listing order.
pub struct DownloadOrchestrator {
    listing: ListingClient,
    export_dir: PathBuf,
    filter_field: String,
    date_field: String,
}

impl DownloadOrchestrator {
    pub fn new(
        listing: ListingClient,
        export_dir: impl Into<PathBuf>,
        filter_field: impl Into<String>,
        date_field: impl Into<String>,
    ) -> Self {
        Self {
            listing,
            export_dir: export_dir.into(),
            filter_field: filter_field.into(),
            date_field: date_field.into(),
        }
    }

    pub fn from_config(listing: ListingClient, config: &Config) -> Self {
        Self::new(
            listing,
            config.export_dir.clone(),
            config.filter_field.clone(),
            config.date_field.clone(),
        )
    }

    pub fn export_dir(&self) -> &Path {
        &self.export_dir
    }

    /// Fetch the listing and download what is ready, optionally keeping only
    /// records whose filter field contains `filter`.
    ///
    /// The first failed transfer aborts the pass; archives fetched before it
    /// stay on disk.
    #[instrument(level = "info", skip(self), fields(dir = %self.export_dir.display()))]
    pub async fn download_all(&self, filter: Option<&str>) -> Result<DownloadSummary> {
        fs::create_dir_all(&self.export_dir).await?;

        let records = self.listing.fetch_export_listing().await?;
        let candidates: Vec<&ExportRecord> = records
            .iter()
            .filter(|r| filter.map_or(true, |f| r.field_contains(&self.filter_field, f)))
            .collect();

        let mut summary = DownloadSummary {
            matched: candidates.len(),
            ..Default::default()
        };
        if candidates.is_empty() {
            info!(filter, field = %self.filter_field, "no exports found");
            return Ok(summary);
        }

        for record in candidates {
            let Some(href) = record.status_url() else {
                debug!(range = ?record.get(&self.date_field), "export not ready yet");
                summary.skipped_pending += 1;
                continue;
            };

            let label = record.get(&self.date_field).ok_or_else(|| {
                Error::Parse(format!("export record has no `{}` column", self.date_field))
            })?;
            let dest = self.export_dir.join(archive_file_name(label));

            if fs::try_exists(&dest).await? {
                info!(file = %dest.display(), "already downloaded");
                summary.skipped_existing += 1;
                continue;
            }

            let url = self.resolve(href)?;
            info!(range = label, file = %dest.display(), "⬇️ downloading");
            let start = Instant::now();
            let bytes =
                download_archive(self.listing.client(), self.listing.session(), &url, &dest)
                    .await?;
            info!(file = %dest.display(), bytes, elapsed = ?start.elapsed(), "downloaded");

            summary.downloaded += 1;
            summary.bytes += bytes;
        }

        info!(
            downloaded = summary.downloaded,
            pending = summary.skipped_pending,
            existing = summary.skipped_existing,
            "all done"
        );
        Ok(summary)
    }

    /// Status links may be relative to the listing page.
    fn resolve(&self, href: &str) -> Result<Url> {
        self.listing
            .listing_url()
            .join(href)
            .map_err(|e| Error::Parse(format!("bad status link `{}`: {}", href, e)))
    }
}

/// `<date range>.zip`, with characters that are unsafe in file names replaced.
pub fn archive_file_name(label: &str) -> String {
    let safe: String = label
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    format!("{}.{}", safe, ARCHIVE_EXT)
}

/// Stream `url` into `dest` through a `.part` file, returning the byte count.
///
/// `dest` only appears once the whole body has been written, so an
/// interrupted transfer is retried on the next run.
pub async fn download_archive(
    client: &Client,
    session: &SessionContext,
    url: &Url,
    dest: &Path,
) -> Result<u64> {
    let part = part_path(dest);

    let resp = client
        .get(url.clone())
        .header(COOKIE, session.cookie_header())
        .send()
        .await?;
    let status = resp.status();
    if !status.is_success() {
        return Err(Error::Status {
            url: url.to_string(),
            status,
        });
    }

    let written = async {
        let mut file = fs::File::create(&part).await?;
        let mut stream = resp.bytes_stream();
        let mut total = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            let before = total;
            total += chunk.len() as u64;
            if before / PROGRESS_STEP != total / PROGRESS_STEP {
                debug!(mb = total / (1024 * 1024), "download progress");
            }
        }
        file.flush().await?;
        Ok::<_, Error>(total)
    }
    .await;

    match written {
        Ok(total) => {
            fs::rename(&part, dest).await?;
            Ok(total)
        }
        Err(e) => {
            if let Err(rm) = fs::remove_file(&part).await {
                warn!(file = %part.display(), error = %rm, "could not remove partial download");
            }
            Err(e)
        }
    }
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(PART_SUFFIX);
    dest.with_file_name(name)
}
