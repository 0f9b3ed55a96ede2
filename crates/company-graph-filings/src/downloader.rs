//! 10-K archive acquisition with provider failover.
//!
//! The free pre-check confirms a 10-K exists in the requested date range
//! before any paid call. Downloads go through the commercial archive
//! provider when its key is configured, else directly against SEC EDGAR at
//! the long-duration rate limit, packing each accession's documents into a
//! `{CIK}{YY}{seq}.tar` archive. "No 10-K in range" is cached as a
//! negative result; only transient network failures are retried.

use std::path::{Path, PathBuf};
use std::time::Duration;

use backoff::backoff::Backoff;
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::{debug, info, warn};

use company_graph_core::cache::cache_get_or_none;
use company_graph_core::constants::{
    CACHE_TTL_NEGATIVE_RESULT, NS_10K_EXTRACTED, SEC_EDGAR_LONG_DURATION_LIMIT,
};
use company_graph_core::error::{AppError, AppResult};
use company_graph_core::rate_limiter::limiter_for;
use company_graph_core::AppCache;
use company_graph_sources::sec_edgar::{self, CompanySubmissions};
use company_graph_sources::SourceContext;

use crate::archive;

/// Default commercial archive provider endpoint.
pub const PROVIDER_BASE: &str = "https://api.datamule.xyz";

/// Retries for the free SEC path; the paid path gets a single retry to
/// avoid double-billing.
const FREE_PATH_RETRIES: u32 = 3;
const PAID_PATH_RETRIES: u32 = 1;

/// At most this many recent in-range 10-Ks are downloaded per company.
const MAX_ARCHIVES_PER_COMPANY: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// Primary document extracted to this path
    Extracted(PathBuf),
    /// A cached negative result said there is no 10-K in range
    CachedNoFiling,
    /// Pre-check (or download) found no 10-K in range; negative-cached now
    NoFiling,
}

#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub date_start: Option<NaiveDate>,
    pub date_end: Option<NaiveDate>,
    /// Purge this CIK's archives and re-download
    pub force: bool,
    /// Skip the free pre-check (spends provider quota on unknowns)
    pub pre_check: bool,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            date_start: None,
            date_end: None,
            force: false,
            pre_check: true,
        }
    }
}

/// Column file listing of one accession directory (`index.json`).
#[derive(Debug, Deserialize)]
struct AccessionIndex {
    directory: AccessionDirectory,
}

#[derive(Debug, Deserialize)]
struct AccessionDirectory {
    #[serde(default)]
    item: Vec<AccessionItem>,
}

#[derive(Debug, Deserialize)]
struct AccessionItem {
    #[serde(default)]
    name: String,
}

/// Downloads and extracts 10-K archives for one CIK at a time.
pub struct FilingDownloader<'a> {
    ctx: &'a SourceContext,
    cache: &'a AppCache,
    provider_api_key: Option<String>,
    provider_base: String,
    sec_data_base: String,
    sec_archive_base: String,
    portfolios_dir: PathBuf,
    filings_dir: PathBuf,
}

impl<'a> FilingDownloader<'a> {
    pub fn new(
        ctx: &'a SourceContext,
        cache: &'a AppCache,
        provider_api_key: Option<String>,
        portfolios_dir: &Path,
        filings_dir: &Path,
    ) -> Self {
        Self {
            ctx,
            cache,
            provider_api_key,
            provider_base: PROVIDER_BASE.to_string(),
            sec_data_base: sec_edgar::SEC_DATA_BASE.to_string(),
            sec_archive_base: sec_edgar::SEC_WWW_BASE.to_string(),
            portfolios_dir: portfolios_dir.to_path_buf(),
            filings_dir: filings_dir.to_path_buf(),
        }
    }

    /// Point every endpoint at a test server.
    pub fn with_bases(mut self, provider: &str, sec_data: &str, sec_archive: &str) -> Self {
        self.provider_base = provider.to_string();
        self.sec_data_base = sec_data.to_string();
        self.sec_archive_base = sec_archive.to_string();
        self
    }

    fn negative_cache_key(cik: &str) -> String {
        format!("{cik}:no_10k")
    }

    fn portfolio_dir(&self, cik: &str) -> PathBuf {
        self.portfolios_dir.join(format!("10k_{cik}"))
    }

    /// Free pre-check: does this CIK have at least one 10-K in range?
    pub async fn has_10k_in_range(&self, cik: &str, options: &DownloadOptions) -> AppResult<bool> {
        let submissions =
            sec_edgar::fetch_submissions(self.ctx, &self.sec_data_base, cik).await?;
        Ok(!self.filings_in_range(&submissions, options).is_empty())
    }

    fn filings_in_range(
        &self,
        submissions: &CompanySubmissions,
        options: &DownloadOptions,
    ) -> Vec<(String, NaiveDate)> {
        let mut filings: Vec<(String, NaiveDate)> = submissions
            .filings
            .recent
            .rows()
            .filter(|(_, _, form, _)| *form == "10-K")
            .filter_map(|(accession, date, _, _)| {
                NaiveDate::parse_from_str(date, "%Y-%m-%d")
                    .ok()
                    .map(|date| (accession.to_string(), date))
            })
            .filter(|(_, date)| {
                options.date_start.is_none_or(|start| *date >= start)
                    && options.date_end.is_none_or(|end| *date <= end)
            })
            .collect();
        filings.sort_by_key(|(_, date)| std::cmp::Reverse(*date));
        filings.truncate(MAX_ARCHIVES_PER_COMPANY);
        filings
    }

    /// Full pipeline for one company: pre-check, download, select, extract,
    /// clean up.
    pub async fn download_and_extract(
        &self,
        cik: &str,
        options: &DownloadOptions,
    ) -> AppResult<DownloadOutcome> {
        if options.force {
            // Touch only this CIK's archives, never anyone else's.
            let dir = self.portfolio_dir(cik);
            if dir.exists() {
                std::fs::remove_dir_all(&dir)?;
                info!(cik, "purged archives for forced re-download");
            }
            self.cache.delete(NS_10K_EXTRACTED, &Self::negative_cache_key(cik))?;
        } else if cache_get_or_none::<bool>(
            self.cache,
            NS_10K_EXTRACTED,
            &Self::negative_cache_key(cik),
        )
        .is_some()
        {
            debug!(cik, "negative cache hit: no 10-K in range");
            return Ok(DownloadOutcome::CachedNoFiling);
        }

        let submissions =
            match sec_edgar::fetch_submissions(self.ctx, &self.sec_data_base, cik).await {
                Ok(submissions) => submissions,
                Err(AppError::NotFound(_)) => {
                    self.cache_negative(cik)?;
                    return Ok(DownloadOutcome::NoFiling);
                }
                Err(e) => return Err(e),
            };

        let filings = self.filings_in_range(&submissions, options);
        if options.pre_check && filings.is_empty() {
            self.cache_negative(cik)?;
            return Ok(DownloadOutcome::NoFiling);
        }

        let portfolio_dir = self.portfolio_dir(cik);
        std::fs::create_dir_all(&portfolio_dir)?;

        let mut downloaded = 0usize;
        for (accession, date) in &filings {
            match self.download_archive(cik, accession, *date).await {
                Ok(true) => downloaded += 1,
                Ok(false) => {}
                Err(e) => warn!(cik, accession, error = %e, "archive download failed"),
            }
        }

        let archives: Vec<PathBuf> = std::fs::read_dir(&portfolio_dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "tar"))
            .collect();

        if archives.is_empty() {
            if downloaded == 0 {
                self.cache_negative(cik)?;
            }
            return Ok(DownloadOutcome::NoFiling);
        }

        let Some(selected) = archive::select_archive(&archives) else {
            self.cache_negative(cik)?;
            return Ok(DownloadOutcome::NoFiling);
        };

        let extracted =
            archive::extract_primary_document(&selected, &self.filings_dir, cik)?;
        archive::cleanup_other_archives(&portfolio_dir, &selected)?;

        match extracted {
            Some(extracted) => Ok(DownloadOutcome::Extracted(extracted.path)),
            None => Ok(DownloadOutcome::NoFiling),
        }
    }

    fn cache_negative(&self, cik: &str) -> AppResult<()> {
        self.cache.set(
            NS_10K_EXTRACTED,
            &Self::negative_cache_key(cik),
            &true,
            Some(CACHE_TTL_NEGATIVE_RESULT),
        )
    }

    /// Download one accession's archive. Returns false when the archive
    /// already exists on disk.
    async fn download_archive(
        &self,
        cik: &str,
        accession: &str,
        date: NaiveDate,
    ) -> AppResult<bool> {
        let accession_nodash: String = accession.chars().filter(|c| *c != '-').collect();
        let tar_path = self.portfolio_dir(cik).join(format!("{accession_nodash}.tar"));
        if tar_path.exists() {
            debug!(cik, accession, "archive already on disk");
            return Ok(false);
        }

        if self.provider_api_key.is_some() {
            self.download_from_provider(cik, &accession_nodash, date, &tar_path)
                .await?;
        } else {
            self.download_from_sec(cik, &accession_nodash, &tar_path).await?;
        }
        Ok(true)
    }

    /// Commercial provider: one authenticated request streams the packed
    /// archive. Single retry; every call is billed.
    async fn download_from_provider(
        &self,
        cik: &str,
        accession_nodash: &str,
        date: NaiveDate,
        tar_path: &Path,
    ) -> AppResult<()> {
        let api_key = self.provider_api_key.as_deref().unwrap_or_default();
        let url = format!(
            "{}/submissions/{cik}/{accession_nodash}.tar?date={date}&api_key={api_key}",
            self.provider_base
        );

        let bytes = with_retries(PAID_PATH_RETRIES, || async {
            let response = self.ctx.http.get(&url).send().await?;
            if response.status() == reqwest::StatusCode::NOT_FOUND {
                return Err(AppError::NotFound(format!(
                    "provider has no archive for {accession_nodash}"
                )));
            }
            if !response.status().is_success() {
                return Err(AppError::ExternalApiError(format!(
                    "provider returned {}",
                    response.status()
                )));
            }
            Ok(response.bytes().await?)
        })
        .await?;

        std::fs::write(tar_path, &bytes)?;
        debug!(cik, archive = %tar_path.display(), "downloaded archive from provider");
        Ok(())
    }

    /// SEC fallback: fetch the accession's document list, pull the HTML
    /// documents at the long-duration rate limit, and pack them into the
    /// same archive layout the provider produces.
    async fn download_from_sec(
        &self,
        cik: &str,
        accession_nodash: &str,
        tar_path: &Path,
    ) -> AppResult<()> {
        let limiter = limiter_for("sec_edgar_long", SEC_EDGAR_LONG_DURATION_LIMIT)?;
        let cik_trimmed = cik.trim_start_matches('0');
        let dir_url = format!(
            "{}/Archives/edgar/data/{cik_trimmed}/{accession_nodash}",
            self.sec_archive_base
        );

        limiter.acquire().await;
        let index: AccessionIndex = with_retries(FREE_PATH_RETRIES, || async {
            let response = self
                .ctx
                .http
                .get(format!("{dir_url}/index.json"))
                .header(reqwest::header::USER_AGENT, &self.ctx.sec_user_agent)
                .send()
                .await?;
            if response.status() == reqwest::StatusCode::NOT_FOUND {
                return Err(AppError::NotFound(format!(
                    "no index for accession {accession_nodash}"
                )));
            }
            if !response.status().is_success() {
                return Err(AppError::ExternalApiError(format!(
                    "SEC index returned {}",
                    response.status()
                )));
            }
            Ok(response.json().await?)
        })
        .await?;

        let html_docs: Vec<String> = index
            .directory
            .item
            .into_iter()
            .map(|item| item.name)
            .filter(|name| {
                let lower = name.to_ascii_lowercase();
                lower.ends_with(".htm") || lower.ends_with(".html")
            })
            .collect();

        if html_docs.is_empty() {
            return Err(AppError::NotFound(format!(
                "accession {accession_nodash} has no HTML documents"
            )));
        }

        let file = std::fs::File::create(tar_path)?;
        let mut builder = tar::Builder::new(file);
        for doc in &html_docs {
            limiter.acquire().await;
            let bytes = with_retries(FREE_PATH_RETRIES, || async {
                let response = self
                    .ctx
                    .http
                    .get(format!("{dir_url}/{doc}"))
                    .header(reqwest::header::USER_AGENT, &self.ctx.sec_user_agent)
                    .send()
                    .await?;
                if !response.status().is_success() {
                    return Err(AppError::ExternalApiError(format!(
                        "SEC document fetch returned {}",
                        response.status()
                    )));
                }
                Ok(response.bytes().await?)
            })
            .await?;

            let mut header = tar::Header::new_gnu();
            header.set_size(bytes.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(
                &mut header,
                format!("{accession_nodash}/{doc}"),
                bytes.as_ref(),
            )?;
        }
        builder.finish()?;
        debug!(cik, archive = %tar_path.display(), docs = html_docs.len(),
            "packed SEC documents into archive");
        Ok(())
    }
}

/// Retry transient failures with exponential backoff, bounded by
/// `max_retries`. Non-transient errors surface immediately.
async fn with_retries<T, Fut, F>(max_retries: u32, mut operation: F) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = AppResult<T>>,
{
    let mut policy = backoff::ExponentialBackoff {
        initial_interval: Duration::from_millis(250),
        max_interval: Duration::from_secs(10),
        max_elapsed_time: None,
        ..Default::default()
    };
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < max_retries => {
                attempt += 1;
                let delay = policy.next_backoff().unwrap_or(Duration::from_secs(1));
                debug!(attempt, delay_ms = delay.as_millis() as u64, error = %e,
                    "transient failure, backing off");
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
