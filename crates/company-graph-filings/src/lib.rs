//! 10-K filing acquisition and extraction.
//!
//! Acquisition moves each company through pre-check, archive download
//! (commercial provider with SEC failover), archive selection, and
//! tar-slip-guarded extraction of the primary document. Extraction then
//! runs a registry of pluggable field extractors (website, business
//! description, risk factors, filing metadata, business relationships)
//! over the extracted HTML, parsing the tree exactly once.

pub mod archive;
pub mod downloader;
pub mod extract;
pub mod lookup;

pub use archive::{filing_date_from_member_name, select_archive};
pub use downloader::{DownloadOutcome, FilingDownloader};
pub use extract::{default_extractors, run_extractors, FieldExtractor};
pub use lookup::{CompanyLookup, CompanyRef};
