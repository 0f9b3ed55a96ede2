//! Filing metadata scan: accession number, filing date, fiscal year end.
//!
//! Only the first ~20 KB of the document is scanned; the cover page always
//! carries these fields. Dates outside [1990, now+1] are rejected as
//! artifacts of the scan.

use chrono::{Datelike, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use company_graph_core::error::AppResult;
use company_graph_core::models::FilingMetadata;

use super::{ExtractionInput, FieldExtractor, FieldValue};

const HEAD_CHARS: usize = 20_480;

static ACCESSION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{10}-\d{2}-\d{6})\b").unwrap());

/// "Filed"/"Filing Date"/"Date of Report" followed by an ISO date.
static LABELED_ISO_DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:filed|filing\s+date|date\s+of\s+report)[^0-9]{0,60}(\d{4}-\d{2}-\d{2})")
        .unwrap()
});

/// Same labels with a US-style MM/DD/YYYY date.
static LABELED_US_DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:filed|filing\s+date|date\s+of\s+report)[^0-9]{0,60}(\d{1,2}/\d{1,2}/\d{4})")
        .unwrap()
});

static FISCAL_YEAR_END_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)fiscal\s+year\s+end(?:ed|ing)?\s*:?\s*((?:[A-Z][a-z]+\s+\d{1,2})|(?:\d{1,2}/\d{1,2})|(?:--?\d{2}-\d{2}))",
    )
    .unwrap()
});

fn year_is_plausible(date: &NaiveDate) -> bool {
    (1990..=Utc::now().year() + 1).contains(&date.year())
}

/// Scan document head for filing metadata.
pub fn scan_metadata(content: &str) -> FilingMetadata {
    let head: String = content.chars().take(HEAD_CHARS).collect();

    let accession_number = ACCESSION_RE
        .captures(&head)
        .map(|captures| captures[1].to_string());

    let filing_date = LABELED_ISO_DATE_RE
        .captures(&head)
        .and_then(|captures| NaiveDate::parse_from_str(&captures[1], "%Y-%m-%d").ok())
        .or_else(|| {
            LABELED_US_DATE_RE
                .captures(&head)
                .and_then(|captures| NaiveDate::parse_from_str(&captures[1], "%m/%d/%Y").ok())
        })
        .filter(year_is_plausible);

    let fiscal_year_end = FISCAL_YEAR_END_RE
        .captures(&head)
        .map(|captures| captures[1].trim().to_string());

    FilingMetadata {
        accession_number,
        filing_date,
        fiscal_year_end,
    }
}

/// The filing-metadata extractor.
pub struct FilingMetadataExtractor;

impl FieldExtractor for FilingMetadataExtractor {
    fn field_name(&self) -> &'static str {
        "filing_metadata"
    }

    fn extract(&self, input: &ExtractionInput<'_>) -> AppResult<Option<FieldValue>> {
        let metadata = scan_metadata(input.content);
        if metadata == FilingMetadata::default() {
            return Ok(None);
        }
        Ok(Some(FieldValue::Metadata(metadata)))
    }

    fn validate(&self, value: &FieldValue) -> bool {
        match value {
            FieldValue::Metadata(metadata) => metadata
                .filing_date
                .map_or(true, |date| year_is_plausible(&date)),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scans_accession_and_iso_date() {
        let head = "ACCESSION NUMBER: 0000320193-23-000106\n\
                    CONFORMED PERIOD OF REPORT\nFiled: 2023-11-03\n\
                    Fiscal Year Ended: September 30";
        let metadata = scan_metadata(head);
        assert_eq!(
            metadata.accession_number.as_deref(),
            Some("0000320193-23-000106")
        );
        assert_eq!(metadata.filing_date, NaiveDate::from_ymd_opt(2023, 11, 3));
        assert_eq!(metadata.fiscal_year_end.as_deref(), Some("September 30"));
    }

    #[test]
    fn scans_us_style_labeled_date() {
        let head = "Filing Date: 11/03/2023";
        let metadata = scan_metadata(head);
        assert_eq!(metadata.filing_date, NaiveDate::from_ymd_opt(2023, 11, 3));
    }

    #[test]
    fn rejects_implausible_years() {
        let metadata = scan_metadata("Filed: 1888-01-01");
        assert_eq!(metadata.filing_date, None);
        let metadata = scan_metadata("Filed: 2099-01-01");
        assert_eq!(metadata.filing_date, None);
    }

    #[test]
    fn unlabeled_dates_are_ignored() {
        // A bare date with no "Filed" style label must not be picked up.
        let metadata = scan_metadata("The meeting happened on 2023-11-03.");
        assert_eq!(metadata.filing_date, None);
    }

    #[test]
    fn only_the_head_is_scanned() {
        let mut content = "x".repeat(HEAD_CHARS + 10);
        content.push_str("Filed: 2023-11-03");
        let metadata = scan_metadata(&content);
        assert_eq!(metadata.filing_date, None);
    }
}
