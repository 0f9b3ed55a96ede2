//! Archive selection and secure extraction for downloaded 10-K tars.
//!
//! Archives are chosen by the latest 10-K filing date recoverable from
//! member filenames; modification times are never consulted when filenames
//! carry dates. Extraction guards every member against tar-slip escapes.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::{Datelike, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use company_graph_core::error::{AppError, AppResult};
use company_graph_core::security::is_safe_member_name;

/// Member-name fragments that mark exhibits, tables of contents, cover
/// pages, and graphics rather than the primary document.
const SKIP_MEMBER_PATTERNS: &[&str] = &["xexx", "exhibit", "toc", "cover", "graphic", "img"];

static PREFIX_DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)[a-z]+-(\d{8})\.(?:htm|html)").unwrap());
static CIK_FULL_DATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d{10}(\d{8})").unwrap());
static CIK_SHORT_YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d{10}(\d{2})\d{6}").unwrap());
static ISO_DATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d{4})-(\d{2})-(\d{2})").unwrap());

fn max_plausible_year() -> i32 {
    Utc::now().year() + 1
}

/// Extract a filing date from an HTML member path inside an archive.
///
/// Rules, first match wins:
/// 1. `prefix-YYYYMMDD.htm[l]` (main documents: `aapl-20230930.htm`)
/// 2. `{10-digit CIK}{YYYYMMDD}...` accession paths with a full date
/// 3. `{10-digit CIK}{YY}{6-digit seq}...` accession paths, year only
/// 4. `YYYY-MM-DD` anywhere in the path
pub fn filing_date_from_member_name(name: &str) -> Option<NaiveDate> {
    if let Some(captures) = PREFIX_DATE_RE.captures(name) {
        if let Ok(date) = NaiveDate::parse_from_str(&captures[1], "%Y%m%d") {
            return Some(date);
        }
    }

    // Full-date accession form has to win over the short-year form since
    // both match eighteen digits.
    if let Some(captures) = CIK_FULL_DATE_RE.captures(name) {
        if let Ok(date) = NaiveDate::parse_from_str(&captures[1], "%Y%m%d") {
            if (1990..=max_plausible_year()).contains(&date.year()) {
                return Some(date);
            }
        }
    }

    if let Some(captures) = CIK_SHORT_YEAR_RE.captures(name) {
        let year = 2000 + captures[1].parse::<i32>().ok()?;
        if (2000..=max_plausible_year()).contains(&year) {
            // Only the year is recoverable; Jan 1 is the best approximation.
            return NaiveDate::from_ymd_opt(year, 1, 1);
        }
    }

    if let Some(captures) = ISO_DATE_RE.captures(name) {
        let (y, m, d) = (
            captures[1].parse().ok()?,
            captures[2].parse().ok()?,
            captures[3].parse().ok()?,
        );
        if let Some(date) = NaiveDate::from_ymd_opt(y, m, d) {
            return Some(date);
        }
    }

    None
}

fn is_html_member(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.ends_with(".htm") || lower.ends_with(".html")
}

fn is_skip_member(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    SKIP_MEMBER_PATTERNS.iter().any(|pat| lower.contains(pat))
}

/// (member name, size) for every entry in the archive.
fn list_members(archive_path: &Path) -> AppResult<Vec<(String, u64)>> {
    let file = File::open(archive_path)?;
    let mut archive = tar::Archive::new(file);
    let mut members = Vec::new();
    for entry in archive.entries()? {
        let entry = entry?;
        let name = String::from_utf8_lossy(&entry.path_bytes()).to_string();
        members.push((name, entry.size()));
    }
    Ok(members)
}

/// An archive with no HTML members is a dead batch artifact.
pub fn archive_is_empty(archive_path: &Path) -> bool {
    match list_members(archive_path) {
        Ok(members) => !members.iter().any(|(name, _)| is_html_member(name)),
        // Unreadable archives count as empty so they are never selected.
        Err(_) => true,
    }
}

/// Latest 10-K filing date recoverable from the archive's member names.
pub fn latest_10k_date_in_archive(archive_path: &Path) -> Option<NaiveDate> {
    let members = list_members(archive_path).ok()?;
    members
        .iter()
        .filter(|(name, _)| is_html_member(name) && !is_skip_member(name))
        .filter_map(|(name, _)| filing_date_from_member_name(name))
        .max()
}

/// Pick the archive holding the most recent 10-K.
///
/// Empty archives are filtered out first. Archives whose member names
/// yield no date sort after every dated archive but remain eligible as a
/// last resort.
pub fn select_archive(archives: &[PathBuf]) -> Option<PathBuf> {
    let non_empty: Vec<&PathBuf> = archives
        .iter()
        .filter(|path| {
            let empty = archive_is_empty(path);
            if empty {
                debug!(archive = %path.display(), "skipping empty archive");
            }
            !empty
        })
        .collect();

    if non_empty.is_empty() {
        if !archives.is_empty() {
            warn!(count = archives.len(), "all candidate archives are empty");
        }
        return None;
    }
    if non_empty.len() == 1 {
        return Some(non_empty[0].clone());
    }

    non_empty
        .into_iter()
        .map(|path| (path.clone(), latest_10k_date_in_archive(path)))
        .max_by_key(|(_, date)| *date)
        .map(|(path, _)| path)
}

/// Year used for the extracted filename, from member dates first and the
/// `{CIK}{YY}{seq}.tar` archive name as fallback.
fn filing_year_for_archive(archive_path: &Path) -> Option<i32> {
    if let Some(date) = latest_10k_date_in_archive(archive_path) {
        return Some(date.year());
    }
    let stem = archive_path.file_stem()?.to_str()?;
    if stem.len() >= 12 && stem.chars().take(12).all(|c| c.is_ascii_digit()) {
        let year = 2000 + stem[10..12].parse::<i32>().ok()?;
        if (2000..=max_plausible_year()).contains(&year) {
            return Some(year);
        }
    }
    None
}

/// Outcome of extracting the primary document from one archive.
#[derive(Debug)]
pub struct ExtractedFiling {
    pub path: PathBuf,
    pub filing_year: Option<i32>,
}

/// Extract the main 10-K HTML member into `{filings_dir}/{cik}/10k_{year}.html`.
///
/// Member selection: HTML members, exhibits and friends skipped, largest
/// first (the primary document dominates exhibits by size). Every member
/// name is checked for traversal before a byte is written; offending
/// members are skipped with a warning and never extracted.
pub fn extract_primary_document(
    archive_path: &Path,
    filings_dir: &Path,
    cik: &str,
) -> AppResult<Option<ExtractedFiling>> {
    let mut candidates: Vec<(String, u64)> = list_members(archive_path)?
        .into_iter()
        .filter(|(name, _)| is_html_member(name))
        .collect();
    if candidates.is_empty() {
        return Err(AppError::ArchiveError(format!(
            "no HTML members in {}",
            archive_path.display()
        )));
    }
    // Largest first; non-exhibit members outrank exhibits, and unsafe
    // member names are skipped rather than aborting the whole archive.
    candidates.sort_by(|a, b| {
        is_skip_member(&a.0)
            .cmp(&is_skip_member(&b.0))
            .then_with(|| b.1.cmp(&a.1))
    });

    let mut selected = None;
    for (name, _) in &candidates {
        if !is_safe_member_name(name) {
            warn!(member = %name, archive = %archive_path.display(),
                "skipping suspicious archive member");
            continue;
        }
        if let Some(content) = read_member(archive_path, name)? {
            selected = Some((name.clone(), content));
            break;
        }
    }
    let Some((selected, content)) = selected else {
        return Ok(None);
    };

    let company_dir = filings_dir.join(cik);
    std::fs::create_dir_all(&company_dir)?;

    let filing_year = filing_year_for_archive(archive_path);
    let file_name = match filing_year {
        Some(year) => format!("10k_{year}.html"),
        None => {
            // Last resort: the member's own file name, path stripped.
            warn!(archive = %archive_path.display(), "could not determine filing year");
            Path::new(&selected)
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "10k_unknown.html".to_string())
        }
    };

    let target = company_dir.join(&file_name);
    if !company_graph_core::security::path_within_base(Path::new(&file_name), &company_dir) {
        warn!(member = %selected, "extraction target escapes company directory");
        return Ok(None);
    }

    std::fs::write(&target, content)?;
    debug!(cik, target = %target.display(), "extracted primary 10-K document");

    Ok(Some(ExtractedFiling {
        path: target,
        filing_year,
    }))
}

/// Read one member's bytes. Data-only semantics: regular file contents are
/// copied out; links, devices, and anything else never touch the
/// filesystem.
fn read_member(archive_path: &Path, member_name: &str) -> AppResult<Option<Vec<u8>>> {
    let file = File::open(archive_path)?;
    let mut archive = tar::Archive::new(file);
    for entry in archive.entries()? {
        let mut entry = entry?;
        let name = String::from_utf8_lossy(&entry.path_bytes()).to_string();
        if name != member_name {
            continue;
        }
        if entry.header().entry_type() != tar::EntryType::Regular {
            warn!(member = %member_name, "archive member is not a regular file");
            return Ok(None);
        }
        let mut content = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut content)?;
        return Ok(Some(content));
    }
    Ok(None)
}

/// Delete every other archive for the CIK, keeping the selected one
/// (re-downloading is expensive). Returns the number removed.
pub fn cleanup_other_archives(portfolio_dir: &Path, keep: &Path) -> AppResult<usize> {
    let mut removed = 0;
    for entry in std::fs::read_dir(portfolio_dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "tar") && path != keep {
            std::fs::remove_file(&path)?;
            removed += 1;
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_archive(path: &Path, members: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut builder = tar::Builder::new(file);
        for (name, content) in members {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            {
                // Raw path bytes, bypassing `set_path`/`append_data`'s `..`
                // rejection so traversal members can be constructed for the
                // test below.
                let gnu = header.as_gnu_mut().unwrap();
                let name_bytes = name.as_bytes();
                gnu.name[..name_bytes.len()].copy_from_slice(name_bytes);
            }
            header.set_cksum();
            builder.append(&header, *content).unwrap();
        }
        builder.finish().unwrap();
    }

    #[test]
    fn prefix_date_rule_wins_first() {
        assert_eq!(
            filing_date_from_member_name("a-20241231.htm"),
            NaiveDate::from_ymd_opt(2024, 12, 31)
        );
        assert_eq!(
            filing_date_from_member_name("etr-20221231.html"),
            NaiveDate::from_ymd_opt(2022, 12, 31)
        );
    }

    #[test]
    fn accession_full_date_rule() {
        assert_eq!(
            filing_date_from_member_name("000010908720231231/10k.htm"),
            NaiveDate::from_ymd_opt(2023, 12, 31)
        );
    }

    #[test]
    fn accession_short_year_rule_gives_jan_first() {
        assert_eq!(
            filing_date_from_member_name("000114036114016669/form10k.htm"),
            NaiveDate::from_ymd_opt(2014, 1, 1)
        );
    }

    #[test]
    fn iso_date_rule_applies_anywhere() {
        assert_eq!(
            filing_date_from_member_name("filings/2019-06-30/main.htm"),
            NaiveDate::from_ymd_opt(2019, 6, 30)
        );
    }

    #[test]
    fn garbage_names_have_no_date() {
        assert_eq!(filing_date_from_member_name("index.htm"), None);
        assert_eq!(filing_date_from_member_name("graphic.jpg"), None);
    }

    #[test]
    fn empty_archives_are_detected_and_never_selected() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("empty.tar");
        build_archive(&empty, &[("readme.txt", b"nothing here")]);
        assert!(archive_is_empty(&empty));
        assert_eq!(select_archive(&[empty]), None);
    }

    #[test]
    fn selects_archive_with_latest_filing_date() {
        let dir = tempfile::tempdir().unwrap();
        let newer = dir.path().join("000032019324000049.tar");
        let older = dir.path().join("000032019322000010.tar");
        build_archive(&newer, &[("a-20241231.htm", b"<html>2024 filing</html>")]);
        build_archive(&older, &[("a-20221231.htm", b"<html>2022 filing</html>")]);

        let selected = select_archive(&[older.clone(), newer.clone()]).unwrap();
        assert_eq!(selected, newer);
    }

    #[test]
    fn extraction_picks_largest_non_exhibit_and_names_by_year() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("000032019324000049.tar");
        let big = "x".repeat(4096);
        build_archive(
            &archive,
            &[
                ("a-20241231xexx101.htm", b"exhibit body that is fairly long"),
                ("a-20241231.htm", big.as_bytes()),
                ("cover.htm", b"cover"),
            ],
        );

        let filings_dir = dir.path().join("filings");
        let extracted = extract_primary_document(&archive, &filings_dir, "0000320193")
            .unwrap()
            .unwrap();
        assert_eq!(extracted.filing_year, Some(2024));
        assert!(extracted.path.ends_with("0000320193/10k_2024.html"));
        let written = std::fs::read_to_string(&extracted.path).unwrap();
        assert_eq!(written.len(), 4096);
    }

    #[test]
    fn traversal_members_are_skipped_and_nothing_escapes() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("evil.tar");
        build_archive(&archive, &[("../../etc/passwd.html", b"<html>pwned</html>")]);

        let filings_dir = dir.path().join("filings");
        let result = extract_primary_document(&archive, &filings_dir, "0000000001").unwrap();
        assert!(result.is_none());
        assert!(!dir.path().join("etc").exists());
        assert!(!filings_dir.join("0000000001").join("passwd.html").exists());
    }

    #[test]
    fn cleanup_keeps_only_the_selected_archive() {
        let dir = tempfile::tempdir().unwrap();
        let keep = dir.path().join("keep.tar");
        let drop1 = dir.path().join("old1.tar");
        let drop2 = dir.path().join("old2.tar");
        build_archive(&keep, &[("a-20241231.htm", b"x")]);
        build_archive(&drop1, &[("a-20221231.htm", b"x")]);
        build_archive(&drop2, &[("a-20201231.htm", b"x")]);

        let removed = cleanup_other_archives(dir.path(), &keep).unwrap();
        assert_eq!(removed, 2);
        assert!(keep.exists());
        assert!(!drop1.exists());
        assert!(!drop2.exists());
    }

    #[test]
    fn archive_year_falls_back_to_archive_name() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("000032019324000049.tar");
        // Member names carry no recoverable date.
        build_archive(&archive, &[("main.htm", b"<html>no dates</html>")]);
        assert_eq!(filing_year_for_archive(&archive), Some(2024));
    }
}
