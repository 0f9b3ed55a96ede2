//! Full-text extraction from stored 10-K HTML files.

use std::path::{Path, PathBuf};

use scraper::{Html, Node};
use tracing::debug;

/// Extract the full visible text of a 10-K HTML file.
///
/// Script/style content is dropped; lines are trimmed and joined. Returns
/// `None` when extraction produces almost nothing (a parse failure, not a
/// short filing).
pub fn extract_full_text(path: &Path) -> Option<String> {
    let bytes = std::fs::read(path).ok()?;
    let content = String::from_utf8_lossy(&bytes);
    let tree = Html::parse_document(&content);

    let mut lines: Vec<String> = Vec::new();
    let mut stack = vec![tree.tree.root()];
    while let Some(node) = stack.pop() {
        match node.value() {
            Node::Element(element) => {
                if matches!(element.name(), "script" | "style" | "noscript") {
                    continue;
                }
            }
            Node::Text(text) => {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    lines.push(trimmed.to_string());
                }
                continue;
            }
            _ => {}
        }
        let children: Vec<_> = node.children().collect();
        for child in children.into_iter().rev() {
            stack.push(child);
        }
    }

    let text = lines.join("\n");
    if text.len() < 100 {
        debug!(path = %path.display(), "extracted text too short, treating as failure");
        return None;
    }
    Some(text)
}

/// Find the extracted 10-K file for a CIK, newest filing year first.
pub fn find_10k_file(cik: &str, filings_dir: &Path) -> Option<PathBuf> {
    let company_dir = filings_dir.join(cik);
    let mut candidates: Vec<PathBuf> = std::fs::read_dir(&company_dir)
        .ok()?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "html"))
        .collect();
    // Names are `10k_{year}.html`; lexicographic order is year order.
    candidates.sort();
    candidates.pop()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_text_without_markup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("10k_2024.html");
        let body = "Annual report narrative. ".repeat(20);
        std::fs::write(
            &path,
            format!("<html><head><script>ignored()</script></head><body><p>{body}</p></body></html>"),
        )
        .unwrap();

        let text = extract_full_text(&path).unwrap();
        assert!(text.contains("Annual report narrative."));
        assert!(!text.contains("ignored"));
    }

    #[test]
    fn tiny_output_is_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("10k_2024.html");
        std::fs::write(&path, "<html><body>hi</body></html>").unwrap();
        assert!(extract_full_text(&path).is_none());
    }

    #[test]
    fn picks_the_latest_filing_year() {
        let dir = tempfile::tempdir().unwrap();
        let company = dir.path().join("0000320193");
        std::fs::create_dir_all(&company).unwrap();
        std::fs::write(company.join("10k_2022.html"), "x").unwrap();
        std::fs::write(company.join("10k_2024.html"), "x").unwrap();

        let found = find_10k_file("0000320193", dir.path()).unwrap();
        assert!(found.ends_with("10k_2024.html"));
    }

    #[test]
    fn missing_company_dir_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(find_10k_file("0000000009", dir.path()).is_none());
    }
}
