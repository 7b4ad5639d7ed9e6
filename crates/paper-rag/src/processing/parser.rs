use anyhow::{anyhow, Context, Result};
use std::path::Path;

/// Extract plain text from an in-memory PDF.
pub fn extract_pdf_text(bytes: &[u8]) -> Result<String> {
    let raw = pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| anyhow!("PDF text extraction failed: {}", e))?;

    let text = normalize_lines(&raw);
    if text.is_empty() {
        return Err(anyhow!("PDF contains no extractable text (scanned/image-based)"));
    }

    let garble_score = column_garble_score(&text);
    if garble_score >= 0.25 {
        tracing::warn!(
            garble_score = format!("{:.2}", garble_score),
            "PDF text extraction appears garbled, retrieval quality may suffer"
        );
    }
    Ok(text)
}

pub fn extract_pdf_file(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read PDF: {}", path.display()))?;
    extract_pdf_text(&bytes).with_context(|| format!("Failed to parse PDF: {}", path.display()))
}

/// Trim lines and collapse blank-line runs to a single paragraph break.
fn normalize_lines(text: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    let mut blank = false;
    for line in text.lines().map(str::trim) {
        if line.is_empty() {
            blank = !out.is_empty();
            continue;
        }
        if blank {
            out.push("");
            blank = false;
        }
        out.push(line);
    }
    out.join("\n")
}

/// Score how likely the extracted text is garbled from column merging.
/// Returns 0.0 (clean) to 1.0 (heavily garbled).
///
/// pdf_extract merges two-column layouts into single lines, leaving large
/// internal whitespace gaps where unrelated column content meets.
fn column_garble_score(text: &str) -> f64 {
    let lines: Vec<&str> = text.lines().collect();
    if lines.len() < 3 {
        return 0.0;
    }

    let mut garbled_lines = 0usize;
    let mut scored_lines = 0usize;

    for line in &lines {
        // Skip very short lines (headers, labels)
        if line.len() < 15 {
            continue;
        }
        scored_lines += 1;

        let gap_count = line
            .as_bytes()
            .windows(3)
            .filter(|w| w.iter().all(|&b| b == b' '))
            .count();
        let tab_count = line.chars().filter(|&c| c == '\t').count();

        if gap_count >= 1 || tab_count >= 2 {
            garbled_lines += 1;
        }
    }

    if scored_lines == 0 {
        return 0.0;
    }

    garbled_lines as f64 / scored_lines as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_lines() {
        let raw = "  Title  \n\n\n\nAbstract text\n   \nBody line one\nBody line two\n\n";
        assert_eq!(normalize_lines(raw), "Title\n\nAbstract text\n\nBody line one\nBody line two");
    }

    #[test]
    fn test_garble_score() {
        let clean = "This is a normal sentence.\nAnother ordinary line of prose.\nAnd a third one here.";
        assert_eq!(column_garble_score(clean), 0.0);

        let garbled = "Left column text     right column text\nMore left words      more right words\nAgain left side      again right side";
        assert!(column_garble_score(garbled) > 0.9);
    }

    #[test]
    fn test_rejects_non_pdf_bytes() {
        assert!(extract_pdf_text(b"definitely not a pdf").is_err());
    }
}
