//! PDF files dropped into the spool location.
//!
//! The header check mirrors what PDF readers tolerate: `%PDF-` may appear
//! anywhere in the first 1024 bytes. Page counting scans for `/Type /Page`
//! dictionaries; documents that keep their page tree in compressed object
//! streams report the placeholder instead.

use super::{read_head, FormatHandler, SourceFormat, PLACEHOLDER_PAGE_COUNT};
use once_cell::sync::Lazy;
use regex::bytes::Regex;
use std::path::Path;
use tracing::debug;

const HEADER_WINDOW: usize = 1024;
const PDF_MAGIC: &[u8] = b"%PDF-";

/// `/Type /Page` not followed by `s` (which would be the `/Pages` tree node).
static RE_PAGE_OBJECT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/Type\s*/Page(?:[^s]|$)").unwrap());

/// Handler for [`SourceFormat::Pdf`].
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfHandler;

impl FormatHandler for PdfHandler {
    fn format(&self) -> SourceFormat {
        SourceFormat::Pdf
    }

    fn validate(&self, path: &Path) -> bool {
        match read_head(path, HEADER_WINDOW) {
            Ok(head) => head.windows(PDF_MAGIC.len()).any(|w| w == PDF_MAGIC),
            Err(e) => {
                debug!("Cannot read '{}' for validation: {}", path.display(), e);
                false
            }
        }
    }

    fn count_pages(&self, path: &Path) -> u32 {
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) => {
                debug!("Page scan of '{}' failed: {}", path.display(), e);
                return PLACEHOLDER_PAGE_COUNT;
            }
        };
        match RE_PAGE_OBJECT.find_iter(&bytes).count() {
            0 => PLACEHOLDER_PAGE_COUNT,
            n => u32::try_from(n).unwrap_or(u32::MAX),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const TWO_PAGES: &[u8] = b"%PDF-1.4\n\
1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n\
2 0 obj << /Type /Pages /Kids [3 0 R 4 0 R] /Count 2 >> endobj\n\
3 0 obj << /Type /Page /Parent 2 0 R >> endobj\n\
4 0 obj << /Type/Page /Parent 2 0 R >> endobj\n\
%%EOF\n";

    #[test]
    fn validates_header_with_leading_junk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("job.pdf");
        let mut body = b"\x1b%-12345X\r\n".to_vec();
        body.extend_from_slice(TWO_PAGES);
        std::fs::write(&path, body).unwrap();
        assert!(PdfHandler.validate(&path));
    }

    #[test]
    fn rejects_postscript() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("job.pdf");
        std::fs::write(&path, b"%!PS-Adobe-3.0\n").unwrap();
        assert!(!PdfHandler.validate(&path));
    }

    #[test]
    fn counts_page_objects_not_tree_nodes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("job.pdf");
        std::fs::write(&path, TWO_PAGES).unwrap();
        assert_eq!(PdfHandler.count_pages(&path), 2);
    }

    #[test]
    fn compressed_page_tree_reports_placeholder() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("job.pdf");
        std::fs::write(&path, b"%PDF-1.7\n1 0 obj << /Type /ObjStm >> stream\n\x78\x9c\nendstream\n")
            .unwrap();
        assert_eq!(PdfHandler.count_pages(&path), PLACEHOLDER_PAGE_COUNT);
    }
}
