//! PostScript spool files.
//!
//! A driver-produced job normally starts with `%!PS-Adobe-3.0`, but spoolers
//! may prepend a Ctrl-D, a UTF-8 BOM or a PJL job header (`ESC%-12345X@PJL
//! ... ENTER LANGUAGE=POSTSCRIPT`). Encapsulated PostScript with a DOS binary
//! header is accepted too.
//!
//! Page count follows the Document Structuring Conventions: the header's
//! `%%Pages: N` wins, or the trailer's when the header says `(atend)`.
//! Without either, the `%%Page:` markers are counted. Comments of embedded
//! documents (EPS figures) never count.

use super::{read_head, FormatHandler, SourceFormat, PLACEHOLDER_PAGE_COUNT};
use once_cell::sync::Lazy;
use regex::bytes::Regex;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::debug;

/// How much of the file is inspected by [`PostScriptHandler::validate`].
const HEAD_LEN: usize = 4096;

const PS_MAGIC: &[u8] = b"%!";
const EPS_BINARY_MAGIC: &[u8] = &[0xC5, 0xD0, 0xD3, 0xC6];
const PJL_UEL: &[u8] = b"\x1b%-12345X";
const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];
const CTRL_D: u8 = 0x04;

static RE_PAGES: Lazy<Regex> = Lazy::new(|| Regex::new(r"^%%Pages:\s*(\d+)").unwrap());
static RE_PAGES_ATEND: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^%%Pages:\s*\(atend\)").unwrap());
static RE_PAGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^%%Page:").unwrap());

/// Handler for [`SourceFormat::PostScript`].
#[derive(Debug, Default, Clone, Copy)]
pub struct PostScriptHandler;

impl FormatHandler for PostScriptHandler {
    fn format(&self) -> SourceFormat {
        SourceFormat::PostScript
    }

    fn validate(&self, path: &Path) -> bool {
        match read_head(path, HEAD_LEN) {
            Ok(head) => looks_like_postscript(&head),
            Err(e) => {
                debug!("Cannot read '{}' for validation: {}", path.display(), e);
                false
            }
        }
    }

    fn count_pages(&self, path: &Path) -> u32 {
        match scan_pages(path) {
            Ok(Some(n)) => n,
            Ok(None) => {
                debug!("No page markers in '{}'", path.display());
                PLACEHOLDER_PAGE_COUNT
            }
            Err(e) => {
                debug!("Page scan of '{}' failed: {}", path.display(), e);
                PLACEHOLDER_PAGE_COUNT
            }
        }
    }
}

fn looks_like_postscript(head: &[u8]) -> bool {
    let mut body = head;
    while let Some((&CTRL_D, rest)) = body.split_first() {
        body = rest;
    }
    body = body.strip_prefix(UTF8_BOM).unwrap_or(body);

    if body.starts_with(PS_MAGIC) || body.starts_with(EPS_BINARY_MAGIC) {
        return true;
    }
    // PJL preamble: the PostScript header starts on a later line.
    body.starts_with(PJL_UEL) && body.windows(3).any(|w| w == b"\n%!")
}

/// Returns `None` when the file carries no usable page information.
///
/// Comments between `%%BeginDocument` and `%%EndDocument` belong to an
/// embedded document and are ignored.
fn scan_pages(path: &Path) -> std::io::Result<Option<u32>> {
    let mut reader = BufReader::new(std::fs::File::open(path)?);
    let mut line = Vec::new();
    let mut declared: Option<u32> = None;
    let mut atend = false;
    let mut markers: u32 = 0;
    let mut nesting: u32 = 0;

    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            break;
        }
        if !line.starts_with(b"%%") {
            continue;
        }
        if line.starts_with(b"%%BeginDocument") {
            nesting += 1;
            continue;
        }
        if line.starts_with(b"%%EndDocument") {
            nesting = nesting.saturating_sub(1);
            continue;
        }
        if nesting > 0 {
            continue;
        }

        if let Some(caps) = RE_PAGES.captures(&line) {
            let n = std::str::from_utf8(&caps[1])
                .ok()
                .and_then(|s| s.parse::<u32>().ok());
            if let Some(n) = n {
                if declared.is_none() || atend {
                    declared = Some(n);
                    atend = false;
                }
            }
        } else if RE_PAGES_ATEND.is_match(&line) {
            atend = declared.is_none();
        } else if RE_PAGE.is_match(&line) {
            markers = markers.saturating_add(1);
        }
    }

    Ok(match declared {
        Some(n) if n > 0 => Some(n),
        _ if markers > 0 => Some(markers),
        _ => None,
    })
}
