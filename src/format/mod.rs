//! Source-format handlers: validate a raw spool file and read its page count.
//!
//! Each supported format is one variant of the closed [`SourceFormat`] set.
//! A variant is dispatched to its [`FormatHandler`] through
//! [`SourceFormat::handler`]; adding a format means adding a variant and a
//! handler, not extending a type hierarchy.
//!
//! Handlers are read-only over the input file and never fail intake on
//! their own: [`FormatHandler::validate`] is a yes/no gate, and
//! [`FormatHandler::count_pages`] degrades to [`PLACEHOLDER_PAGE_COUNT`]
//! when the file cannot be parsed.

pub mod pdf;
pub mod postscript;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Read;
use std::path::Path;

pub use pdf::PdfHandler;
pub use postscript::PostScriptHandler;

/// Page count reported when a handler cannot determine the real value.
pub const PLACEHOLDER_PAGE_COUNT: u32 = 1;

/// Validation and metadata extraction for one source format.
pub trait FormatHandler: Send + Sync {
    /// The format this handler understands.
    fn format(&self) -> SourceFormat;

    /// Cheap structural check that `path` is plausibly this format.
    ///
    /// Unreadable files are reported as invalid rather than as an error.
    fn validate(&self, path: &Path) -> bool;

    /// Best-effort page count. Never fails; see [`PLACEHOLDER_PAGE_COUNT`].
    fn count_pages(&self, path: &Path) -> u32;
}

/// The closed set of source formats a spool file can have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    /// PostScript as written by a PostScript printer driver.
    PostScript,
    /// PDF dropped directly into the spool location.
    Pdf,
}

static POSTSCRIPT: PostScriptHandler = PostScriptHandler;
static PDF: PdfHandler = PdfHandler;

impl SourceFormat {
    /// Every supported format, in the order unknown files are probed.
    pub const ALL: [SourceFormat; 2] = [SourceFormat::PostScript, SourceFormat::Pdf];

    /// The handler implementing this format's contract.
    pub fn handler(self) -> &'static dyn FormatHandler {
        match self {
            SourceFormat::PostScript => &POSTSCRIPT,
            SourceFormat::Pdf => &PDF,
        }
    }

    /// Guess the format from the file extension.
    ///
    /// Returns `None` for unknown or missing extensions; callers that know
    /// what their spooler writes should pin the format instead.
    pub fn detect(path: &Path) -> Option<SourceFormat> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "ps" | "eps" | "prn" => Some(SourceFormat::PostScript),
            "pdf" => Some(SourceFormat::Pdf),
            _ => None,
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceFormat::PostScript => f.write_str("PostScript"),
            SourceFormat::Pdf => f.write_str("PDF"),
        }
    }
}

impl std::str::FromStr for SourceFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ps" | "postscript" => Ok(SourceFormat::PostScript),
            "pdf" => Ok(SourceFormat::Pdf),
            other => Err(format!("unknown source format '{other}' (expected ps or pdf)")),
        }
    }
}

/// Read at most `limit` bytes from the start of `path`.
pub(crate) fn read_head(path: &Path, limit: usize) -> std::io::Result<Vec<u8>> {
    let file = std::fs::File::open(path)?;
    let mut head = Vec::with_capacity(limit);
    file.take(limit as u64).read_to_end(&mut head)?;
    Ok(head)
}
