//! Configuration types for the spool intake pipeline.
//!
//! All intake and queue behaviour is controlled through [`SpoolConfig`],
//! built via its [`SpoolConfigBuilder`]. The default printer is read through
//! the [`SettingsProvider`] trait so hosts with their own settings store can
//! plug it in without going through this struct.

use crate::error::IntakeError;
use crate::format::SourceFormat;
use std::path::PathBuf;

/// Source of the fallback printer name used when a job carries no hint.
pub trait SettingsProvider: Send + Sync {
    /// Printer name assigned to jobs that arrive without one.
    fn default_printer(&self) -> String;
}

/// Configuration for intake and the pending-job queue.
///
/// # Example
/// ```rust
/// use edgequake_spool::SpoolConfig;
///
/// let config = SpoolConfig::builder()
///     .spool_folder("/var/spool/edgequake")
///     .default_printer("HP-Default")
///     .concurrency(2)
///     .build()
///     .unwrap();
/// assert_eq!(config.default_printer, "HP-Default");
/// ```
#[derive(Debug, Clone)]
pub struct SpoolConfig {
    /// Directory under which one workspace per job is created.
    pub spool_folder: PathBuf,

    /// Printer name for jobs without a printer hint. Default: "PDFCreator".
    pub default_printer: String,

    /// Candidate names tried before workspace allocation gives up. Default: 1000.
    ///
    /// Each candidate is one `create_dir` call, so the cap bounds the work a
    /// single intake can do against a spool folder full of stale workspaces.
    pub max_allocation_attempts: u32,

    /// Buffered new-job notifications per subscriber. Default: 64.
    ///
    /// A subscriber that falls further behind loses the oldest notifications
    /// instead of stalling producers.
    pub notification_capacity: usize,

    /// Number of raw files taken over in parallel by `ingest_all`. Default: 4.
    pub concurrency: usize,

    /// Pin every raw file to one format instead of detecting by extension.
    pub format: Option<SourceFormat>,
}

impl Default for SpoolConfig {
    fn default() -> Self {
        Self {
            spool_folder: std::env::temp_dir().join("edgequake-spool"),
            default_printer: "PDFCreator".to_string(),
            max_allocation_attempts: 1000,
            notification_capacity: 64,
            concurrency: 4,
            format: None,
        }
    }
}

impl SettingsProvider for SpoolConfig {
    fn default_printer(&self) -> String {
        self.default_printer.clone()
    }
}

impl SpoolConfig {
    /// Create a new builder for `SpoolConfig`.
    pub fn builder() -> SpoolConfigBuilder {
        SpoolConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`SpoolConfig`].
#[derive(Debug)]
pub struct SpoolConfigBuilder {
    config: SpoolConfig,
}

impl SpoolConfigBuilder {
    pub fn spool_folder(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.spool_folder = dir.into();
        self
    }

    pub fn default_printer(mut self, name: impl Into<String>) -> Self {
        self.config.default_printer = name.into();
        self
    }

    pub fn max_allocation_attempts(mut self, n: u32) -> Self {
        self.config.max_allocation_attempts = n;
        self
    }

    pub fn notification_capacity(mut self, n: usize) -> Self {
        self.config.notification_capacity = n;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn format(mut self, format: SourceFormat) -> Self {
        self.config.format = Some(format);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<SpoolConfig, IntakeError> {
        let c = &self.config;
        if c.spool_folder.as_os_str().is_empty() {
            return Err(IntakeError::InvalidConfig(
                "Spool folder must not be empty".into(),
            ));
        }
        if c.max_allocation_attempts == 0 {
            return Err(IntakeError::InvalidConfig(
                "Workspace allocation needs at least one attempt".into(),
            ));
        }
        if c.notification_capacity == 0 {
            return Err(IntakeError::InvalidConfig(
                "Notification capacity must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = SpoolConfig::builder().build().unwrap();
        assert_eq!(config.max_allocation_attempts, 1000);
        assert_eq!(config.notification_capacity, 64);
        assert!(config.format.is_none());
    }

    #[test]
    fn rejects_zero_attempts() {
        let err = SpoolConfig::builder()
            .max_allocation_attempts(0)
            .build()
            .unwrap_err();
        assert!(matches!(err, IntakeError::InvalidConfig(_)));
    }

    #[test]
    fn rejects_empty_spool_folder() {
        assert!(SpoolConfig::builder().spool_folder("").build().is_err());
    }

    #[test]
    fn concurrency_is_clamped() {
        let config = SpoolConfig::builder().concurrency(0).build().unwrap();
        assert_eq!(config.concurrency, 1);
    }

    #[test]
    fn config_is_a_settings_provider() {
        let config = SpoolConfig::builder()
            .default_printer("HP-Default")
            .build()
            .unwrap();
        let settings: &dyn SettingsProvider = &config;
        assert_eq!(settings.default_printer(), "HP-Default");
    }
}
