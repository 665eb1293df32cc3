//! Session tuning knobs.

use serde::Deserialize;

use crate::diagnostics::OverflowPolicy;
use crate::driver::OdbcVersion;

/// Default ledger capacity.
pub const DEFAULT_MAX_RECORDS: usize = 60;

/// Widest a column is ever rendered, in characters. Also caps column names.
pub const DISPLAY_COLUMN_MAX: usize = 50;

/// Narrowest a column is rendered; wide enough for `<NULL>`.
pub const NULL_COLUMN_SIZE: usize = 6;

/// Buffer size used when a driver reports no usable column length
/// (`varchar(max)` and friends report 0 or a huge value).
pub const DEFAULT_MAX_BIND_CHARS: usize = 32_768;

/// Configuration for a [`Session`](crate::Session).
///
/// Deserializable so callers can keep it next to the rest of their
/// settings; every field has a default.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Capacity of the diagnostic ledger.
    pub max_records: usize,
    /// What the ledger does once full.
    pub overflow_policy: OverflowPolicy,
    /// ODBC behaviour requested from the driver manager.
    pub odbc_version: OdbcVersion,
    /// Upper bound on a column's display width.
    pub max_display_width: usize,
    /// Lower bound on a column's display width.
    pub min_display_width: usize,
    /// Largest text buffer bound for a single column, in UTF-16 units.
    pub max_bind_chars: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_records: DEFAULT_MAX_RECORDS,
            overflow_policy: OverflowPolicy::default(),
            odbc_version: OdbcVersion::default(),
            max_display_width: DISPLAY_COLUMN_MAX,
            min_display_width: NULL_COLUMN_SIZE,
            max_bind_chars: DEFAULT_MAX_BIND_CHARS,
        }
    }
}

impl SessionConfig {
    /// Sets the ledger capacity.
    #[must_use]
    pub const fn with_max_records(mut self, max_records: usize) -> Self {
        self.max_records = max_records;
        self
    }

    /// Sets the ledger overflow policy.
    #[must_use]
    pub const fn with_overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.overflow_policy = policy;
        self
    }

    /// Sets the requested ODBC version.
    #[must_use]
    pub const fn with_odbc_version(mut self, version: OdbcVersion) -> Self {
        self.odbc_version = version;
        self
    }

    /// Sets the per-column bind limit.
    #[must_use]
    pub const fn with_max_bind_chars(mut self, max_bind_chars: usize) -> Self {
        self.max_bind_chars = max_bind_chars;
        self
    }

    /// Display width for a column: the wider of content and name, kept
    /// within `[min_display_width, max_display_width]`.
    #[must_use]
    pub fn display_width(&self, declared_size: usize, name_width: usize) -> usize {
        declared_size
            .max(name_width)
            .max(self.min_display_width)
            .min(self.max_display_width.max(self.min_display_width))
    }
}
