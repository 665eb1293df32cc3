//! Session layer over ODBC.
//!
//! A [`Session`] owns the environment → connection → statement handle chain
//! of one database connection, runs commands directly and binds every
//! result column to a text buffer whose shape is only known after
//! execution. Driver feedback of each operation is kept in a bounded
//! [`Ledger`]; public operations return only the failure class.
//!
//! The driver itself sits behind the [`Driver`] trait. With the `native`
//! feature, [`NativeDriver`] talks to the system driver manager; the `ffi`
//! module is the **only** file that contains `unsafe` code or C types.
//!
//! [`Decimal`] is a small fixed-point type for exact numeric columns.

#[cfg(feature = "native")]
mod ffi;

pub mod binding;
pub mod config;
pub mod decimal;
pub mod diagnostics;
pub mod driver;
pub mod error;
mod result_set;
mod session;

pub use binding::{
    ColumnBinder, ColumnBinding, ColumnBuffer, ColumnInfo, Row, SqlDataType, TextBinder,
};
pub use config::SessionConfig;
pub use decimal::{Decimal, DecimalError};
pub use diagnostics::{DiagnosticRecord, Ledger, OverflowPolicy};
pub use driver::{Driver, HandleType, OdbcVersion, RawHandle, SqlReturn};
pub use error::{Operation, SessionError, SessionResult};
#[cfg(feature = "native")]
pub use ffi::NativeDriver;
pub use result_set::ResultSet;
pub use session::{ExecSummary, Session, SessionState};
