//! Error types for session operations.
//!
//! A [`SessionError`] only says which class of failure stopped the
//! operation. The driver's messages are in the session's
//! [`Ledger`](crate::Ledger).

use strum::Display;
use thiserror::Error;

use crate::driver::HandleType;

/// Driver entry point that reported a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Operation {
    /// `SQLSetEnvAttr`
    SetOdbcVersion,
    /// `SQLAllocHandle`
    AllocHandle,
    /// `SQLConnect`
    Connect,
    /// `SQLDriverConnect`
    DriverConnect,
    /// `SQLExecDirect`
    ExecDirect,
    /// `SQLNumResultCols`
    NumResultCols,
    /// `SQLColAttribute`
    ColAttribute,
    /// `SQLBindCol`
    BindCol,
    /// `SQLFetch`
    Fetch,
    /// `SQLRowCount`
    RowCount,
    /// `SQLFreeStmt(SQL_CLOSE)`
    CloseCursor,
    /// `SQLFreeStmt(SQL_UNBIND)`
    Unbind,
}

/// Failure of a session operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The operation needs a statement handle and the session has none.
    #[error("not_connected")]
    NotConnected,
    /// The driver could not allocate a handle.
    #[error("allocation_failed: {0}")]
    Allocation(HandleType),
    /// The driver reported `SQL_ERROR`.
    #[error("driver_error: {0}")]
    Driver(Operation),
    /// The driver rejected a handle as invalid.
    #[error("invalid_handle: {0}")]
    InvalidHandle(HandleType),
    /// A handle could not be released; it is kept for a retry.
    #[error("release_failed: {0}")]
    Release(HandleType),
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;
