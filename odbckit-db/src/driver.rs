//! The contract between a [`Session`](crate::Session) and the ODBC driver.
//!
//! Everything below this trait (driver manager, driver, network) is opaque:
//! every call returns a [`SqlReturn`] and the session decides what to do with
//! it. With the `native` feature, `NativeDriver` implements it over the
//! system driver manager; tests plug in scripted in-memory drivers.

use std::ffi::c_void;
use std::fmt;
use std::ptr::NonNull;

use serde::Deserialize;
use strum::Display;

use crate::binding::{ColumnBinding, ColumnBuffer};
use crate::diagnostics::DiagnosticRecord;

/// Status returned by every driver call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlReturn {
    /// `SQL_SUCCESS`
    Success,
    /// `SQL_SUCCESS_WITH_INFO`: the call worked and left diagnostics behind.
    SuccessWithInfo,
    /// `SQL_NO_DATA`
    NoData,
    /// `SQL_ERROR`
    Error,
    /// `SQL_INVALID_HANDLE`
    InvalidHandle,
    /// `SQL_STILL_EXECUTING`
    StillExecuting,
    /// `SQL_NEED_DATA`
    NeedData,
}

impl SqlReturn {
    /// Maps a raw `SQLRETURN`. Unknown codes are treated as errors.
    #[must_use]
    pub const fn from_raw(raw: i16) -> Self {
        match raw {
            0 => Self::Success,
            1 => Self::SuccessWithInfo,
            100 => Self::NoData,
            -2 => Self::InvalidHandle,
            2 => Self::StillExecuting,
            99 => Self::NeedData,
            _ => Self::Error,
        }
    }

    /// `true` for `Success` and `SuccessWithInfo`.
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success | Self::SuccessWithInfo)
    }
}

/// The three levels of the handle chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum HandleType {
    /// `SQL_HANDLE_ENV`
    #[strum(serialize = "environment")]
    Env,
    /// `SQL_HANDLE_DBC`
    #[strum(serialize = "connection")]
    Dbc,
    /// `SQL_HANDLE_STMT`
    #[strum(serialize = "statement")]
    Stmt,
}

impl HandleType {
    /// The `SQL_HANDLE_*` constant.
    #[must_use]
    pub const fn as_raw(self) -> i16 {
        match self {
            Self::Env => 1,
            Self::Dbc => 2,
            Self::Stmt => 3,
        }
    }
}

/// Opaque, non-null handle to a driver-managed resource.
///
/// Holds a raw pointer, so it is neither `Send` nor `Sync`; a session and
/// its handles stay on the thread that created them.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawHandle(NonNull<c_void>);

impl RawHandle {
    /// Wraps a handle written by the driver. Returns `None` for null.
    #[must_use]
    pub fn from_ptr(ptr: *mut c_void) -> Option<Self> {
        NonNull::new(ptr).map(Self)
    }

    /// Builds a handle from an arbitrary non-zero token.
    ///
    /// For drivers that do not hand out real pointers (in-memory drivers,
    /// test doubles). Returns `None` for zero.
    #[must_use]
    pub fn from_token(token: usize) -> Option<Self> {
        Self::from_ptr(std::ptr::without_provenance_mut(token))
    }

    /// The raw pointer passed back to the driver.
    #[must_use]
    pub const fn as_ptr(self) -> *mut c_void {
        self.0.as_ptr()
    }

    /// The address as an integer; inverse of [`from_token`](Self::from_token).
    #[must_use]
    pub fn token(self) -> usize {
        self.0.as_ptr().addr()
    }
}

impl fmt::Debug for RawHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawHandle({:#x})", self.token())
    }
}

/// Value for `SQL_ATTR_ODBC_VERSION`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Display)]
pub enum OdbcVersion {
    /// `SQL_OV_ODBC3`
    #[default]
    #[serde(rename = "v3")]
    #[strum(serialize = "3.0")]
    V3,
    /// `SQL_OV_ODBC3_80`
    #[serde(rename = "v3_80")]
    #[strum(serialize = "3.80")]
    V3_80,
}

impl OdbcVersion {
    /// The `SQL_OV_*` constant.
    #[must_use]
    pub const fn as_raw(self) -> usize {
        match self {
            Self::V3 => 3,
            Self::V3_80 => 380,
        }
    }
}

/// Prompting behaviour for `SQLDriverConnect`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverCompletion {
    /// `SQL_DRIVER_NOPROMPT`: fail instead of asking the user.
    NoPrompt,
}

impl DriverCompletion {
    /// The `SQL_DRIVER_*` constant.
    #[must_use]
    pub const fn as_raw(self) -> u16 {
        match self {
            Self::NoPrompt => 0,
        }
    }
}

/// Numeric column attributes read through `SQLColAttribute`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnField {
    /// `SQL_DESC_CONCISE_TYPE`
    ConciseType,
    /// `SQL_DESC_LENGTH`
    Length,
}

impl ColumnField {
    /// The `SQL_DESC_*` field identifier.
    #[must_use]
    pub const fn as_raw(self) -> u16 {
        match self {
            Self::ConciseType => 2,
            Self::Length => 1003,
        }
    }
}

/// Calls a [`Session`](crate::Session) makes into the driver.
///
/// Methods mirror the ODBC entry points one to one. Value-producing calls
/// return the status together with the value; the value is only meaningful
/// when the status is a success.
pub trait Driver {
    /// `SQLAllocHandle`. `parent` is `None` for the environment.
    fn alloc_handle(
        &mut self,
        kind: HandleType,
        parent: Option<RawHandle>,
    ) -> (SqlReturn, Option<RawHandle>);

    /// `SQLFreeHandle`.
    fn free_handle(&mut self, kind: HandleType, handle: RawHandle) -> SqlReturn;

    /// `SQLSetEnvAttr(SQL_ATTR_ODBC_VERSION)`.
    fn set_odbc_version(&mut self, env: RawHandle, version: OdbcVersion) -> SqlReturn;

    /// `SQLConnect` against a named data source.
    fn connect(
        &mut self,
        dbc: RawHandle,
        server: &str,
        user: &str,
        password: &str,
    ) -> SqlReturn;

    /// `SQLDriverConnect` with a full connection string.
    fn driver_connect(
        &mut self,
        dbc: RawHandle,
        connection_string: &str,
        completion: DriverCompletion,
    ) -> SqlReturn;

    /// `SQLDisconnect`.
    fn disconnect(&mut self, dbc: RawHandle) -> SqlReturn;

    /// `SQLGetDiagRec`: fills `record` with diagnostic number `number`
    /// (1-based). Returns `NoData` once `number` is past the last record.
    fn diag_rec(
        &mut self,
        kind: HandleType,
        handle: RawHandle,
        number: i16,
        record: &mut DiagnosticRecord,
    ) -> SqlReturn;

    /// `SQLExecDirect`.
    fn exec_direct(&mut self, stmt: RawHandle, command: &str) -> SqlReturn;

    /// `SQLNumResultCols`.
    fn num_result_cols(&mut self, stmt: RawHandle) -> (SqlReturn, i16);

    /// `SQLColAttribute` for a numeric field.
    fn col_attribute(
        &mut self,
        stmt: RawHandle,
        ordinal: u16,
        field: ColumnField,
    ) -> (SqlReturn, isize);

    /// `SQLColAttribute(SQL_DESC_NAME)`, at most `max_chars` characters.
    fn col_name(&mut self, stmt: RawHandle, ordinal: u16, max_chars: usize)
        -> (SqlReturn, String);

    /// `SQLBindCol`: the driver writes each fetched value of column
    /// `ordinal` into `buffer`.
    ///
    /// The buffer's storage is heap allocated and never reallocated, so its
    /// address stays valid until the session calls [`unbind`](Self::unbind)
    /// and drops it.
    fn bind_col(&mut self, stmt: RawHandle, ordinal: u16, buffer: &mut ColumnBuffer)
        -> SqlReturn;

    /// `SQLFetch`. `columns` are the bindings of this result set, in
    /// ordinal order; drivers that do not write through bound addresses fill
    /// their buffers here.
    fn fetch(&mut self, stmt: RawHandle, columns: &mut [ColumnBinding]) -> SqlReturn;

    /// `SQLRowCount`.
    fn row_count(&mut self, stmt: RawHandle) -> (SqlReturn, isize);

    /// `SQLFreeStmt(SQL_CLOSE)`.
    fn close_cursor(&mut self, stmt: RawHandle) -> SqlReturn;

    /// `SQLFreeStmt(SQL_UNBIND)`.
    fn unbind(&mut self, stmt: RawHandle) -> SqlReturn;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_return_from_raw() {
        assert_eq!(SqlReturn::from_raw(0), SqlReturn::Success);
        assert_eq!(SqlReturn::from_raw(1), SqlReturn::SuccessWithInfo);
        assert_eq!(SqlReturn::from_raw(100), SqlReturn::NoData);
        assert_eq!(SqlReturn::from_raw(-1), SqlReturn::Error);
        assert_eq!(SqlReturn::from_raw(-2), SqlReturn::InvalidHandle);
        assert_eq!(SqlReturn::from_raw(42), SqlReturn::Error);
        assert!(SqlReturn::SuccessWithInfo.is_success());
        assert!(!SqlReturn::NoData.is_success());
    }

    #[test]
    fn test_raw_handle_token_round_trip() {
        let handle = RawHandle::from_token(0x10).expect("non-zero token");
        assert_eq!(handle.token(), 0x10);
        assert!(RawHandle::from_token(0).is_none());
    }

    #[test]
    fn test_handle_type_display() {
        assert_eq!(HandleType::Env.to_string(), "environment");
        assert_eq!(HandleType::Stmt.to_string(), "statement");
    }
}
