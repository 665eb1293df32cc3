//! Raw ODBC bindings and the [`NativeDriver`] built on them.
//!
//! Linked against `odbc32` on Windows and the unixODBC driver manager
//! (`libodbc`) elsewhere. Text crosses the boundary as UTF-16 (`SQLWCHAR`),
//! NUL terminated, using the `W` entry points.
//!
//! This is the **only** file that contains `unsafe` code or C types.

#![allow(non_snake_case)]

use std::ffi::c_void;
use std::ptr;

use zeroize::Zeroizing;

use crate::binding::{ColumnBinding, ColumnBuffer};
use crate::diagnostics::DiagnosticRecord;
use crate::driver::{
    ColumnField, Driver, DriverCompletion, HandleType, OdbcVersion, RawHandle, SqlReturn,
};

// ── ODBC constants ──────────────────────────────────────────────────────

const SQL_NTS: i16 = -3;
const SQL_NTS_LONG: i32 = -3;
const SQL_ATTR_ODBC_VERSION: i32 = 200;
const SQL_DESC_NAME: u16 = 1011;
const SQL_CLOSE: u16 = 0;
const SQL_UNBIND: u16 = 2;

/// `SQLGetDiagRec` message buffer, in characters.
const DIAG_MESSAGE_CHARS: usize = 1024;
/// Five character SQLSTATE plus terminator.
const SQLSTATE_CHARS: usize = 6;

// ── Native backend ──────────────────────────────────────────────────────

type SQLHANDLE = *mut c_void;
type SQLRETURN = i16;

#[cfg_attr(windows, link(name = "odbc32"))]
#[cfg_attr(not(windows), link(name = "odbc"))]
extern "system" {
    // Handle lifecycle
    fn SQLAllocHandle(kind: i16, input: SQLHANDLE, output: *mut SQLHANDLE) -> SQLRETURN;
    fn SQLFreeHandle(kind: i16, handle: SQLHANDLE) -> SQLRETURN;
    fn SQLSetEnvAttr(env: SQLHANDLE, attribute: i32, value: *mut c_void, length: i32)
        -> SQLRETURN;

    // Connections
    fn SQLConnectW(
        dbc: SQLHANDLE,
        server: *const u16,
        server_len: i16,
        user: *const u16,
        user_len: i16,
        auth: *const u16,
        auth_len: i16,
    ) -> SQLRETURN;
    fn SQLDriverConnectW(
        dbc: SQLHANDLE,
        window: *mut c_void,
        in_conn: *const u16,
        in_len: i16,
        out_conn: *mut u16,
        out_max: i16,
        out_len: *mut i16,
        completion: u16,
    ) -> SQLRETURN;
    fn SQLDisconnect(dbc: SQLHANDLE) -> SQLRETURN;

    // Diagnostics
    fn SQLGetDiagRecW(
        kind: i16,
        handle: SQLHANDLE,
        record: i16,
        state: *mut u16,
        native: *mut i32,
        message: *mut u16,
        message_max: i16,
        message_len: *mut i16,
    ) -> SQLRETURN;

    // Statements
    fn SQLExecDirectW(stmt: SQLHANDLE, text: *const u16, text_len: i32) -> SQLRETURN;
    fn SQLNumResultCols(stmt: SQLHANDLE, count: *mut i16) -> SQLRETURN;
    fn SQLColAttributeW(
        stmt: SQLHANDLE,
        column: u16,
        field: u16,
        char_attr: *mut c_void,
        char_max: i16,
        char_len: *mut i16,
        num_attr: *mut isize,
    ) -> SQLRETURN;
    fn SQLBindCol(
        stmt: SQLHANDLE,
        column: u16,
        target_type: i16,
        target: *mut c_void,
        target_len: isize,
        indicator: *mut isize,
    ) -> SQLRETURN;
    fn SQLFetch(stmt: SQLHANDLE) -> SQLRETURN;
    fn SQLRowCount(stmt: SQLHANDLE, count: *mut isize) -> SQLRETURN;
    fn SQLFreeStmt(stmt: SQLHANDLE, option: u16) -> SQLRETURN;
}

/// UTF-16, NUL terminated.
fn wide(text: &str) -> Vec<u16> {
    text.encode_utf16().chain(std::iter::once(0)).collect()
}

/// Like [`wide`] but wiped on drop; for anything carrying a password.
fn wide_secret(text: &str) -> Zeroizing<Vec<u16>> {
    Zeroizing::new(wide(text))
}

fn until_nul(units: &[u16]) -> &[u16] {
    let end = units.iter().position(|&unit| unit == 0).unwrap_or(units.len());
    &units[..end]
}

/// The system ODBC driver manager.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NativeDriver;

impl Driver for NativeDriver {
    fn alloc_handle(
        &mut self,
        kind: HandleType,
        parent: Option<RawHandle>,
    ) -> (SqlReturn, Option<RawHandle>) {
        let input = parent.map_or(ptr::null_mut(), RawHandle::as_ptr);
        let mut output: SQLHANDLE = ptr::null_mut();
        // SAFETY: `input` is null (environment) or a live parent handle;
        // `output` is a valid out-pointer.
        let rc = unsafe { SQLAllocHandle(kind.as_raw(), input, &mut output) };
        (SqlReturn::from_raw(rc), RawHandle::from_ptr(output))
    }

    fn free_handle(&mut self, kind: HandleType, handle: RawHandle) -> SqlReturn {
        // SAFETY: the session frees each handle it owns at most once.
        SqlReturn::from_raw(unsafe { SQLFreeHandle(kind.as_raw(), handle.as_ptr()) })
    }

    fn set_odbc_version(&mut self, env: RawHandle, version: OdbcVersion) -> SqlReturn {
        // Integer attributes travel in the pointer argument.
        let value = ptr::without_provenance_mut(version.as_raw());
        // SAFETY: `env` is a live environment handle.
        SqlReturn::from_raw(unsafe {
            SQLSetEnvAttr(env.as_ptr(), SQL_ATTR_ODBC_VERSION, value, 0)
        })
    }

    fn connect(&mut self, dbc: RawHandle, server: &str, user: &str, password: &str) -> SqlReturn {
        let server = wide(server);
        let user = wide(user);
        let password = wide_secret(password);
        // SAFETY: all strings are NUL terminated and outlive the call.
        SqlReturn::from_raw(unsafe {
            SQLConnectW(
                dbc.as_ptr(),
                server.as_ptr(),
                SQL_NTS,
                user.as_ptr(),
                SQL_NTS,
                password.as_ptr(),
                SQL_NTS,
            )
        })
    }

    fn driver_connect(
        &mut self,
        dbc: RawHandle,
        connection_string: &str,
        completion: DriverCompletion,
    ) -> SqlReturn {
        let input = wide_secret(connection_string);
        let mut out_len: i16 = 0;
        // SAFETY: `input` is NUL terminated; no output buffer is requested
        // and no window handle is needed without prompting.
        SqlReturn::from_raw(unsafe {
            SQLDriverConnectW(
                dbc.as_ptr(),
                ptr::null_mut(),
                input.as_ptr(),
                SQL_NTS,
                ptr::null_mut(),
                0,
                &mut out_len,
                completion.as_raw(),
            )
        })
    }

    fn disconnect(&mut self, dbc: RawHandle) -> SqlReturn {
        // SAFETY: `dbc` is a live connection handle.
        SqlReturn::from_raw(unsafe { SQLDisconnect(dbc.as_ptr()) })
    }

    fn diag_rec(
        &mut self,
        kind: HandleType,
        handle: RawHandle,
        number: i16,
        record: &mut DiagnosticRecord,
    ) -> SqlReturn {
        let mut state = [0u16; SQLSTATE_CHARS];
        let mut message = vec![0u16; DIAG_MESSAGE_CHARS];
        let mut native = 0i32;
        let mut message_len: i16 = 0;
        let message_max = i16::try_from(message.len()).unwrap_or(i16::MAX);
        // SAFETY: buffers are sized as advertised to the driver.
        let rc = SqlReturn::from_raw(unsafe {
            SQLGetDiagRecW(
                kind.as_raw(),
                handle.as_ptr(),
                number,
                state.as_mut_ptr(),
                &mut native,
                message.as_mut_ptr(),
                message_max,
                &mut message_len,
            )
        });
        if rc.is_success() {
            let len = usize::try_from(message_len)
                .unwrap_or(0)
                .min(DIAG_MESSAGE_CHARS - 1);
            record.state = String::from_utf16_lossy(until_nul(&state));
            record.native_code = native;
            record.message = String::from_utf16_lossy(until_nul(&message[..len]));
        }
        rc
    }

    fn exec_direct(&mut self, stmt: RawHandle, command: &str) -> SqlReturn {
        let text = wide(command);
        // SAFETY: `text` is NUL terminated and outlives the call.
        SqlReturn::from_raw(unsafe { SQLExecDirectW(stmt.as_ptr(), text.as_ptr(), SQL_NTS_LONG) })
    }

    fn num_result_cols(&mut self, stmt: RawHandle) -> (SqlReturn, i16) {
        let mut count: i16 = 0;
        // SAFETY: `count` is a valid out-pointer.
        let rc = unsafe { SQLNumResultCols(stmt.as_ptr(), &mut count) };
        (SqlReturn::from_raw(rc), count)
    }

    fn col_attribute(
        &mut self,
        stmt: RawHandle,
        ordinal: u16,
        field: ColumnField,
    ) -> (SqlReturn, isize) {
        let mut value: isize = 0;
        // SAFETY: numeric fields only write `value`.
        let rc = unsafe {
            SQLColAttributeW(
                stmt.as_ptr(),
                ordinal,
                field.as_raw(),
                ptr::null_mut(),
                0,
                ptr::null_mut(),
                &mut value,
            )
        };
        (SqlReturn::from_raw(rc), value)
    }

    fn col_name(&mut self, stmt: RawHandle, ordinal: u16, max_chars: usize) -> (SqlReturn, String) {
        let mut name = vec![0u16; max_chars + 1];
        let byte_max = i16::try_from(name.len() * 2).unwrap_or(i16::MAX & !1);
        let mut byte_len: i16 = 0;
        // SAFETY: `name` holds `byte_max` bytes; the driver truncates and
        // terminates longer names.
        let rc = unsafe {
            SQLColAttributeW(
                stmt.as_ptr(),
                ordinal,
                SQL_DESC_NAME,
                name.as_mut_ptr().cast(),
                byte_max,
                &mut byte_len,
                ptr::null_mut(),
            )
        };
        let chars = (usize::try_from(byte_len).unwrap_or(0) / 2).min(max_chars);
        (
            SqlReturn::from_raw(rc),
            String::from_utf16_lossy(until_nul(&name[..chars])),
        )
    }

    fn bind_col(&mut self, stmt: RawHandle, ordinal: u16, buffer: &mut ColumnBuffer) -> SqlReturn {
        let Ok(byte_len) = isize::try_from(buffer.byte_len()) else {
            return SqlReturn::Error;
        };
        // SAFETY: the buffer's data and indicator are separate heap
        // allocations that are never resized; the session unbinds before
        // dropping them.
        SqlReturn::from_raw(unsafe {
            SQLBindCol(
                stmt.as_ptr(),
                ordinal,
                buffer.c_type().as_raw(),
                buffer.data_ptr().cast(),
                byte_len,
                buffer.indicator_ptr(),
            )
        })
    }

    fn fetch(&mut self, stmt: RawHandle, _columns: &mut [ColumnBinding]) -> SqlReturn {
        // SAFETY: the driver writes through the addresses bound earlier.
        SqlReturn::from_raw(unsafe { SQLFetch(stmt.as_ptr()) })
    }

    fn row_count(&mut self, stmt: RawHandle) -> (SqlReturn, isize) {
        let mut count: isize = 0;
        // SAFETY: `count` is a valid out-pointer.
        let rc = unsafe { SQLRowCount(stmt.as_ptr(), &mut count) };
        (SqlReturn::from_raw(rc), count)
    }

    fn close_cursor(&mut self, stmt: RawHandle) -> SqlReturn {
        // SAFETY: `stmt` is a live statement handle.
        SqlReturn::from_raw(unsafe { SQLFreeStmt(stmt.as_ptr(), SQL_CLOSE) })
    }

    fn unbind(&mut self, stmt: RawHandle) -> SqlReturn {
        // SAFETY: `stmt` is a live statement handle.
        SqlReturn::from_raw(unsafe { SQLFreeStmt(stmt.as_ptr(), SQL_UNBIND) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wide_is_nul_terminated() {
        assert_eq!(wide("ab"), vec![u16::from(b'a'), u16::from(b'b'), 0]);
        assert_eq!(until_nul(&wide("ab")), &[u16::from(b'a'), u16::from(b'b')]);
    }
}
