//! Common test utilities shared across integration tests.
//!
//! [`ScriptedDriver`] is an in-memory [`Driver`] that hands out fake handle
//! tokens, serves canned result sets and diagnostics, and fails on request.
//! Clones share state, so a test keeps one clone as a probe after moving
//! the other into a `Session`.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use odbckit_db::binding::ColumnBuffer;
use odbckit_db::driver::{ColumnField, DriverCompletion};
use odbckit_db::{
    ColumnBinding, DiagnosticRecord, Driver, HandleType, OdbcVersion, RawHandle, SqlReturn,
};

/// A result column as the driver describes it.
#[derive(Debug, Clone)]
pub struct ScriptedColumn {
    pub name: String,
    pub sql_type: i16,
    pub length: isize,
}

impl ScriptedColumn {
    pub fn new(name: &str, sql_type: i16, length: isize) -> Self {
        Self {
            name: name.to_string(),
            sql_type,
            length,
        }
    }

    pub fn varchar(name: &str, length: isize) -> Self {
        Self::new(name, 12, length)
    }

    pub fn integer(name: &str) -> Self {
        Self::new(name, 4, 10)
    }
}

/// What one executed command produces.
#[derive(Debug, Clone, Default)]
pub struct ScriptedResult {
    pub columns: Vec<ScriptedColumn>,
    pub rows: Vec<Vec<Option<String>>>,
    pub row_count: isize,
}

impl ScriptedResult {
    /// A command without a result set, e.g. an `UPDATE`.
    pub fn affected(row_count: isize) -> Self {
        Self {
            row_count,
            ..Self::default()
        }
    }

    pub fn rows(columns: Vec<ScriptedColumn>, rows: Vec<Vec<Option<&str>>>) -> Self {
        let rows: Vec<Vec<Option<String>>> = rows
            .into_iter()
            .map(|row| row.into_iter().map(|value| value.map(str::to_string)).collect())
            .collect();
        let row_count = isize::try_from(rows.len()).expect("small");
        Self {
            columns,
            rows,
            row_count,
        }
    }

    pub fn with_row_count(mut self, row_count: isize) -> Self {
        self.row_count = row_count;
        self
    }
}

#[derive(Debug, Default)]
pub struct DriverState {
    next_token: usize,
    live: HashMap<usize, HandleType>,
    allocated: HashMap<HandleType, usize>,
    freed: HashMap<HandleType, usize>,
    once: HashMap<&'static str, VecDeque<SqlReturn>>,
    always: HashMap<&'static str, SqlReturn>,
    diagnostics: HashMap<HandleType, Vec<DiagnosticRecord>>,
    results: VecDeque<ScriptedResult>,
    current: Option<ScriptedResult>,
    cursor: usize,
    calls: Vec<&'static str>,
    commands: Vec<String>,
    connection_strings: Vec<String>,
    odbc_versions: Vec<OdbcVersion>,
    bound: Vec<(u16, usize)>,
    diag_lookups: usize,
}

impl DriverState {
    fn status(&mut self, call: &'static str) -> SqlReturn {
        self.calls.push(call);
        if let Some(status) = self.once.get_mut(call).and_then(VecDeque::pop_front) {
            return status;
        }
        self.always.get(call).copied().unwrap_or(SqlReturn::Success)
    }

    fn is_live(&self, handle: RawHandle) -> bool {
        self.live.contains_key(&handle.token())
    }
}

const fn alloc_call(kind: HandleType) -> &'static str {
    match kind {
        HandleType::Env => "alloc_env",
        HandleType::Dbc => "alloc_dbc",
        HandleType::Stmt => "alloc_stmt",
    }
}

const fn free_call(kind: HandleType) -> &'static str {
    match kind {
        HandleType::Env => "free_env",
        HandleType::Dbc => "free_dbc",
        HandleType::Stmt => "free_stmt",
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScriptedDriver {
    state: Rc<RefCell<DriverState>>,
}

impl ScriptedDriver {
    pub fn new() -> Self {
        let driver = Self::default();
        driver.state.borrow_mut().next_token = 0x1000;
        driver
    }

    /// Makes the next `call` return `status` once.
    pub fn fail_once(&self, call: &'static str, status: SqlReturn) {
        self.state
            .borrow_mut()
            .once
            .entry(call)
            .or_default()
            .push_back(status);
    }

    /// Makes every `call` return `status` until [`heal`](Self::heal).
    pub fn fail_always(&self, call: &'static str, status: SqlReturn) {
        self.state.borrow_mut().always.insert(call, status);
    }

    pub fn heal(&self, call: &'static str) {
        let mut state = self.state.borrow_mut();
        state.always.remove(call);
        state.once.remove(call);
    }

    /// Diagnostic records the driver reports for any handle of `kind`.
    pub fn set_diagnostics(&self, kind: HandleType, records: &[(&str, i32, &str)]) {
        let records = records
            .iter()
            .map(|&(state, native_code, message)| DiagnosticRecord {
                state: state.to_string(),
                native_code,
                message: message.to_string(),
                row_count: None,
            })
            .collect();
        self.state.borrow_mut().diagnostics.insert(kind, records);
    }

    /// Queues the outcome of the next executed command.
    pub fn push_result(&self, result: ScriptedResult) {
        self.state.borrow_mut().results.push_back(result);
    }

    pub fn live(&self, kind: HandleType) -> usize {
        self.state
            .borrow()
            .live
            .values()
            .filter(|&&live| live == kind)
            .count()
    }

    pub fn live_total(&self) -> usize {
        self.state.borrow().live.len()
    }

    pub fn allocated(&self, kind: HandleType) -> usize {
        self.state.borrow().allocated.get(&kind).copied().unwrap_or(0)
    }

    pub fn freed(&self, kind: HandleType) -> usize {
        self.state.borrow().freed.get(&kind).copied().unwrap_or(0)
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.state.borrow().calls.clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.state.borrow().calls.iter().filter(|&&c| c == call).count()
    }

    pub fn clear_calls(&self) {
        self.state.borrow_mut().calls.clear();
    }

    pub fn commands(&self) -> Vec<String> {
        self.state.borrow().commands.clone()
    }

    pub fn connection_strings(&self) -> Vec<String> {
        self.state.borrow().connection_strings.clone()
    }

    pub fn odbc_versions(&self) -> Vec<OdbcVersion> {
        self.state.borrow().odbc_versions.clone()
    }

    /// `(ordinal, capacity in chars)` of every `bind_col` call.
    pub fn bound(&self) -> Vec<(u16, usize)> {
        self.state.borrow().bound.clone()
    }

    pub fn diag_lookups(&self) -> usize {
        self.state.borrow().diag_lookups
    }
}

impl Driver for ScriptedDriver {
    fn alloc_handle(
        &mut self,
        kind: HandleType,
        parent: Option<RawHandle>,
    ) -> (SqlReturn, Option<RawHandle>) {
        let mut state = self.state.borrow_mut();
        let status = state.status(alloc_call(kind));
        if parent.is_some_and(|parent| !state.is_live(parent)) {
            return (SqlReturn::InvalidHandle, None);
        }
        if !status.is_success() {
            return (status, None);
        }
        state.next_token += 0x10;
        let token = state.next_token;
        state.live.insert(token, kind);
        *state.allocated.entry(kind).or_default() += 1;
        (status, RawHandle::from_token(token))
    }

    fn free_handle(&mut self, kind: HandleType, handle: RawHandle) -> SqlReturn {
        let mut state = self.state.borrow_mut();
        let status = state.status(free_call(kind));
        if !state.is_live(handle) {
            return SqlReturn::InvalidHandle;
        }
        if status.is_success() {
            state.live.remove(&handle.token());
            *state.freed.entry(kind).or_default() += 1;
        }
        status
    }

    fn set_odbc_version(&mut self, _env: RawHandle, version: OdbcVersion) -> SqlReturn {
        let mut state = self.state.borrow_mut();
        state.odbc_versions.push(version);
        state.status("set_odbc_version")
    }

    fn connect(&mut self, _dbc: RawHandle, _server: &str, _user: &str, _password: &str)
        -> SqlReturn {
        self.state.borrow_mut().status("connect")
    }

    fn driver_connect(
        &mut self,
        _dbc: RawHandle,
        connection_string: &str,
        completion: DriverCompletion,
    ) -> SqlReturn {
        assert_eq!(completion, DriverCompletion::NoPrompt);
        let mut state = self.state.borrow_mut();
        state.connection_strings.push(connection_string.to_string());
        state.status("driver_connect")
    }

    fn disconnect(&mut self, _dbc: RawHandle) -> SqlReturn {
        self.state.borrow_mut().status("disconnect")
    }

    fn diag_rec(
        &mut self,
        kind: HandleType,
        _handle: RawHandle,
        number: i16,
        record: &mut DiagnosticRecord,
    ) -> SqlReturn {
        let mut state = self.state.borrow_mut();
        state.diag_lookups += 1;
        let index = usize::try_from(number - 1).expect("1-based record number");
        match state.diagnostics.get(&kind).and_then(|records| records.get(index)) {
            Some(found) => {
                record.state.clone_from(&found.state);
                record.native_code = found.native_code;
                record.message.clone_from(&found.message);
                SqlReturn::Success
            }
            None => SqlReturn::NoData,
        }
    }

    fn exec_direct(&mut self, stmt: RawHandle, command: &str) -> SqlReturn {
        let mut state = self.state.borrow_mut();
        let status = state.status("exec_direct");
        if !state.is_live(stmt) {
            return SqlReturn::InvalidHandle;
        }
        state.commands.push(command.to_string());
        if status.is_success() || status == SqlReturn::NoData {
            let next = state.results.pop_front().unwrap_or_default();
            state.current = Some(next);
            state.cursor = 0;
        }
        status
    }

    fn num_result_cols(&mut self, _stmt: RawHandle) -> (SqlReturn, i16) {
        let mut state = self.state.borrow_mut();
        let status = state.status("num_result_cols");
        let count = state.current.as_ref().map_or(0, |result| result.columns.len());
        (status, i16::try_from(count).expect("few columns"))
    }

    fn col_attribute(
        &mut self,
        _stmt: RawHandle,
        ordinal: u16,
        field: ColumnField,
    ) -> (SqlReturn, isize) {
        let mut state = self.state.borrow_mut();
        let status = state.status("col_attribute");
        let column = &state.current.as_ref().expect("executed").columns[usize::from(ordinal) - 1];
        let value = match field {
            ColumnField::ConciseType => isize::from(column.sql_type),
            ColumnField::Length => column.length,
        };
        (status, value)
    }

    fn col_name(&mut self, _stmt: RawHandle, ordinal: u16, max_chars: usize)
        -> (SqlReturn, String) {
        let mut state = self.state.borrow_mut();
        let status = state.status("col_name");
        let column = &state.current.as_ref().expect("executed").columns[usize::from(ordinal) - 1];
        (status, column.name.chars().take(max_chars).collect())
    }

    fn bind_col(&mut self, _stmt: RawHandle, ordinal: u16, buffer: &mut ColumnBuffer)
        -> SqlReturn {
        let mut state = self.state.borrow_mut();
        state.bound.push((ordinal, buffer.capacity_chars()));
        state.status("bind_col")
    }

    fn fetch(&mut self, _stmt: RawHandle, columns: &mut [ColumnBinding]) -> SqlReturn {
        let mut state = self.state.borrow_mut();
        let status = state.status("fetch");
        if !status.is_success() {
            return status;
        }
        let cursor = state.cursor;
        let Some(row) = state.current.as_ref().and_then(|result| result.rows.get(cursor)) else {
            return SqlReturn::NoData;
        };
        for (binding, value) in columns.iter_mut().zip(row) {
            binding.buffer_mut().fill(value.as_deref());
        }
        state.cursor += 1;
        status
    }

    fn row_count(&mut self, _stmt: RawHandle) -> (SqlReturn, isize) {
        let mut state = self.state.borrow_mut();
        let status = state.status("row_count");
        let count = state.current.as_ref().map_or(-1, |result| result.row_count);
        (status, count)
    }

    fn close_cursor(&mut self, _stmt: RawHandle) -> SqlReturn {
        let mut state = self.state.borrow_mut();
        state.current = None;
        state.status("close_cursor")
    }

    fn unbind(&mut self, _stmt: RawHandle) -> SqlReturn {
        self.state.borrow_mut().status("unbind")
    }
}
