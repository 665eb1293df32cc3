//! Direct execution and the bind/fetch loop.

use serde::Serialize;

use super::Session;
use crate::binding::{ColumnBinder, ColumnBinding, ColumnInfo, Row, SqlDataType, TextBinder};
use crate::driver::{ColumnField, Driver, HandleType, RawHandle, SqlReturn};
use crate::error::{Operation, SessionError, SessionResult};

/// Outcome of a successfully executed command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecSummary {
    /// Result columns; empty for commands that return no rows.
    pub columns: Vec<ColumnInfo>,
    /// Rows handed to the row callback.
    pub rows_fetched: usize,
    /// Affected or returned rows as reported by the driver; `-1` if unknown.
    pub row_count: isize,
}

impl<D: Driver> Session<D> {
    /// Executes `command` and fetches every column as text.
    ///
    /// `on_row` sees each row while it is in the bound buffers.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotConnected`] without a statement handle, otherwise
    /// the driver failure class. Details are in the diagnostics.
    pub fn execute<F>(&mut self, command: &str, on_row: F) -> SessionResult<ExecSummary>
    where
        F: FnMut(Row<'_>),
    {
        let binder = TextBinder::new(self.config.max_bind_chars);
        self.execute_with(&binder, command, on_row)
    }

    /// Executes `command`, letting `binder` allocate the column buffers.
    ///
    /// The cursor is closed and the columns unbound on every exit path, so
    /// the statement handle is ready for the next command. If unbinding
    /// fails the buffers are kept alive until the statement is unbound or
    /// freed. A result set left open by a panicking `on_row` is released
    /// before `command` runs.
    ///
    /// # Errors
    ///
    /// See [`execute`](Self::execute).
    pub fn execute_with<B, F>(
        &mut self,
        binder: &B,
        command: &str,
        mut on_row: F,
    ) -> SessionResult<ExecSummary>
    where
        B: ColumnBinder + ?Sized,
        F: FnMut(Row<'_>),
    {
        self.ledger.reset();
        let Some(stmt) = self.stmt else {
            self.ledger.record_user_error("Statement handle not allocated");
            return Err(SessionError::NotConnected);
        };
        if self.executing {
            log::warn!("previous command was interrupted, releasing its result set");
            self.release_result_set(stmt)?;
        }

        self.executing = true;
        let outcome = self.run(stmt, binder, command, &mut on_row);
        let released = if let Err(SessionError::InvalidHandle(_)) = outcome {
            // Nothing can be released through the handle; keep the buffers.
            let stale = std::mem::take(&mut self.bindings);
            self.retained.extend(stale);
            Ok(())
        } else {
            self.release_result_set(stmt)
        };
        self.executing = false;

        let summary = outcome?;
        released?;
        Ok(summary)
    }

    fn run<B, F>(
        &mut self,
        stmt: RawHandle,
        binder: &B,
        command: &str,
        on_row: &mut F,
    ) -> SessionResult<ExecSummary>
    where
        B: ColumnBinder + ?Sized,
        F: FnMut(Row<'_>),
    {
        log::debug!("executing command ({} chars)", command.chars().count());
        let status = self.driver.exec_direct(stmt, command);
        self.check(HandleType::Stmt, stmt, status, Operation::ExecDirect)?;

        let (status, count) = self.driver.num_result_cols(stmt);
        self.check(HandleType::Stmt, stmt, status, Operation::NumResultCols)?;

        for ordinal in 1..=count.max(0).unsigned_abs() {
            let info = self.describe_column(stmt, ordinal)?;
            let mut binding = ColumnBinding::new(info.clone(), binder.allocate(&info));
            let status = self.driver.bind_col(stmt, ordinal, binding.buffer_mut());
            // Moving the binding keeps its heap buffers in place.
            self.bindings.push(binding);
            self.check(HandleType::Stmt, stmt, status, Operation::BindCol)?;
        }

        let mut rows_fetched = 0;
        if !self.bindings.is_empty() {
            loop {
                let status = self.driver.fetch(stmt, self.bindings.as_mut_slice());
                if self.check(HandleType::Stmt, stmt, status, Operation::Fetch)?
                    == SqlReturn::NoData
                {
                    break;
                }
                rows_fetched += 1;
                on_row(Row::new(self.bindings.as_slice()));
            }
        }

        let (status, row_count) = self.driver.row_count(stmt);
        self.check(HandleType::Stmt, stmt, status, Operation::RowCount)?;
        self.ledger.record_execution(row_count);
        log::debug!(
            "executed: {} columns, {rows_fetched} rows fetched, row count {row_count}",
            self.bindings.len()
        );

        Ok(ExecSummary {
            columns: self.bindings.iter().map(|binding| binding.info().clone()).collect(),
            rows_fetched,
            row_count,
        })
    }

    fn describe_column(&mut self, stmt: RawHandle, ordinal: u16) -> SessionResult<ColumnInfo> {
        let (status, concise_type) =
            self.driver.col_attribute(stmt, ordinal, ColumnField::ConciseType);
        self.check(HandleType::Stmt, stmt, status, Operation::ColAttribute)?;

        let (status, length) = self.driver.col_attribute(stmt, ordinal, ColumnField::Length);
        self.check(HandleType::Stmt, stmt, status, Operation::ColAttribute)?;

        let max_name = self.config.max_display_width;
        let (status, mut name) = self.driver.col_name(stmt, ordinal, max_name);
        self.check(HandleType::Stmt, stmt, status, Operation::ColAttribute)?;
        if let Some((cut, _)) = name.char_indices().nth(max_name) {
            name.truncate(cut);
        }

        let declared_size = usize::try_from(length).unwrap_or(0);
        let display_size = self
            .config
            .display_width(declared_size, name.chars().count());
        Ok(ColumnInfo {
            ordinal,
            name,
            data_type: i16::try_from(concise_type).map_or(SqlDataType::UNKNOWN, SqlDataType),
            declared_size,
            display_size,
        })
    }

    /// Closes the cursor and unbinds the columns.
    ///
    /// If unbinding fails the buffers move to `retained`, where they stay
    /// until a later unbind succeeds or the statement is freed.
    fn release_result_set(&mut self, stmt: RawHandle) -> SessionResult<()> {
        let status = self.driver.close_cursor(stmt);
        let closed = self
            .check(HandleType::Stmt, stmt, status, Operation::CloseCursor)
            .map(drop);

        if !self.bindings.is_empty() || !self.retained.is_empty() {
            let status = self.driver.unbind(stmt);
            let stale = std::mem::take(&mut self.bindings);
            if let Err(err) = self.check(HandleType::Stmt, stmt, status, Operation::Unbind) {
                log::warn!("could not unbind {} columns, keeping their buffers", stale.len());
                self.retained.extend(stale);
                return Err(err);
            }
            self.retained.clear();
        }
        closed
    }
}
