//! Owned snapshot of a command's result.

use serde::Serialize;

use crate::binding::{ColumnInfo, Row};
use crate::driver::Driver;
use crate::error::SessionResult;
use crate::session::Session;

/// Every row of a command, copied out of the bound buffers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResultSet {
    /// Result columns in ordinal order.
    pub columns: Vec<ColumnInfo>,
    /// Row values; `None` is SQL NULL, distinct from empty text.
    pub rows: Vec<Vec<Option<String>>>,
    /// Row count reported by the driver; `-1` if unknown.
    pub row_count: isize,
}

impl ResultSet {
    /// Position of the column called `name`, ignoring ASCII case.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|column| column.name.eq_ignore_ascii_case(name))
    }

    /// Renders the rows as a fixed-width text table.
    ///
    /// Each column is as wide as its display size; longer values are cut.
    /// Character columns are left-justified, everything else right-justified.
    #[must_use]
    pub fn to_table(&self) -> String {
        let mut out = String::new();
        let header: Vec<String> = self
            .columns
            .iter()
            .map(|column| pad(&column.name, column, true))
            .collect();
        out.push_str(header.join(" ").trim_end());
        out.push('\n');

        let rule: Vec<String> = self
            .columns
            .iter()
            .map(|column| "-".repeat(column.display_size))
            .collect();
        out.push_str(&rule.join(" "));
        out.push('\n');

        for row in &self.rows {
            let cells: Vec<String> = self
                .columns
                .iter()
                .zip(row)
                .map(|(column, value)| {
                    let left = column.data_type.is_character();
                    pad(value.as_deref().unwrap_or("<NULL>"), column, left)
                })
                .collect();
            out.push_str(cells.join(" ").trim_end());
            out.push('\n');
        }
        out
    }
}

fn pad(text: &str, column: &ColumnInfo, left: bool) -> String {
    let width = column.display_size;
    let cut: String = text.chars().take(width).collect();
    if left {
        format!("{cut:<width$}")
    } else {
        format!("{cut:>width$}")
    }
}

impl<D: Driver> Session<D> {
    /// Executes `command` and collects every row.
    ///
    /// # Errors
    ///
    /// See [`Session::execute`].
    pub fn query(&mut self, command: &str) -> SessionResult<ResultSet> {
        let mut rows = Vec::new();
        let summary = self.execute(command, |row: Row<'_>| rows.push(row.to_values()))?;
        Ok(ResultSet {
            columns: summary.columns,
            rows,
            row_count: summary.row_count,
        })
    }
}
