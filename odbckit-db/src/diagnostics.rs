//! Bounded ledger of diagnostic records produced by one session operation.
//!
//! # Enumeration discipline
//!
//! The driver does not say up front how many diagnostic records it holds.
//! [`Ledger::collect`] therefore reserves a slot, asks the driver to fill it,
//! and repeats until the driver answers `SQL_NO_DATA`. The final reservation
//! was never written, so it is released again. Skipping the release reports
//! a phantom empty record; releasing twice drops the last real one.

use std::fmt::{self, Write as _};

use serde::{Deserialize, Serialize};

use crate::driver::{Driver, HandleType, RawHandle, SqlReturn};

/// Native code carried by records the session raises itself.
pub const USER_ERROR_CODE: i32 = -1;

/// SQLSTATE of the record appended after a successful execution.
pub const EXECUTED_STATE: &str = "00000";

/// Message of the record appended after a successful execution.
pub const EXECUTED_MESSAGE: &str = "Executed Successfully";

/// One condition reported by the driver (or raised by the session).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiagnosticRecord {
    /// Five character SQLSTATE; empty for session-raised records.
    pub state: String,
    /// Driver specific native error code.
    pub native_code: i32,
    /// Diagnostic message text.
    pub message: String,
    /// Rows affected or returned; only set on execution records.
    pub row_count: Option<isize>,
}

impl DiagnosticRecord {
    fn clear(&mut self) {
        self.state.clear();
        self.native_code = 0;
        self.message.clear();
        self.row_count = None;
    }
}

impl fmt::Display for DiagnosticRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ({}) {}", self.state, self.native_code, self.message)?;
        match self.row_count {
            Some(rows) if rows != 0 => write!(f, " - ({rows} rows)"),
            _ => Ok(()),
        }
    }
}

/// What [`Ledger::acquire_slot`] does once every slot is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, strum::Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum OverflowPolicy {
    /// Refuse the reservation; later records are not stored.
    Reject,
    /// Hand out the last slot again so the newest record overwrites it.
    #[default]
    ReuseLast,
}

#[derive(Debug)]
enum Reservation {
    Fresh,
    Displaced(DiagnosticRecord),
}

/// Fixed capacity store of [`DiagnosticRecord`]s.
///
/// Exhaustion is never silent: whichever [`OverflowPolicy`] applies, the
/// ledger raises its overflow flag.
#[derive(Debug)]
pub struct Ledger {
    slots: Box<[DiagnosticRecord]>,
    len: usize,
    policy: OverflowPolicy,
    overflowed: bool,
    reservation: Option<Reservation>,
}

impl Ledger {
    /// Creates a ledger with room for `max_records` (at least one).
    #[must_use]
    pub fn new(max_records: usize, policy: OverflowPolicy) -> Self {
        let capacity = max_records.max(1);
        Self {
            slots: vec![DiagnosticRecord::default(); capacity].into_boxed_slice(),
            len: 0,
            policy,
            overflowed: false,
            reservation: None,
        }
    }

    /// Forgets every record and clears the overflow flag.
    pub fn reset(&mut self) {
        self.len = 0;
        self.overflowed = false;
        self.reservation = None;
    }

    /// Maximum number of records held.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of records currently held.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// `true` when no records are held.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// `true` once a reservation hit a full ledger since the last reset.
    #[must_use]
    pub const fn is_overflowed(&self) -> bool {
        self.overflowed
    }

    /// The active overflow policy.
    #[must_use]
    pub const fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// Records in the order they were produced.
    #[must_use]
    pub fn records(&self) -> &[DiagnosticRecord] {
        &self.slots[..self.len]
    }

    /// Iterates over the held records.
    pub fn iter(&self) -> std::slice::Iter<'_, DiagnosticRecord> {
        self.records().iter()
    }

    /// Reserves the next writable record, cleared.
    ///
    /// Returns `None` when the ledger is full and the policy is
    /// [`OverflowPolicy::Reject`].
    pub fn acquire_slot(&mut self) -> Option<&mut DiagnosticRecord> {
        let index = if self.len < self.slots.len() {
            self.len += 1;
            self.reservation = Some(Reservation::Fresh);
            self.len - 1
        } else {
            self.overflowed = true;
            match self.policy {
                OverflowPolicy::Reject => {
                    self.reservation = None;
                    return None;
                }
                OverflowPolicy::ReuseLast => {
                    let last = self.len - 1;
                    self.reservation =
                        Some(Reservation::Displaced(self.slots[last].clone()));
                    last
                }
            }
        };
        let slot = &mut self.slots[index];
        slot.clear();
        Some(slot)
    }

    /// Gives back the latest reservation when nothing was written into it.
    ///
    /// Returns `false` if there was no outstanding reservation.
    pub fn release_unused_slot(&mut self) -> bool {
        match self.reservation.take() {
            Some(Reservation::Fresh) => {
                self.len -= 1;
                true
            }
            Some(Reservation::Displaced(previous)) => {
                self.slots[self.len - 1] = previous;
                true
            }
            None => false,
        }
    }

    fn push(
        &mut self,
        state: &str,
        native_code: i32,
        message: &str,
        row_count: Option<isize>,
    ) -> bool {
        let Some(slot) = self.acquire_slot() else {
            return false;
        };
        slot.state.push_str(state);
        slot.native_code = native_code;
        slot.message.push_str(message);
        slot.row_count = row_count;
        self.reservation = None;
        true
    }

    /// Adds a record for a failure detected by the session itself.
    ///
    /// Returns `false` if the ledger refused the record.
    pub fn record_user_error(&mut self, message: &str) -> bool {
        self.push("", USER_ERROR_CODE, message, None)
    }

    /// Adds the "Executed Successfully" record carrying `row_count`.
    pub fn record_execution(&mut self, row_count: isize) -> bool {
        self.push(EXECUTED_STATE, 0, EXECUTED_MESSAGE, Some(row_count))
    }

    /// Reads every diagnostic record the driver holds for `handle`.
    ///
    /// An invalid handle cannot be queried, so `SQL_INVALID_HANDLE` is
    /// recorded as a single synthetic record instead.
    pub fn collect<D: Driver + ?Sized>(
        &mut self,
        driver: &mut D,
        kind: HandleType,
        handle: RawHandle,
        status: SqlReturn,
    ) {
        if status == SqlReturn::InvalidHandle {
            self.record_user_error("Invalid Handle");
            return;
        }

        let mut number: i16 = 0;
        loop {
            let Some(slot) = self.acquire_slot() else {
                log::debug!("diagnostic ledger full, stopped reading {kind} records");
                return;
            };
            number += 1;
            if !driver.diag_rec(kind, handle, number, slot).is_success() {
                break;
            }
            self.reservation = None;
            if number == i16::MAX {
                return;
            }
        }
        self.release_unused_slot();
    }

    /// Renders every record as `"{state}: ({code}) {message}[ - ({n} rows)]\n"`.
    #[must_use]
    pub fn format(&self) -> String {
        let mut out = String::new();
        for record in self.records() {
            let _ = writeln!(out, "{record}");
        }
        out
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_MAX_RECORDS, OverflowPolicy::default())
    }
}

impl<'a> IntoIterator for &'a Ledger {
    type Item = &'a DiagnosticRecord;
    type IntoIter = std::slice::Iter<'a, DiagnosticRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
