//! Owner of the environment → connection → statement handle chain.
//!
//! Handles are allocated lazily, parent first, and released in the reverse
//! order. Every public operation starts by resetting the session's
//! [`Ledger`], so the ledger always describes the latest operation only.
//!
//! A failed release keeps the handle: the next [`Session::disconnect`]
//! tries to free it again instead of leaking it or freeing a child's parent
//! early. Dropping a session always runs the teardown.

mod execute;

use zeroize::Zeroizing;

use crate::binding::ColumnBinding;
use crate::config::SessionConfig;
use crate::diagnostics::Ledger;
use crate::driver::{Driver, DriverCompletion, HandleType, RawHandle, SqlReturn};
use crate::error::{Operation, SessionError, SessionResult};

pub use execute::ExecSummary;

/// Which levels of the handle chain are allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum SessionState {
    /// Nothing allocated.
    Unallocated,
    /// Environment allocated.
    EnvReady,
    /// Environment and connection allocated.
    ConnReady,
    /// Statement allocated; commands can run.
    StmtReady,
    /// A command's result set is still open on the statement.
    ///
    /// Only observable after a row callback panicked mid-fetch; the next
    /// command or [`Session::disconnect`] releases the result set.
    Executing,
}

/// A database session over one [`Driver`].
///
/// Not `Clone`: the session is the single owner of its handles. It is also
/// neither `Send` nor `Sync`; use one session per thread.
pub struct Session<D: Driver> {
    driver: D,
    config: SessionConfig,
    ledger: Ledger,
    env: Option<RawHandle>,
    version_set: bool,
    dbc: Option<RawHandle>,
    connected: bool,
    stmt: Option<RawHandle>,
    executing: bool,
    /// Buffers bound to the current result set.
    bindings: Vec<ColumnBinding>,
    /// Buffers the driver may still point at because unbinding failed.
    retained: Vec<ColumnBinding>,
}

impl<D: Driver> Session<D> {
    /// Creates an unconnected session with the default configuration.
    #[must_use]
    pub fn new(driver: D) -> Self {
        Self::with_config(driver, SessionConfig::default())
    }

    /// Creates an unconnected session.
    #[must_use]
    pub fn with_config(driver: D, config: SessionConfig) -> Self {
        let ledger = Ledger::new(config.max_records, config.overflow_policy);
        Self {
            driver,
            config,
            ledger,
            env: None,
            version_set: false,
            dbc: None,
            connected: false,
            stmt: None,
            executing: false,
            bindings: Vec::new(),
            retained: Vec::new(),
        }
    }

    /// The session's configuration.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The underlying driver.
    #[must_use]
    pub const fn driver(&self) -> &D {
        &self.driver
    }

    /// Diagnostics left by the latest operation.
    #[must_use]
    pub const fn diagnostics(&self) -> &Ledger {
        &self.ledger
    }

    /// The latest operation's diagnostics, one formatted line per record.
    #[must_use]
    pub fn format_diagnostics(&self) -> String {
        self.ledger.format()
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        if self.executing {
            SessionState::Executing
        } else if self.stmt.is_some() {
            SessionState::StmtReady
        } else if self.dbc.is_some() {
            SessionState::ConnReady
        } else if self.env.is_some() {
            SessionState::EnvReady
        } else {
            SessionState::Unallocated
        }
    }

    /// `true` while the connection handle is connected to a data source.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.connected
    }

    /// Connects to the registered data source `server`.
    ///
    /// Levels that already exist are reused, so calling this again on a
    /// connected session only makes sure a statement handle exists.
    ///
    /// # Errors
    ///
    /// Returns the failure class; details are in [`diagnostics`](Self::diagnostics).
    pub fn connect_by_credentials(
        &mut self,
        server: &str,
        user: &str,
        password: &str,
    ) -> SessionResult<()> {
        self.ledger.reset();
        let dbc = self.init()?;
        if !self.connected {
            let status = self.driver.connect(dbc, server, user, password);
            self.check(HandleType::Dbc, dbc, status, Operation::Connect)?;
            self.connected = true;
            log::debug!("connected to data source {server} as {user}");
        }
        self.alloc_statement(dbc)
    }

    /// Connects through the file data source `descriptor`, without letting
    /// the driver prompt.
    ///
    /// # Errors
    ///
    /// Returns the failure class; details are in [`diagnostics`](Self::diagnostics).
    pub fn connect_by_descriptor(
        &mut self,
        descriptor: &str,
        user: &str,
        password: &str,
    ) -> SessionResult<()> {
        self.ledger.reset();
        let dbc = self.init()?;
        if !self.connected {
            let connection_string =
                Zeroizing::new(format!("FILEDSN={descriptor}; UID={user}; PWD={password}"));
            let status =
                self.driver
                    .driver_connect(dbc, &connection_string, DriverCompletion::NoPrompt);
            self.check(HandleType::Dbc, dbc, status, Operation::DriverConnect)?;
            self.connected = true;
            log::debug!("connected through file data source {descriptor} as {user}");
        }
        self.alloc_statement(dbc)
    }

    /// Releases the statement, the connection and the environment, in that
    /// order. Missing levels are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Release`] for the first level that could not
    /// be released. That handle and its parents stay allocated.
    pub fn disconnect(&mut self) -> SessionResult<()> {
        self.ledger.reset();
        self.release_statement()?;
        self.release_connection()?;
        self.release_environment()
    }

    /// Routes a driver status through the ledger.
    ///
    /// Anything but plain success (or the end of data) has its diagnostics
    /// collected. Errors, invalid handles and statuses the session cannot
    /// act on become a [`SessionError`].
    fn check(
        &mut self,
        kind: HandleType,
        handle: RawHandle,
        status: SqlReturn,
        operation: Operation,
    ) -> SessionResult<SqlReturn> {
        if !matches!(status, SqlReturn::Success | SqlReturn::NoData) {
            self.ledger.collect(&mut self.driver, kind, handle, status);
        }
        match status {
            SqlReturn::Success | SqlReturn::SuccessWithInfo | SqlReturn::NoData => Ok(status),
            SqlReturn::InvalidHandle => Err(SessionError::InvalidHandle(kind)),
            SqlReturn::Error | SqlReturn::StillExecuting | SqlReturn::NeedData => {
                Err(SessionError::Driver(operation))
            }
        }
    }

    /// Makes sure the environment (with its ODBC version) and the connection
    /// handle exist. Returns the connection handle.
    fn init(&mut self) -> SessionResult<RawHandle> {
        let env = match self.env {
            Some(env) => env,
            None => self.alloc_environment()?,
        };
        if !self.version_set {
            let status = self.driver.set_odbc_version(env, self.config.odbc_version);
            self.check(HandleType::Env, env, status, Operation::SetOdbcVersion)?;
            self.version_set = true;
        }
        if let Some(dbc) = self.dbc {
            return Ok(dbc);
        }
        let dbc = self.allocate(HandleType::Dbc, HandleType::Env, env)?;
        self.dbc = Some(dbc);
        Ok(dbc)
    }

    fn alloc_environment(&mut self) -> SessionResult<RawHandle> {
        let (status, handle) = self.driver.alloc_handle(HandleType::Env, None);
        match handle {
            Some(env) if status.is_success() => {
                log::debug!("allocated environment handle {env:?}");
                self.env = Some(env);
                Ok(env)
            }
            _ => {
                self.ledger.record_user_error("Could not allocate environment handle");
                Err(SessionError::Allocation(HandleType::Env))
            }
        }
    }

    fn alloc_statement(&mut self, dbc: RawHandle) -> SessionResult<()> {
        if self.stmt.is_none() {
            let stmt = self.allocate(HandleType::Stmt, HandleType::Dbc, dbc)?;
            self.stmt = Some(stmt);
        }
        Ok(())
    }

    /// Allocates a `kind` handle under `parent`. Driver diagnostics are read
    /// from the parent, the only handle that exists yet.
    fn allocate(
        &mut self,
        kind: HandleType,
        parent_kind: HandleType,
        parent: RawHandle,
    ) -> SessionResult<RawHandle> {
        let (status, handle) = self.driver.alloc_handle(kind, Some(parent));
        if !matches!(status, SqlReturn::Success | SqlReturn::NoData) {
            self.ledger.collect(&mut self.driver, parent_kind, parent, status);
        }
        match handle {
            Some(handle) if status.is_success() => {
                log::debug!("allocated {kind} handle {handle:?}");
                Ok(handle)
            }
            _ => {
                self.ledger
                    .record_user_error(&format!("Could not allocate {kind} handle"));
                Err(SessionError::Allocation(kind))
            }
        }
    }

    fn free(&mut self, kind: HandleType, handle: RawHandle, message: &str) -> SessionResult<()> {
        let status = self.driver.free_handle(kind, handle);
        if status.is_success() {
            log::debug!("released {kind} handle {handle:?}");
            return Ok(());
        }
        self.ledger.collect(&mut self.driver, kind, handle, status);
        self.ledger.record_user_error(message);
        Err(SessionError::Release(kind))
    }

    fn release_statement(&mut self) -> SessionResult<()> {
        let Some(stmt) = self.stmt else {
            return Ok(());
        };
        self.free(HandleType::Stmt, stmt, "Could not free up stmt handle")?;
        self.stmt = None;
        self.executing = false;
        self.bindings.clear();
        self.retained.clear();
        Ok(())
    }

    fn release_connection(&mut self) -> SessionResult<()> {
        let Some(dbc) = self.dbc else {
            return Ok(());
        };
        if self.connected {
            let status = self.driver.disconnect(dbc);
            if !status.is_success() {
                self.ledger.collect(&mut self.driver, HandleType::Dbc, dbc, status);
                self.ledger.record_user_error("Could not disconnect db handle");
                return Err(SessionError::Release(HandleType::Dbc));
            }
            self.connected = false;
        }
        self.free(HandleType::Dbc, dbc, "Could not deallocate db handle")?;
        self.dbc = None;
        Ok(())
    }

    fn release_environment(&mut self) -> SessionResult<()> {
        let Some(env) = self.env else {
            return Ok(());
        };
        self.free(HandleType::Env, env, "Could not free up env handle")?;
        self.env = None;
        self.version_set = false;
        Ok(())
    }
}

#[cfg(feature = "native")]
impl Session<crate::ffi::NativeDriver> {
    /// Creates a session over the system ODBC driver manager.
    #[must_use]
    pub fn native(config: SessionConfig) -> Self {
        Self::with_config(crate::ffi::NativeDriver, config)
    }
}

impl<D: Driver> std::fmt::Debug for Session<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state())
            .field("connected", &self.connected)
            .finish_non_exhaustive()
    }
}

impl<D: Driver> Drop for Session<D> {
    fn drop(&mut self) {
        if let Err(err) = self.disconnect() {
            log::warn!(
                "session teardown incomplete ({err}): {}",
                self.ledger.format().trim_end()
            );
        }
    }
}
