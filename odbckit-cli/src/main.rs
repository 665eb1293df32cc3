//! `odbckit`: run SQL commands against an ODBC data source.
//!
//! ```bash
//! odbckit --dsn sales --user alice --password secret "SELECT * FROM parts"
//! odbckit --file-dsn /etc/odbc/sales.dsn --user alice --format json \
//!     "UPDATE parts SET qty = 0 WHERE qty < 0" "SELECT id, qty FROM parts"
//! ```
//!
//! Every command is executed in order; its rows are printed followed by the
//! diagnostics the driver left behind. Logging goes to stderr and is
//! controlled through `RUST_LOG`.

use std::io::Write;
use std::path::PathBuf;

use clap::{Args, Parser, ValueEnum};
use eyre::{bail, eyre, Result};
use odbckit_db::config::DEFAULT_MAX_RECORDS;
use odbckit_db::{
    Driver, OdbcVersion, OverflowPolicy, ResultSet, Session, SessionConfig, SessionError,
};
use tracing_subscriber::EnvFilter;

/// Run SQL commands through an ODBC data source.
#[derive(Parser, Debug)]
#[command(name = "odbckit", version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    source: Source,

    /// User name.
    #[arg(short, long, env = "ODBCKIT_USER")]
    user: String,

    /// Password.
    #[arg(short, long, env = "ODBCKIT_PASSWORD", hide_env_values = true, default_value = "")]
    password: String,

    /// How rows are printed.
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,

    /// Diagnostic records kept per command.
    #[arg(long, env = "ODBCKIT_MAX_RECORDS", default_value_t = DEFAULT_MAX_RECORDS)]
    max_records: usize,

    /// What happens once the diagnostic ledger is full.
    #[arg(long, value_enum, default_value_t = Overflow::ReuseLast)]
    overflow: Overflow,

    /// Request ODBC 3.80 behaviour instead of 3.0.
    #[arg(long)]
    odbc_3_80: bool,

    /// SQL commands, executed in order.
    #[arg(required = true, value_name = "COMMAND")]
    commands: Vec<String>,
}

/// Where to connect.
#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct Source {
    /// Registered data source name.
    #[arg(long, env = "ODBCKIT_DSN")]
    dsn: Option<String>,

    /// File data source (`.dsn` file).
    #[arg(long, env = "ODBCKIT_FILE_DSN")]
    file_dsn: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Overflow {
    Reject,
    ReuseLast,
}

impl From<Overflow> for OverflowPolicy {
    fn from(value: Overflow) -> Self {
        match value {
            Overflow::Reject => Self::Reject,
            Overflow::ReuseLast => Self::ReuseLast,
        }
    }
}

impl Cli {
    fn session_config(&self) -> SessionConfig {
        let version = if self.odbc_3_80 {
            OdbcVersion::V3_80
        } else {
            OdbcVersion::V3
        };
        SessionConfig::default()
            .with_max_records(self.max_records)
            .with_overflow_policy(self.overflow.into())
            .with_odbc_version(version)
    }
}

fn init_tracing() {
    // `try_init` also routes `log` records from odbckit-db into tracing.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

/// Turns a failed session call into a report carrying the diagnostics.
#[cfg_attr(not(feature = "native"), allow(dead_code))]
fn failure<D: Driver>(session: &Session<D>, what: &str, err: SessionError) -> eyre::Report {
    eyre!("{what} failed ({err}):\n{}", session.format_diagnostics().trim_end())
}

#[cfg_attr(not(feature = "native"), allow(dead_code))]
fn render(
    format: OutputFormat,
    command: &str,
    result: &ResultSet,
    diagnostics: &str,
) -> Result<String> {
    match format {
        OutputFormat::Table => Ok(format!("{}\n{diagnostics}", result.to_table())),
        OutputFormat::Json => {
            let value = serde_json::json!({
                "command": command,
                "result": result,
                "diagnostics": diagnostics.lines().collect::<Vec<_>>(),
            });
            Ok(format!("{}\n", serde_json::to_string_pretty(&value)?))
        }
    }
}

#[cfg_attr(not(feature = "native"), allow(dead_code))]
fn run_with<D: Driver>(session: &mut Session<D>, cli: &Cli, out: &mut impl Write) -> Result<()> {
    let connected = match (&cli.source.dsn, &cli.source.file_dsn) {
        (Some(dsn), _) => session.connect_by_credentials(dsn, &cli.user, &cli.password),
        (None, Some(path)) => {
            session.connect_by_descriptor(&path.to_string_lossy(), &cli.user, &cli.password)
        }
        (None, None) => bail!("either --dsn or --file-dsn is required"),
    };
    connected.map_err(|err| failure(session, "connect", err))?;
    tracing::info!(state = %session.state(), "connected");

    for command in &cli.commands {
        tracing::debug!(%command, "executing");
        let result = session
            .query(command)
            .map_err(|err| failure(session, "execute", err))?;
        let text = render(cli.format, command, &result, &session.format_diagnostics())?;
        out.write_all(text.as_bytes())?;
    }

    session
        .disconnect()
        .map_err(|err| failure(session, "disconnect", err))
}

#[cfg(feature = "native")]
fn run(cli: &Cli) -> Result<()> {
    let mut session = Session::native(cli.session_config());
    run_with(&mut session, cli, &mut std::io::stdout().lock())
}

#[cfg(not(feature = "native"))]
fn run(cli: &Cli) -> Result<()> {
    tracing::debug!(config = ?cli.session_config(), "no driver available");
    bail!("odbckit was built without ODBC support; rebuild with `--features native`")
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    run(&cli)
}
