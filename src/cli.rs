//! Command-line interface for distributable-session.
//!
//! Uses lexopt for minimal binary size overhead.

use std::ffi::OsString;
use std::net::IpAddr;
use std::path::PathBuf;

use lexopt::ValueExt;

/// Command-line arguments.
///
/// Unset options leave the environment and config file values in place.
#[derive(Debug, Clone, Default)]
pub struct Args {
    /// Host address to bind to.
    pub host: Option<IpAddr>,
    /// Port to listen on.
    pub port: Option<u16>,
    /// Path to configuration file.
    pub config: Option<PathBuf>,
    /// Deployment name.
    pub deployment: Option<String>,
    /// Maximum active sessions; negative means unbounded.
    pub max_sessions: Option<i64>,
    /// Default session timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Disable session statistics.
    pub no_statistics: bool,
    /// Log level (error, warn, info, debug, trace).
    pub log_level: Option<String>,
    /// Show version and exit.
    pub version: bool,
    /// Show help and exit.
    pub help: bool,
}

/// Parse command-line arguments.
pub fn parse_args() -> Result<Args, ArgsError> {
    parse_args_from(std::env::args_os())
}

/// Parse arguments from an iterator (for testing).
pub fn parse_args_from<I>(args: I) -> Result<Args, ArgsError>
where
    I: IntoIterator<Item = OsString>,
{
    use lexopt::prelude::*;

    let mut result = Args::default();
    let mut parser = lexopt::Parser::from_iter(args);

    while let Some(arg) = parser.next()? {
        match arg {
            Short('h') | Long("help") => {
                result.help = true;
            }
            Short('V') | Long("version") => {
                result.version = true;
            }
            Short('H') | Long("host") => {
                result.host = Some(parse_value(&mut parser, "host")?);
            }
            Short('p') | Long("port") => {
                result.port = Some(parse_value(&mut parser, "port")?);
            }
            Short('c') | Long("config") => {
                result.config = Some(parser.value()?.parse()?);
            }
            Short('d') | Long("deployment") => {
                result.deployment = Some(parser.value()?.parse()?);
            }
            Short('m') | Long("max-sessions") => {
                result.max_sessions = Some(parse_value(&mut parser, "max-sessions")?);
            }
            Short('t') | Long("timeout") => {
                result.timeout_secs = Some(parse_value(&mut parser, "timeout")?);
            }
            Long("no-statistics") => {
                result.no_statistics = true;
            }
            Short('l') | Long("log-level") => {
                result.log_level = Some(parser.value()?.parse()?);
            }
            Value(val) => {
                return Err(ArgsError::UnexpectedArgument(val.to_string_lossy().into()));
            }
            _ => return Err(arg.unexpected().into()),
        }
    }

    Ok(result)
}

fn parse_value<T: std::str::FromStr>(
    parser: &mut lexopt::Parser,
    name: &'static str,
) -> Result<T, ArgsError> {
    let value: String = parser.value()?.parse()?;
    value
        .parse()
        .map_err(|_| ArgsError::InvalidValue(name, value))
}

/// Print help message.
pub fn print_help() {
    let version = env!("CARGO_PKG_VERSION");
    println!(
        r#"distributable-session {version}
Distributable web-session manager with request-scoped batches

USAGE:
    distributable-session [OPTIONS]

OPTIONS:
    -H, --host <ADDR>          Host address to bind [default: 127.0.0.1]
    -p, --port <PORT>          Port to listen on [default: 3000]
    -c, --config <FILE>        Path to configuration file (JSON)
    -d, --deployment <NAME>    Deployment name [default: ROOT]
    -m, --max-sessions <N>     Maximum active sessions (negative = unbounded)
    -t, --timeout <SECS>       Default session timeout [default: 1800]
    -l, --log-level <LVL>      Log level (error, warn, info, debug, trace)
        --no-statistics        Disable session statistics
    -h, --help                 Print help
    -V, --version              Print version

ENVIRONMENT VARIABLES:
    DIST_SESSION_HOST                   Host address (overrides config)
    DIST_SESSION_PORT                   Port number (overrides config)
    DIST_SESSION_MAX_ACTIVE             Maximum active sessions (overrides config)
    DIST_SESSION_DEFAULT_TIMEOUT        Default timeout in seconds (overrides config)
    DIST_SESSION_LOG_LEVEL              Log level (overrides config)
    DIST_SESSION_ALLOW_ORPHAN_SESSION   Serve sessions orphaned by departed nodes
    RUST_LOG                            Alternative log level setting

EXAMPLES:
    # Start with defaults (localhost:3000, unbounded)
    distributable-session

    # Cap the deployment at 10000 sessions
    distributable-session -d shop -m 10000

    # Start with config file
    distributable-session -c /etc/distributable-session/config.json
"#
    );
}

/// Print version.
pub fn print_version() {
    println!("distributable-session {}", env!("CARGO_PKG_VERSION"));
}

/// Argument parsing errors.
#[derive(Debug)]
pub enum ArgsError {
    /// Lexopt parsing error.
    Lexopt(lexopt::Error),
    /// Invalid argument value.
    InvalidValue(&'static str, String),
    /// Unexpected positional argument.
    UnexpectedArgument(String),
}

impl std::fmt::Display for ArgsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lexopt(e) => write!(f, "{}", e),
            Self::InvalidValue(name, value) => {
                write!(f, "invalid value for --{}: '{}'", name, value)
            }
            Self::UnexpectedArgument(arg) => {
                write!(f, "unexpected argument: '{}'", arg)
            }
        }
    }
}

impl std::error::Error for ArgsError {}

impl From<lexopt::Error> for ArgsError {
    fn from(e: lexopt::Error) -> Self {
        Self::Lexopt(e)
    }
}
