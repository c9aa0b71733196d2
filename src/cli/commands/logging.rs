//! `-v/--verbose` and `ACCOUNTS_LOG_LEVEL`.

use clap::{builder::ValueParser, Arg, ArgAction, Command};
use tracing::Level;

pub const ARG_VERBOSITY: &str = "verbosity";

/// Level names accepted by `ACCOUNTS_LOG_LEVEL`, indexed by counted verbosity.
const LEVEL_NAMES: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Accepts a level name (any case) or its index in [`LEVEL_NAMES`].
///
/// # Errors
/// Returns the accepted values when `level` is neither.
pub fn parse_log_level(level: &str) -> Result<u8, String> {
    let level = level.trim();
    let position = match level.parse::<usize>() {
        Ok(index) => (index < LEVEL_NAMES.len()).then_some(index),
        Err(_) => LEVEL_NAMES
            .iter()
            .position(|name| name.eq_ignore_ascii_case(level)),
    };
    position
        .and_then(|index| u8::try_from(index).ok())
        .ok_or_else(|| {
            format!(
                "invalid log level '{level}', expected one of {}",
                LEVEL_NAMES.join(", ")
            )
        })
}

/// Counted verbosity to the subscriber's default level. Zero keeps the
/// filter's own default.
#[must_use]
pub const fn tracing_level(verbosity: u8) -> Option<Level> {
    match verbosity {
        0 => None,
        1 => Some(Level::WARN),
        2 => Some(Level::INFO),
        3 => Some(Level::DEBUG),
        _ => Some(Level::TRACE),
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command.arg(
        Arg::new(ARG_VERBOSITY)
            .short('v')
            .long("verbose")
            .help("Increase log output, repeat for more (-vv info, -vvvv trace)")
            .long_help(
                "Increase log output. Each -v raises the level one step from error to trace. \
                 ACCOUNTS_LOG_LEVEL accepts the level name instead.",
            )
            .env("ACCOUNTS_LOG_LEVEL")
            .global(true)
            .action(ArgAction::Count)
            .value_parser(ValueParser::from(parse_log_level)),
    )
}
