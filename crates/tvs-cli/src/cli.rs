//! CLI argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use colorchoice_clap::Color;

#[derive(Parser)]
#[command(
    name = "tvstudy",
    version,
    about = "Import, inspect and store broadcast interference study scenarios",
    long_about = "Import broadcast interference study scenarios from XML.\n\n\
                  By-reference records are resolved against external station data\n\
                  in a SQLite database, and imported studies can be saved to one."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Adjust log verbosity (-v for info, -vv for debug, -q for errors only).
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// Control ANSI color output (auto, always, never).
    #[command(flatten)]
    pub color: Color,

    /// Explicit log level (overrides -v/-q flags).
    #[arg(long = "log-level", value_enum, global = true)]
    pub log_level: Option<LogLevelArg>,

    /// Log output format (pretty for human, json for machine parsing).
    #[arg(long = "log-format", value_enum, default_value = "pretty", global = true)]
    pub log_format: LogFormatArg,

    /// Write logs to a file instead of stderr.
    #[arg(long = "log-file", value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Import every scenario in a study document.
    Import(ImportArgs),

    /// List the unique sources in a source collection document.
    List(ListArgs),

    /// List the external station datasets in a database.
    ExtDbs(ExtDbsArgs),

    /// Clear a station data lock left behind by a session that died.
    Unlock(UnlockArgs),
}

#[derive(Parser)]
pub struct ImportArgs {
    /// Study XML document.
    #[arg(value_name = "XML")]
    pub xml: PathBuf,

    /// Import settings (default: ./tvstudy.toml if present).
    #[arg(long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Save the imported study to this SQLite database.
    #[arg(long = "save", value_name = "DB")]
    pub save: Option<PathBuf>,

    /// Print the summary as JSON.
    #[arg(long = "json")]
    pub json: bool,
}

#[derive(Parser)]
pub struct ListArgs {
    /// Source collection XML document.
    #[arg(value_name = "XML")]
    pub xml: PathBuf,

    /// Import settings (default: ./tvstudy.toml if present).
    #[arg(long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print the sources as JSON.
    #[arg(long = "json")]
    pub json: bool,
}

#[derive(Parser)]
pub struct ExtDbsArgs {
    /// SQLite database holding the station data.
    #[arg(value_name = "DB")]
    pub db: PathBuf,
}

#[derive(Parser)]
pub struct UnlockArgs {
    /// SQLite database holding the station data.
    #[arg(value_name = "DB")]
    pub db: PathBuf,

    /// Key of the locked dataset.
    #[arg(value_name = "KEY")]
    pub key: i32,
}

/// CLI log level choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// CLI log format choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}
