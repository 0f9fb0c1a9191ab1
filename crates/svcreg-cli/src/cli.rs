use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "svcreg",
    about = "Inspect and initialise svcreg store files",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Store file; overrides the path in --config
    #[arg(short, long, global = true)]
    pub path: Option<PathBuf>,

    /// TOML store configuration
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// List record types with their record counts
    Types,
    /// Count the records of a type
    Count(TypeArgs),
    /// List the record keys of a type
    Keys(TypeArgs),
    /// Print stored fields of records, decoded by tag
    Dump(DumpArgs),
    /// Create the built-in namespaces
    Init,
}

#[derive(Args)]
pub struct TypeArgs {
    pub typ: String,
}

#[derive(Args)]
pub struct DumpArgs {
    pub typ: String,
    /// Keys to dump; all records when omitted
    pub keys: Vec<String>,
}
