use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "stow",
    about = "Stow: object-document mapping over key-value stores",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log every store and identity map operation
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to a stow.toml configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Compare raw store reads with model reads
    Bench(BenchArgs),
    /// Create a user and a post referencing it, then read them back
    Demo(DemoArgs),
}

#[derive(Args)]
pub struct BenchArgs {
    /// Number of reads per side
    #[arg(long, default_value_t = 10_000)]
    pub times: u32,

    /// Keep the identity map on for model reads
    #[arg(long)]
    pub identity_map: bool,
}

#[derive(Args)]
pub struct DemoArgs {
    /// Name of the user to create
    #[arg(long, default_value = "John")]
    pub name: String,

    /// Title of the post to create
    #[arg(long, default_value = "Hello, stow")]
    pub title: String,
}
