use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod echo;
pub mod inspect;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve a Unix socket and echo every logical stream back to its sender.
    Echo(EchoArgs),
    /// Open logical streams to an echo server and check what comes back.
    Send(SendArgs),
    /// Decode a captured frame byte stream.
    Inspect(InspectArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Echo(args) => echo::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Inspect(args) => inspect::run(args, format),
        Command::Version(args) => version::run(args, format),
    }
}

#[derive(Args, Debug)]
pub struct EchoArgs {
    /// Socket path to bind.
    pub path: PathBuf,
    /// Serve a single connection, then exit.
    #[arg(long)]
    pub once: bool,
    /// Outgoing buffer limit per connection, in bytes.
    #[arg(long, value_name = "BYTES", default_value_t = muxplex_endpoint::DEFAULT_MAX_PENDING_OUTPUT)]
    pub max_pending: usize,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Socket path to connect to.
    pub path: PathBuf,
    /// Raw string payload.
    #[arg(long, conflicts_with = "file")]
    pub data: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with = "data")]
    pub file: Option<PathBuf>,
    /// Number of logical streams to open (1-256).
    #[arg(long, short = 'n', default_value_t = 1)]
    pub streams: usize,
    /// Largest chunk written per frame, in bytes.
    #[arg(long, value_name = "BYTES", default_value_t = 64 * 1024)]
    pub chunk_size: usize,
    /// Maximum time to wait for echoes (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Capture file to decode. Reads stdin when omitted or `-`.
    pub file: Option<PathBuf>,
    /// Stop after N frames.
    #[arg(long)]
    pub count: Option<usize>,
    /// Largest payload a header may announce, in bytes.
    #[arg(long, value_name = "BYTES", default_value_t = muxplex_frame::DEFAULT_MAX_PAYLOAD)]
    pub max_payload: usize,
    /// Fail if any frame carries an unknown prefix or event type.
    #[arg(long)]
    pub strict: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
