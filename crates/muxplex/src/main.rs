mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(
    name = "muxplex",
    version,
    about = "Multiplex logical byte streams over one socket"
)]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(
        long,
        value_name = "LEVEL",
        default_value = "info",
        env = "MUXPLEX_LOG_LEVEL",
        global = true
    )]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    match cmd::run(cli.command, format) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_send_subcommand() {
        let cli = Cli::try_parse_from([
            "muxplex",
            "send",
            "/tmp/test.sock",
            "-n",
            "8",
            "--data",
            "hello",
        ])
        .expect("send args should parse");

        match cli.command {
            Command::Send(args) => {
                assert_eq!(args.streams, 8);
                assert_eq!(args.chunk_size, 64 * 1024);
                assert_eq!(args.timeout, "5s");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn rejects_conflicting_payload_args() {
        let err = Cli::try_parse_from([
            "muxplex",
            "send",
            "/tmp/test.sock",
            "--file",
            "payload.bin",
            "--data",
            "hello",
        ])
        .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn parses_inspect_without_file() {
        let cli = Cli::try_parse_from(["muxplex", "inspect", "--count", "3", "--strict"])
            .expect("inspect args should parse");
        match cli.command {
            Command::Inspect(args) => {
                assert!(args.file.is_none());
                assert_eq!(args.count, Some(3));
                assert!(args.strict);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_echo_with_global_flags() {
        let cli = Cli::try_parse_from([
            "muxplex",
            "echo",
            "/tmp/test.sock",
            "--once",
            "--log-format",
            "json",
            "--format",
            "pretty",
        ])
        .expect("echo args should parse");

        assert_eq!(cli.log_format, LogFormat::Json);
        assert_eq!(cli.format, Some(OutputFormat::Pretty));
        assert!(matches!(cli.command, Command::Echo(ref args) if args.once));
    }
}
