use std::fs;
use std::os::unix::net::UnixStream;
use std::sync::mpsc::RecvTimeoutError;
use std::time::{Duration, Instant};

use muxplex_endpoint::{attach, Endpoint, MuxError, StreamEvent, StreamProxy};

use crate::cmd::SendArgs;
use crate::exit::{
    io_error, mux_error, CliError, CliResult, DATA_INVALID, INTERNAL, SUCCESS, TIMEOUT, USAGE,
};
use crate::output::{print_echoes, EchoRow, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    if args.streams == 0 || args.streams > 256 {
        return Err(CliError::new(USAGE, "--streams must be between 1 and 256"));
    }
    if args.chunk_size == 0 {
        return Err(CliError::new(USAGE, "--chunk-size must be greater than zero"));
    }
    let payload = resolve_payload(&args)?;

    let socket = UnixStream::connect(&args.path).map_err(|err| io_error("connect failed", err))?;
    let endpoint = Endpoint::new();
    let io = attach(&endpoint, socket).map_err(|err| io_error("connect failed", err))?;

    let deadline = Instant::now() + timeout;
    let result = exchange(&endpoint, &args, &payload, deadline);

    endpoint.close();
    io.join()
        .map_err(|_| CliError::new(INTERNAL, "transport thread panicked"))?;

    let rows = result?;
    print_echoes(&rows, format);

    match rows.iter().find(|row| !row.matched) {
        Some(row) => Err(CliError::new(
            DATA_INVALID,
            format!(
                "echo mismatch on stream {}: sent {} bytes, received {}",
                row.stream_id, row.sent, row.received
            ),
        )),
        None => Ok(SUCCESS),
    }
}

fn exchange(
    endpoint: &Endpoint,
    args: &SendArgs,
    payload: &[u8],
    deadline: Instant,
) -> CliResult<Vec<EchoRow>> {
    let streams = (0..args.streams)
        .map(|_| endpoint.create_stream())
        .collect::<Result<Vec<StreamProxy>, MuxError>>()
        .map_err(|err| mux_error("open stream failed", err))?;

    for stream in &streams {
        for chunk in payload.chunks(args.chunk_size) {
            write_before(stream, chunk, deadline)?;
        }
        tracing::debug!(stream_id = stream.id(), size = payload.len(), "payload sent");
    }

    streams
        .iter()
        .map(|stream| {
            let received = collect_echo(stream, payload.len(), deadline)?;
            Ok(EchoRow::new(stream.id(), payload, received))
        })
        .collect()
}

fn write_before(stream: &StreamProxy, chunk: &[u8], deadline: Instant) -> CliResult<()> {
    loop {
        match stream.write(chunk) {
            Ok(()) => return Ok(()),
            Err(MuxError::Backpressure { .. }) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() || !stream.wait_writable(remaining) {
                    return Err(CliError::new(TIMEOUT, "timed out waiting for the transport"));
                }
            }
            Err(err) => return Err(mux_error("write failed", err)),
        }
    }
}

/// Read echoed bytes until `expected` have arrived, the stream ends, or the
/// deadline passes.
fn collect_echo(stream: &StreamProxy, expected: usize, deadline: Instant) -> CliResult<Vec<u8>> {
    let mut received = Vec::with_capacity(expected);
    while received.len() < expected {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match stream.recv_timeout(remaining) {
            Ok(StreamEvent::Data(data)) => received.extend_from_slice(&data),
            Ok(StreamEvent::End) | Ok(StreamEvent::Error) | Err(RecvTimeoutError::Disconnected) => {
                tracing::warn!(stream_id = stream.id(), "stream ended before the full echo");
                break;
            }
            Err(RecvTimeoutError::Timeout) => {
                return Err(CliError::new(
                    TIMEOUT,
                    format!(
                        "timed out waiting for echo on stream {} ({} of {} bytes)",
                        stream.id(),
                        received.len(),
                        expected
                    ),
                ));
            }
        }
    }
    Ok(received)
}

fn resolve_payload(args: &SendArgs) -> CliResult<Vec<u8>> {
    let payload = if let Some(data) = &args.data {
        data.as_bytes().to_vec()
    } else if let Some(path) = &args.file {
        fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?
    } else {
        return Err(CliError::new(USAGE, "one of --data or --file is required"));
    };
    if payload.is_empty() {
        return Err(CliError::new(USAGE, "payload must not be empty"));
    }
    Ok(payload)
}

fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = match input.strip_suffix("ms") {
        Some(num) => (num, true),
        None => (input.strip_suffix('s').unwrap_or(input), false),
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}
