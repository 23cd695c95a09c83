use std::io::{self, ErrorKind};
use std::os::unix::fs::FileTypeExt;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use muxplex_endpoint::{attach, Attachment, Endpoint, EndpointConfig, MuxError, StreamEvent, StreamProxy};

use crate::cmd::EchoArgs;
use crate::exit::{io_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::OutputFormat;

const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);
const WRITABLE_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub fn run(args: EchoArgs, _format: OutputFormat) -> CliResult<i32> {
    let listener = bind(&args.path).map_err(|err| io_error("bind failed", err))?;
    listener
        .set_nonblocking(true)
        .map_err(|err| io_error("bind failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let config = EndpointConfig::default().with_max_pending_output(args.max_pending);
    tracing::info!(path = %args.path.display(), "echo server listening");

    let mut sessions: Vec<Attachment> = Vec::new();
    while running.load(Ordering::SeqCst) {
        let socket = match listener.accept() {
            Ok((socket, _)) => socket,
            Err(err) if err.kind() == ErrorKind::WouldBlock => {
                sessions.retain(|session| !session.is_finished());
                thread::sleep(ACCEPT_POLL_INTERVAL);
                continue;
            }
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(io_error("accept failed", err)),
        };

        let session = serve(socket, config.clone()).map_err(|err| io_error("accept failed", err))?;
        if args.once {
            session
                .join()
                .map_err(|_| CliError::new(INTERNAL, "connection thread panicked"))?;
            break;
        }
        sessions.push(session);
    }

    let _ = std::fs::remove_file(&args.path);
    tracing::info!("echo server stopped");
    Ok(SUCCESS)
}

/// Bind, replacing a stale socket but never any other kind of file.
fn bind(path: &Path) -> io::Result<UnixListener> {
    if let Ok(metadata) = std::fs::symlink_metadata(path) {
        if !metadata.file_type().is_socket() {
            return Err(io::Error::new(
                ErrorKind::AlreadyExists,
                "existing path is not a unix socket",
            ));
        }
        tracing::debug!(path = %path.display(), "removing stale socket");
        std::fs::remove_file(path)?;
    }
    UnixListener::bind(path)
}

fn serve(socket: UnixStream, config: EndpointConfig) -> io::Result<Attachment> {
    socket.set_nonblocking(false)?;
    tracing::info!("connection accepted");

    let endpoint = Endpoint::builder()
        .config(config)
        .on_stream(|stream| {
            let name = format!("stream-{}", stream.id());
            if let Err(err) = thread::Builder::new()
                .name(name)
                .spawn(move || echo_stream(stream))
            {
                tracing::warn!(error = %err, "failed to start stream thread");
            }
        })
        .build();
    attach(&endpoint, socket)
}

fn echo_stream(stream: StreamProxy) {
    let id = stream.id();
    tracing::info!(stream_id = id, "stream opened by peer");

    while let Some(event) = stream.recv() {
        match event {
            StreamEvent::Data(data) => {
                tracing::debug!(stream_id = id, size = data.len(), "echoing chunk");
                if !write_with_backpressure(&stream, &data) {
                    break;
                }
            }
            StreamEvent::End => {
                tracing::info!(stream_id = id, "stream ended by peer");
                break;
            }
            StreamEvent::Error => {
                tracing::warn!(stream_id = id, "stream torn down with error by peer");
                break;
            }
        }
    }
}

fn write_with_backpressure(stream: &StreamProxy, data: &[u8]) -> bool {
    loop {
        match stream.write(data) {
            Ok(()) => return true,
            Err(MuxError::Backpressure { pending, .. }) => {
                tracing::trace!(stream_id = stream.id(), pending, "waiting for transport");
                if !stream.is_open() {
                    return false;
                }
                stream.wait_writable(WRITABLE_POLL_INTERVAL);
            }
            Err(err) => {
                tracing::warn!(stream_id = stream.id(), error = %err, "echo failed");
                stream.error();
                return false;
            }
        }
    }
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
