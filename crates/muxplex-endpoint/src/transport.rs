//! Driving an endpoint over a real byte transport.
//!
//! [`attach`] moves bytes between an [`Endpoint`] and a socket with two
//! threads: one feeds whatever the socket reads into the endpoint, the other
//! writes the endpoint's output to the socket. When the peer stops sending,
//! the endpoint closes; when the endpoint closes, the write half is shut down
//! so the peer sees end-of-stream in turn.

use std::io::{self, ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::thread::{self, JoinHandle};

use crate::endpoint::Endpoint;
use crate::error::Result;

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// A duplex byte transport that can be split across two threads.
pub trait Transport: Read + Write + Send + 'static {
    /// A second handle to the same transport.
    fn try_clone_transport(&self) -> io::Result<Self>
    where
        Self: Sized;

    /// Signal end-of-stream to the peer while still reading.
    fn shutdown_write(&self) -> io::Result<()>;
}

impl Transport for TcpStream {
    fn try_clone_transport(&self) -> io::Result<Self> {
        self.try_clone()
    }

    fn shutdown_write(&self) -> io::Result<()> {
        self.shutdown(Shutdown::Write)
    }
}

#[cfg(unix)]
impl Transport for std::os::unix::net::UnixStream {
    fn try_clone_transport(&self) -> io::Result<Self> {
        self.try_clone()
    }

    fn shutdown_write(&self) -> io::Result<()> {
        self.shutdown(Shutdown::Write)
    }
}

/// The I/O threads of an attached endpoint.
#[derive(Debug)]
pub struct Attachment {
    inbound: JoinHandle<()>,
    outbound: JoinHandle<()>,
}

impl Attachment {
    /// Wait for both threads. They exit once the endpoint is closed and its
    /// output drained, and the peer has stopped sending.
    pub fn join(self) -> thread::Result<()> {
        let inbound = self.inbound.join();
        let outbound = self.outbound.join();
        inbound.and(outbound)
    }

    pub fn is_finished(&self) -> bool {
        self.inbound.is_finished() && self.outbound.is_finished()
    }
}

/// Connect an endpoint to a transport.
pub fn attach<T: Transport>(endpoint: &Endpoint, transport: T) -> io::Result<Attachment> {
    let mut reader = transport.try_clone_transport()?;
    let mut writer = transport;

    let input = endpoint.clone();
    let inbound = thread::Builder::new()
        .name("muxplex-inbound".into())
        .spawn(move || {
            let mut buf = vec![0u8; READ_CHUNK_SIZE];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => {
                        tracing::debug!("transport reached end of input");
                        break;
                    }
                    Ok(n) => {
                        if let Err(err) = input.feed(&buf[..n]) {
                            tracing::warn!(error = %err, "dropping transport after framing error");
                            break;
                        }
                    }
                    Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                    Err(err) => {
                        tracing::warn!(error = %err, "transport read failed");
                        break;
                    }
                }
            }
            input.finish_input();
        })?;

    let output = endpoint.clone();
    let outbound = thread::Builder::new()
        .name("muxplex-outbound".into())
        .spawn(move || {
            while let Some(chunk) = output.next_output() {
                if let Err(err) = writer.write_all(&chunk).and_then(|()| writer.flush()) {
                    tracing::warn!(error = %err, "transport write failed");
                    output.close();
                    break;
                }
            }
            if let Err(err) = writer.shutdown_write() {
                if err.kind() != ErrorKind::NotConnected {
                    tracing::debug!(error = %err, "transport shutdown failed");
                }
            }
        })?;

    Ok(Attachment { inbound, outbound })
}

/// Move pending output between two in-memory endpoints until neither has
/// anything left to say.
///
/// An endpoint whose output has finished counts as the end of the other's
/// input, so closing one side closes both.
pub fn pump(a: &Endpoint, b: &Endpoint) -> Result<()> {
    loop {
        let mut moved = false;
        if let Some(chunk) = a.take_output() {
            b.feed(&chunk)?;
            moved = true;
        }
        if let Some(chunk) = b.take_output() {
            a.feed(&chunk)?;
            moved = true;
        }
        if a.is_output_finished() && !b.is_closed() {
            b.finish_input();
            moved = true;
        }
        if b.is_output_finished() && !a.is_closed() {
            a.finish_input();
            moved = true;
        }
        if !moved {
            return Ok(());
        }
    }
}
