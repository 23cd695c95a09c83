//! Two in-memory endpoints, one echoing every stream the other opens.
//!
//! Run with: `cargo run -p muxplex --example echo-pair`

use std::sync::{Arc, Mutex};

use muxplex::endpoint::pump;
use muxplex::{Endpoint, StreamEvent, StreamProxy};

fn main() -> Result<(), muxplex::MuxError> {
    let accepted: Arc<Mutex<Vec<StreamProxy>>> = Arc::default();
    let sink = accepted.clone();
    let server = Endpoint::builder()
        .on_stream(move |stream| {
            if let Ok(mut streams) = sink.lock() {
                streams.push(stream);
            }
        })
        .build();
    let client = Endpoint::new();

    let streams = (0..3)
        .map(|_| client.create_stream())
        .collect::<Result<Vec<_>, _>>()?;
    for stream in &streams {
        stream.write(format!("hello from stream {}", stream.id()).as_bytes())?;
    }
    pump(&client, &server)?;

    // Echo whatever the server side received.
    if let Ok(peers) = accepted.lock() {
        for peer in peers.iter() {
            while let Some(StreamEvent::Data(data)) = peer.try_recv() {
                peer.write(&data)?;
            }
        }
    }
    pump(&client, &server)?;

    for stream in &streams {
        if let Some(StreamEvent::Data(data)) = stream.try_recv() {
            println!("stream {} <- {}", stream.id(), String::from_utf8_lossy(&data));
        }
        stream.end();
    }
    pump(&client, &server)?;

    println!(
        "open (local, remote) after end: client={:?} server={:?}",
        client.open_streams(),
        server.open_streams()
    );
    client.close();
    pump(&client, &server)?;
    println!("server closed: {}", server.is_closed());
    Ok(())
}
