use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use muxplex_frame::{EventType, Frame, Prefix};
use serde::Serialize;

const PREVIEW_LIMIT: usize = 64;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// One decoded frame, as printed by `inspect`.
#[derive(Debug, Serialize)]
pub struct FrameRow {
    pub index: usize,
    pub offset: u64,
    pub prefix: &'static str,
    pub prefix_byte: u8,
    pub stream_id: u8,
    pub event: &'static str,
    pub event_byte: u8,
    pub length: u32,
    pub payload: String,
    #[serde(skip)]
    pub raw: Vec<u8>,
}

impl FrameRow {
    pub fn new(index: usize, offset: u64, frame: &Frame) -> Self {
        let header = frame.header;
        Self {
            index,
            offset,
            prefix: Prefix::name_of(header.prefix),
            prefix_byte: header.prefix,
            stream_id: header.stream_id,
            event: EventType::name_of(header.event_type),
            event_byte: header.event_type,
            length: header.length,
            payload: payload_preview(frame.payload.as_ref()),
            raw: frame.payload.to_vec(),
        }
    }

    pub fn is_recognised(&self) -> bool {
        self.prefix != "UNKNOWN" && self.event != "UNKNOWN"
    }
}

/// Echo result for one stream, as printed by `send`.
#[derive(Debug, Serialize)]
pub struct EchoRow {
    pub stream_id: u8,
    pub sent: usize,
    pub received: usize,
    pub matched: bool,
    pub payload: String,
    pub timestamp: String,
    #[serde(skip)]
    pub raw: Vec<u8>,
}

impl EchoRow {
    pub fn new(stream_id: u8, sent: &[u8], received: Vec<u8>) -> Self {
        Self {
            stream_id,
            sent: sent.len(),
            received: received.len(),
            matched: sent == received.as_slice(),
            payload: payload_preview(&received),
            timestamp: now_unix_seconds(),
            raw: received,
        }
    }
}

pub fn print_frames(rows: &[FrameRow], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            for row in rows {
                print_json_line(row);
            }
        }
        OutputFormat::Table => {
            let mut table = new_table(vec!["#", "OFFSET", "PREFIX", "STREAM", "EVENT", "LENGTH", "PAYLOAD"]);
            for row in rows {
                table.add_row(vec![
                    row.index.to_string(),
                    row.offset.to_string(),
                    format!("{} ({:#04x})", row.prefix, row.prefix_byte),
                    row.stream_id.to_string(),
                    format!("{} ({:#04x})", row.event, row.event_byte),
                    row.length.to_string(),
                    row.payload.clone(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for row in rows {
                println!(
                    "#{} @{} prefix={} stream={} event={} len={} payload={}",
                    row.index,
                    row.offset,
                    row.prefix,
                    row.stream_id,
                    row.event,
                    row.length,
                    row.payload
                );
            }
        }
        OutputFormat::Raw => {
            for row in rows {
                print_raw(&row.raw);
            }
        }
    }
}

pub fn print_echoes(rows: &[EchoRow], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            for row in rows {
                print_json_line(row);
            }
        }
        OutputFormat::Table => {
            let mut table = new_table(vec!["STREAM", "SENT", "RECEIVED", "MATCH", "PAYLOAD"]);
            for row in rows {
                table.add_row(vec![
                    row.stream_id.to_string(),
                    row.sent.to_string(),
                    row.received.to_string(),
                    row.matched.to_string(),
                    row.payload.clone(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for row in rows {
                println!(
                    "stream={} sent={} received={} match={} payload={}",
                    row.stream_id, row.sent, row.received, row.matched, row.payload
                );
            }
        }
        OutputFormat::Raw => {
            for row in rows {
                print_raw(&row.raw);
            }
        }
    }
}

/// Print a single record as key/value pairs.
pub fn print_record<T: Serialize>(record: &T, format: OutputFormat) {
    if format == OutputFormat::Json {
        print_json_line(record);
        return;
    }
    let fields = match serde_json::to_value(record) {
        Ok(serde_json::Value::Object(fields)) => fields,
        _ => return,
    };
    let render = |value: &serde_json::Value| match value {
        serde_json::Value::String(text) => text.clone(),
        other => other.to_string(),
    };
    match format {
        OutputFormat::Table => {
            let mut table = new_table(vec!["FIELD", "VALUE"]);
            for (key, value) in &fields {
                table.add_row(vec![key.clone(), render(value)]);
            }
            println!("{table}");
        }
        _ => {
            for (key, value) in &fields {
                println!("{key}: {}", render(value));
            }
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn print_json_line<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) if text.chars().count() > PREVIEW_LIMIT => {
            let cut: String = text.chars().take(PREVIEW_LIMIT).collect();
            format!("{cut}…")
        }
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_row_names_tags() {
        let frame = Frame::new(Prefix::Remote, 7, EventType::Connection, b"hi".to_vec()).unwrap();
        let row = FrameRow::new(0, 0, &frame);

        assert_eq!(row.prefix, "REMOTE");
        assert_eq!(row.event, "CONNECTION");
        assert_eq!(row.payload, "hi");
        assert!(row.is_recognised());

        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["stream_id"], 7);
        assert!(json.get("raw").is_none());
    }

    #[test]
    fn previews_truncate_and_flag_binary() {
        assert_eq!(payload_preview(&[0xff, 0xfe]), "<binary 2 bytes>");
        let long = "x".repeat(100);
        assert_eq!(payload_preview(long.as_bytes()).chars().count(), PREVIEW_LIMIT + 1);
    }

    #[test]
    fn echo_row_detects_mismatch() {
        assert!(EchoRow::new(1, b"abc", b"abc".to_vec()).matched);
        assert!(!EchoRow::new(1, b"abc", b"ab".to_vec()).matched);
    }
}
