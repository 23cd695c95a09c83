use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use muxplex_frame::{FrameConfig, FrameError, FrameReader};

use crate::cmd::InspectArgs;
use crate::exit::{frame_error, io_error, CliError, CliResult, DATA_INVALID, SUCCESS, USAGE};
use crate::output::{print_frames, FrameRow, OutputFormat};

pub fn run(args: InspectArgs, format: OutputFormat) -> CliResult<i32> {
    if args.max_payload == 0 {
        return Err(CliError::new(USAGE, "--max-payload must be greater than zero"));
    }
    let config = FrameConfig {
        max_payload_size: args.max_payload,
    };

    let source: Box<dyn Read> = match args.file.as_deref() {
        None => Box::new(io::stdin().lock()),
        Some(path) if path == Path::new("-") => Box::new(io::stdin().lock()),
        Some(path) => {
            let file = File::open(path)
                .map_err(|err| io_error(&format!("failed opening {}", path.display()), err))?;
            Box::new(BufReader::new(file))
        }
    };

    let (rows, failure) = decode_rows(source, config, args.count);
    print_frames(&rows, format);
    tracing::debug!(frames = rows.len(), "capture decoded");

    if let Some(err) = failure {
        return Err(frame_error(&format!("decode failed after {} frames", rows.len()), err));
    }

    if args.strict {
        if let Some(row) = rows.iter().find(|row| !row.is_recognised()) {
            return Err(CliError::new(
                DATA_INVALID,
                format!(
                    "frame {} has unknown tags (prefix {:#04x}, event {:#04x})",
                    row.index, row.prefix_byte, row.event_byte
                ),
            ));
        }
    }

    Ok(SUCCESS)
}

/// Decode frames until end of input, `limit` frames, or the first error.
/// Frames decoded before an error are still returned.
fn decode_rows<R: Read>(
    source: R,
    config: FrameConfig,
    limit: Option<usize>,
) -> (Vec<FrameRow>, Option<FrameError>) {
    let mut reader = FrameReader::with_config(source, config);
    let mut rows = Vec::new();
    let mut offset = 0u64;

    while limit.is_none_or(|limit| rows.len() < limit) {
        match reader.read_frame() {
            Ok(Some(frame)) => {
                rows.push(FrameRow::new(rows.len(), offset, &frame));
                offset += frame.wire_size() as u64;
            }
            Ok(None) => break,
            Err(err) => return (rows, Some(err)),
        }
    }
    (rows, None)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn raw(prefix: u8, stream_id: u8, event: u8, payload: &[u8]) -> Vec<u8> {
        let mut out = vec![prefix, stream_id, event];
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn rows_carry_offsets() {
        let mut capture = raw(0xBB, 1, 0, b"");
        capture.extend(raw(0xBB, 1, 1, b"hello"));
        capture.extend(raw(0xAA, 1, 2, b""));

        let (rows, failure) = decode_rows(Cursor::new(capture), FrameConfig::default(), None);
        assert!(failure.is_none());
        assert_eq!(rows.len(), 3);
        assert_eq!(
            rows.iter().map(|row| row.offset).collect::<Vec<_>>(),
            vec![0, 7, 19]
        );
        assert_eq!(rows[1].payload, "hello");
        assert_eq!(rows[2].prefix, "LOCAL");
        assert_eq!(rows[2].event, "END");
    }

    #[test]
    fn count_limits_frames() {
        let mut capture = Vec::new();
        for id in 0..5 {
            capture.extend(raw(0xBB, id, 0, b""));
        }

        let (rows, failure) = decode_rows(Cursor::new(capture), FrameConfig::default(), Some(2));
        assert!(failure.is_none());
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn truncated_capture_keeps_decoded_rows() {
        let mut capture = raw(0xBB, 3, 1, b"ok");
        capture.extend_from_slice(&raw(0xBB, 3, 1, b"cut short")[..10]);

        let (rows, failure) = decode_rows(Cursor::new(capture), FrameConfig::default(), None);
        assert_eq!(rows.len(), 1);
        assert!(matches!(failure, Some(FrameError::ConnectionClosed)));
    }

    #[test]
    fn oversized_announcement_fails() {
        let capture = raw(0xBB, 3, 1, &[0u8; 32]);
        let config = FrameConfig {
            max_payload_size: 16,
        };

        let (rows, failure) = decode_rows(Cursor::new(capture), config, None);
        assert!(rows.is_empty());
        assert!(matches!(failure, Some(FrameError::PayloadTooLarge { .. })));
    }

    #[test]
    fn unknown_tags_still_decode() {
        let capture = raw(0x42, 9, 0x7f, b"?");

        let (rows, failure) = decode_rows(Cursor::new(capture), FrameConfig::default(), None);
        assert!(failure.is_none());
        assert!(!rows[0].is_recognised());
    }
}
