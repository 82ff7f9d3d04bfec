//! Delimiter framing for byte-stream transports
//!
//! Each message is one JSON document followed by a single delimiter byte.

use std::io::{self, BufRead, Write};

use super::message::{OutboundMessage, Request};

/// Read one frame into `buf`, without the delimiter
///
/// Returns `Ok(false)` if the stream ended before a delimiter; a trailing
/// partial frame is discarded.
pub fn read_frame<R: BufRead + ?Sized>(reader: &mut R, delimiter: u8, buf: &mut Vec<u8>) -> io::Result<bool> {
    buf.clear();
    reader.read_until(delimiter, buf)?;
    if buf.last() != Some(&delimiter) {
        return Ok(false);
    }
    buf.pop();
    Ok(true)
}

/// Write `payload` followed by the delimiter and flush
pub fn write_frame<W: Write + ?Sized>(writer: &mut W, payload: &[u8], delimiter: u8) -> io::Result<()> {
    writer.write_all(payload)?;
    writer.write_all(&[delimiter])?;
    writer.flush()
}

pub fn decode_request(frame: &[u8]) -> serde_json::Result<Request> {
    serde_json::from_slice(frame)
}

pub fn encode_message(message: &OutboundMessage) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(message)
}

/// Whether a frame holds nothing but whitespace
pub fn is_blank(frame: &[u8]) -> bool {
    frame.iter().all(u8::is_ascii_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::message::MessageType;
    use std::io::Cursor;

    #[test]
    fn test_frames_split_on_delimiter() {
        let mut reader = Cursor::new(b"{\"type\":\"START\"};{\"type\":\"STOP\"};{\"type\"".to_vec());
        let mut buf = Vec::new();

        assert!(read_frame(&mut reader, b';', &mut buf).unwrap());
        assert_eq!(decode_request(&buf).unwrap(), Request::Start);
        assert!(read_frame(&mut reader, b';', &mut buf).unwrap());
        assert_eq!(decode_request(&buf).unwrap(), Request::Stop);
        // Partial trailing frame counts as end of stream
        assert!(!read_frame(&mut reader, b';', &mut buf).unwrap());
    }

    #[test]
    fn test_write_appends_delimiter() {
        let mut out = Vec::new();
        let payload = encode_message(&OutboundMessage::ack(MessageType::Stop, 1)).unwrap();
        write_frame(&mut out, &payload, b'\n').unwrap();
        assert_eq!(out.last(), Some(&b'\n'));
        assert_eq!(out.iter().filter(|b| **b == b'\n').count(), 1);
    }

    #[test]
    fn test_blank_frames() {
        assert!(is_blank(b"  \r"));
        assert!(!is_blank(b"{}"));
    }
}
