//! Protocol framing
//!
//! NETCONF over a byte stream uses one of two framing conventions:
//!
//! ```text
//! base:1.0  end-of-message   <rpc .../>]]>]]>
//! base:1.1  chunked          \n#<len>\n<data> ... \n##\n
//! ```
//!
//! Both sides start with end-of-message framing for the hello exchange and
//! switch to chunked framing only when both advertised base:1.1.

use crate::{Element, ProtocolError, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// End-of-message delimiter for base:1.0 framing
pub const EOM_DELIMITER: &[u8] = b"]]>]]>";

/// End-of-chunks marker for base:1.1 framing
pub const END_OF_CHUNKS: &[u8] = b"\n##\n";

/// Maximum reassembled message size (64 MiB)
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// Largest chunk written by the encoder
pub const MAX_CHUNK_SIZE: usize = 64 * 1024;

/// Largest chunk-size value allowed on the wire (RFC 6242)
const MAX_WIRE_CHUNK: u64 = 4_294_967_295;

/// Chunk-size values have at most 10 digits
const MAX_CHUNK_DIGITS: usize = 10;

const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

/// Wire framing convention
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Framing {
    /// `]]>]]>` delimited (base:1.0)
    #[default]
    EndOfMessage,

    /// Length-prefixed chunks (base:1.1)
    Chunked,
}

/// Codec turning a byte stream into complete NETCONF messages and back.
///
/// Decoding yields the raw bytes of one message; XML parsing is left to the
/// caller so that a single unparseable message can be dropped without
/// poisoning the stream. Decode errors always mean the framing itself is
/// broken and the stream cannot be resynchronized.
#[derive(Debug)]
pub struct NetconfCodec {
    framing: Framing,
    max_message_size: usize,
    /// Chunk data of the message being reassembled
    partial: BytesMut,
    /// Offset from which to resume scanning for the EOM delimiter
    scan_from: usize,
}

impl NetconfCodec {
    /// Create a codec using end-of-message framing
    pub fn new() -> Self {
        Self::with_framing(Framing::EndOfMessage)
    }

    /// Create a codec with the given framing
    pub fn with_framing(framing: Framing) -> Self {
        Self {
            framing,
            max_message_size: MAX_MESSAGE_SIZE,
            partial: BytesMut::new(),
            scan_from: 0,
        }
    }

    /// Override the maximum accepted message size
    pub fn with_max_message_size(mut self, max: usize) -> Self {
        self.max_message_size = max;
        self
    }

    /// Current framing
    pub fn framing(&self) -> Framing {
        self.framing
    }

    /// Switch framing; bytes already buffered are decoded with the new framing
    pub fn set_framing(&mut self, framing: Framing) {
        self.framing = framing;
        self.partial.clear();
        self.scan_from = 0;
    }

    fn decode_eom(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>> {
        let start = self.scan_from.min(buf.len());
        let found = buf[start..]
            .windows(EOM_DELIMITER.len())
            .position(|window| window == EOM_DELIMITER);

        match found {
            Some(offset) => {
                let end = start + offset;
                if end > self.max_message_size {
                    return Err(ProtocolError::MessageTooLarge {
                        size: end,
                        max: self.max_message_size,
                    });
                }
                let message = buf.split_to(end).freeze();
                buf.advance(EOM_DELIMITER.len());
                self.scan_from = 0;
                Ok(Some(trim_ascii_whitespace(message)))
            }
            None => {
                if buf.len() > self.max_message_size {
                    return Err(ProtocolError::MessageTooLarge {
                        size: buf.len(),
                        max: self.max_message_size,
                    });
                }
                // The delimiter may straddle the next read.
                self.scan_from = buf.len().saturating_sub(EOM_DELIMITER.len() - 1);
                Ok(None)
            }
        }
    }

    fn decode_chunked(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>> {
        loop {
            // Shortest header is "\n#1\n" or the end marker "\n##\n".
            if buf.len() < 4 {
                return Ok(None);
            }
            if buf[0] != b'\n' || buf[1] != b'#' {
                return Err(ProtocolError::MalformedFrame(
                    "expected chunk header".to_string(),
                ));
            }

            if buf[2] == b'#' {
                if buf[3] != b'\n' {
                    return Err(ProtocolError::MalformedFrame(
                        "invalid end-of-chunks marker".to_string(),
                    ));
                }
                buf.advance(END_OF_CHUNKS.len());
                if self.partial.is_empty() {
                    return Err(ProtocolError::MalformedFrame(
                        "end-of-chunks without chunk data".to_string(),
                    ));
                }
                return Ok(Some(self.partial.split().freeze()));
            }

            let newline = buf[2..]
                .iter()
                .take(MAX_CHUNK_DIGITS + 1)
                .position(|b| *b == b'\n');
            let digits_end = match newline {
                Some(offset) => 2 + offset,
                None if buf.len() >= 2 + MAX_CHUNK_DIGITS + 1 => {
                    return Err(ProtocolError::MalformedFrame(
                        "chunk size too long".to_string(),
                    ));
                }
                None => return Ok(None),
            };

            let size = parse_chunk_size(&buf[2..digits_end])?;
            if self.partial.len() + size > self.max_message_size {
                return Err(ProtocolError::MessageTooLarge {
                    size: self.partial.len() + size,
                    max: self.max_message_size,
                });
            }

            let header_len = digits_end + 1;
            if buf.len() < header_len + size {
                buf.reserve(header_len + size - buf.len());
                return Ok(None);
            }

            buf.advance(header_len);
            let chunk = buf.split_to(size);
            self.partial.extend_from_slice(&chunk);
        }
    }
}

impl Default for NetconfCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for NetconfCodec {
    type Item = Bytes;
    type Error = ProtocolError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>> {
        match self.framing {
            Framing::EndOfMessage => self.decode_eom(buf),
            Framing::Chunked => self.decode_chunked(buf),
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>> {
        if let Some(message) = self.decode(buf)? {
            return Ok(Some(message));
        }
        if self.partial.is_empty() && buf.iter().all(|b| b.is_ascii_whitespace()) {
            buf.clear();
            return Ok(None);
        }
        Err(ProtocolError::MalformedFrame(
            "stream ended inside a message".to_string(),
        ))
    }
}

impl Encoder<Bytes> for NetconfCodec {
    type Error = ProtocolError;

    fn encode(&mut self, message: Bytes, dst: &mut BytesMut) -> Result<()> {
        if message.is_empty() {
            return Err(ProtocolError::InvalidFormat("empty message".to_string()));
        }
        if message.len() > self.max_message_size {
            return Err(ProtocolError::MessageTooLarge {
                size: message.len(),
                max: self.max_message_size,
            });
        }

        match self.framing {
            Framing::EndOfMessage => {
                if message
                    .windows(EOM_DELIMITER.len())
                    .any(|window| window == EOM_DELIMITER)
                {
                    return Err(ProtocolError::InvalidFormat(
                        "message contains the end-of-message delimiter".to_string(),
                    ));
                }
                dst.reserve(message.len() + EOM_DELIMITER.len());
                dst.put_slice(&message);
                dst.put_slice(EOM_DELIMITER);
            }
            Framing::Chunked => {
                for chunk in message.chunks(MAX_CHUNK_SIZE) {
                    let header = format!("\n#{}\n", chunk.len());
                    dst.reserve(header.len() + chunk.len());
                    dst.put_slice(header.as_bytes());
                    dst.put_slice(chunk);
                }
                dst.put_slice(END_OF_CHUNKS);
            }
        }

        Ok(())
    }
}

impl Encoder<Element> for NetconfCodec {
    type Error = ProtocolError;

    fn encode(&mut self, message: Element, dst: &mut BytesMut) -> Result<()> {
        Encoder::<Bytes>::encode(self, serialize_message(&message), dst)
    }
}

/// Serialize a message element with an XML declaration
pub fn serialize_message(message: &Element) -> Bytes {
    let mut text = String::from(XML_DECLARATION);
    text.push_str(&message.to_xml());
    Bytes::from(text)
}

fn parse_chunk_size(digits: &[u8]) -> Result<usize> {
    let valid = !digits.is_empty()
        && digits[0] != b'0'
        && digits.iter().all(|b| b.is_ascii_digit());
    if !valid {
        return Err(ProtocolError::MalformedFrame(format!(
            "invalid chunk size {:?}",
            String::from_utf8_lossy(digits)
        )));
    }

    let size: u64 = std::str::from_utf8(digits)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ProtocolError::MalformedFrame("invalid chunk size".to_string()))?;
    if size > MAX_WIRE_CHUNK {
        return Err(ProtocolError::MalformedFrame(format!(
            "chunk size {} exceeds protocol maximum",
            size
        )));
    }

    usize::try_from(size)
        .map_err(|_| ProtocolError::MalformedFrame("chunk size overflow".to_string()))
}

fn trim_ascii_whitespace(mut message: Bytes) -> Bytes {
    let start = message
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(message.len());
    let end = message
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |p| p + 1);
    message.truncate(end);
    message.advance(start);
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> Element {
        Element::new("rpc")
            .with_namespace("urn:ietf:params:xml:ns:netconf:base:1.0")
            .with_attr("message-id", "101")
            .with_child(
                Element::new("get-config").with_child(
                    Element::new("source").with_child(Element::new("running")),
                ),
            )
            .with_child(Element::new("note").with_text("a < b & c"))
    }

    fn encode_tree(framing: Framing, tree: Element) -> BytesMut {
        let mut codec = NetconfCodec::with_framing(framing);
        let mut buf = BytesMut::new();
        codec.encode(tree, &mut buf).unwrap();
        buf
    }

    fn deep_tree(depth: usize) -> Element {
        (0..depth).fold(Element::new("leaf").with_text("bottom"), |child, level| {
            Element::new(format!("level{}", level)).with_child(child)
        })
    }

    fn round_trip_trees() -> Vec<Element> {
        vec![
            sample_tree(),
            Element::new("empty").with_text(""),
            Element::new("spaces").with_text("   "),
            Element::new("container")
                .with_text(" \n\t ")
                .with_child(Element::new("child").with_text("value")),
            Element::new("escapes")
                .with_attr("note", r#"a<b & "c" 'd'"#)
                .with_text("1 < 2 && 3 > 2 ]]>]]>")
                .with_child(Element::new("if:name").with_attr("xmlns:if", "urn:x?a=1&b=2")),
            Element::new("mixed")
                .with_text("before")
                .with_child(Element::new("inner")),
            deep_tree(64),
        ]
    }

    #[test]
    fn test_round_trip_both_framings() {
        for framing in [Framing::EndOfMessage, Framing::Chunked] {
            for tree in round_trip_trees() {
                let mut buf = encode_tree(framing, tree.clone());

                let mut codec = NetconfCodec::with_framing(framing);
                let frame = codec.decode(&mut buf).unwrap().unwrap();
                assert!(buf.is_empty());

                let decoded = Element::parse_bytes(&frame).unwrap();
                assert_eq!(decoded, tree, "framing {:?}", framing);
            }
        }
    }

    #[test]
    fn test_byte_at_a_time_delivery() {
        for framing in [Framing::EndOfMessage, Framing::Chunked] {
            let encoded = encode_tree(framing, sample_tree());
            let mut codec = NetconfCodec::with_framing(framing);
            let mut buf = BytesMut::new();
            let mut frames = Vec::new();

            for byte in encoded.iter() {
                buf.put_u8(*byte);
                if let Some(frame) = codec.decode(&mut buf).unwrap() {
                    frames.push(frame);
                }
            }

            assert_eq!(frames.len(), 1, "framing {:?}", framing);
            assert_eq!(Element::parse_bytes(&frames[0]).unwrap(), sample_tree());
        }
    }

    #[test]
    fn test_multiple_messages_in_one_read() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(b"<a/>]]>]]>\n<b/>]]>]]><c");

        let mut codec = NetconfCodec::new();
        assert_eq!(&codec.decode(&mut buf).unwrap().unwrap()[..], b"<a/>");
        assert_eq!(&codec.decode(&mut buf).unwrap().unwrap()[..], b"<b/>");
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(&buf[..], b"<c");
    }

    #[test]
    fn test_multi_chunk_message() {
        let mut buf = BytesMut::from(&b"\n#4\n<rpc\n#17\n message-id=\"1\"/>\n##\n"[..]);
        let mut codec = NetconfCodec::with_framing(Framing::Chunked);
        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&frame[..], b"<rpc message-id=\"1\"/>");
    }

    #[test]
    fn test_large_message_is_split_into_chunks() {
        let text = "x".repeat(MAX_CHUNK_SIZE + 10);
        let tree = Element::new("data").with_text(text);
        let mut buf = encode_tree(Framing::Chunked, tree.clone());

        let mut codec = NetconfCodec::with_framing(Framing::Chunked);
        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(Element::parse_bytes(&frame).unwrap(), tree);
    }

    #[test]
    fn test_invalid_chunk_headers() {
        let cases: [&[u8]; 5] = [
            b"#4\n<a/>",
            b"\n#0\n",
            b"\n#04\n<a/>",
            b"\n#x1\n",
            b"\n##\n",
        ];
        for case in cases {
            let mut codec = NetconfCodec::with_framing(Framing::Chunked);
            let mut buf = BytesMut::from(case);
            let result = codec.decode(&mut buf);
            assert!(
                matches!(result, Err(ProtocolError::MalformedFrame(_))),
                "case {:?}",
                String::from_utf8_lossy(case)
            );
        }
    }

    #[test]
    fn test_oversized_chunk_size() {
        let mut codec = NetconfCodec::with_framing(Framing::Chunked);
        let mut buf = BytesMut::from(&b"\n#12345678901\n"[..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(ProtocolError::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_truncated_stream() {
        let mut codec = NetconfCodec::new();
        let mut buf = BytesMut::from(&b"<rpc-reply message-id=\"1\">"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert!(matches!(
            codec.decode_eof(&mut buf),
            Err(ProtocolError::MalformedFrame(_))
        ));

        let mut codec = NetconfCodec::with_framing(Framing::Chunked);
        let mut buf = BytesMut::from(&b"\n#10\n<ok/>"[..]);
        assert!(codec.decode_eof(&mut buf).is_err());

        let mut buf = BytesMut::from(&b"\n  "[..]);
        assert!(NetconfCodec::new().decode_eof(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_message_too_large() {
        let mut codec = NetconfCodec::new().with_max_message_size(16);
        let mut buf = BytesMut::from(&[b'a'; 32][..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(ProtocolError::MessageTooLarge { .. })
        ));

        let mut out = BytesMut::new();
        let result = codec.encode(Bytes::from_static(&[b'b'; 32]), &mut out);
        assert!(matches!(result, Err(ProtocolError::MessageTooLarge { .. })));
    }

    #[test]
    fn test_switch_framing_keeps_buffered_bytes() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(b"<hello/>]]>]]>\n#5\n<ok/>\n##\n");

        let mut codec = NetconfCodec::new();
        assert_eq!(&codec.decode(&mut buf).unwrap().unwrap()[..], b"<hello/>");

        codec.set_framing(Framing::Chunked);
        assert_eq!(&codec.decode(&mut buf).unwrap().unwrap()[..], b"<ok/>");
    }

    #[test]
    fn test_raw_eom_message_with_delimiter_is_rejected() {
        let mut codec = NetconfCodec::new();
        let mut out = BytesMut::new();
        let result = codec.encode(Bytes::from_static(b"<a>]]>]]></a>"), &mut out);
        assert!(matches!(result, Err(ProtocolError::InvalidFormat(_))));
    }
}
