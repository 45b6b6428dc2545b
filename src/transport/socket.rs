//! The Message Socket (C1): a length-framed JSON duplex channel over any
//! byte stream (spec §4.1).
//!
//! ```text
//!  byte 0        type   u8    (1 = JSON)
//!  bytes 1..4    length u32   big-endian, body byte-count
//!  bytes 5..N    body   utf-8 JSON
//! ```

// Layer 1: Standard library imports
use std::io;

// Layer 2: Third-party crate imports
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

// Layer 3: Internal module imports
use crate::message::Frame;

const FRAME_TYPE_JSON: u8 = 1;
const HEADER_LEN: usize = 5;

/// A [`tokio_util::codec`] codec that speaks the frame format above.
/// Buffers partial frames across chunk boundaries and can yield several
/// frames parsed out of one chunk.
#[derive(Debug, Default)]
pub struct FrameCodec;

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }
        let frame_type = src[0];
        if frame_type != FRAME_TYPE_JSON {
            return Err(io::Error::new(io::ErrorKind::InvalidData, format!("unknown frame type {frame_type}")));
        }
        let len = u32::from_be_bytes([src[1], src[2], src[3], src[4]]) as usize;
        if src.len() < HEADER_LEN + len {
            src.reserve(HEADER_LEN + len - src.len());
            return Ok(None);
        }

        src.advance(HEADER_LEN);
        let body = src.split_to(len);
        let frame: Frame = serde_json::from_slice(&body)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("malformed frame body: {e}")))?;
        Ok(Some(frame))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let body = serde_json::to_vec(&item)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("could not serialize frame: {e}")))?;
        dst.reserve(HEADER_LEN + body.len());
        dst.put_u8(FRAME_TYPE_JSON);
        dst.put_u32(body.len() as u32);
        dst.put_slice(&body);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::message::frame::FrameKind;

    #[test]
    fn encodes_then_decodes_a_frame() {
        let mut codec = FrameCodec;
        let mut buf = BytesMut::new();
        let frame = Frame::new(FrameKind::ParentPing);
        codec.encode(frame.clone(), &mut buf).unwrap();

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.kind, frame.kind);
        assert!(buf.is_empty());
    }

    #[test]
    fn decode_waits_for_a_complete_frame() {
        let mut codec = FrameCodec;
        let mut buf = BytesMut::new();
        codec.encode(Frame::new(FrameKind::ActorCreated), &mut buf).unwrap();

        let mut partial = buf.split_to(buf.len() - 2);
        assert!(codec.decode(&mut partial).unwrap().is_none());
    }

    #[test]
    fn unknown_frame_type_is_an_error() {
        let mut codec = FrameCodec;
        let mut buf = BytesMut::new();
        buf.put_u8(9);
        buf.put_u32(0);
        assert!(codec.decode(&mut buf).is_err());
    }
}
