//! Length-delimited JSON framing for [`Frame`]s.
//!
//! Wraps [`LengthDelimitedCodec`] so both sides of any byte-stream
//! transport speak the same envelope; serialization itself is plain JSON.

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

use crate::errors::Error;
use crate::wire::Frame;

/// Default cap on a single frame, matching the length-delimited default.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 8 * 1024 * 1024;

/// Frames [`Frame`] values onto a byte stream: a length prefix followed by
/// the JSON body.
#[derive(Debug)]
pub struct FrameCodec {
    inner: LengthDelimitedCodec,
}

impl FrameCodec {
    /// Codec with the default frame size cap.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_frame(DEFAULT_MAX_FRAME_BYTES)
    }

    /// Codec rejecting frames larger than `max_frame_bytes`.
    #[must_use]
    pub fn with_max_frame(max_frame_bytes: usize) -> Self {
        Self {
            inner: LengthDelimitedCodec::builder()
                .max_frame_length(max_frame_bytes)
                .new_codec(),
        }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, Error> {
        match self.inner.decode(src)? {
            Some(body) => Ok(Some(serde_json::from_slice(&body)?)),
            None => Ok(None),
        }
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = Error;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Error> {
        let body = serde_json::to_vec(&frame)?;
        self.inner.encode(Bytes::from(body), dst)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::CorrelationId;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn encode(codec: &mut FrameCodec, frame: Frame) -> BytesMut {
        let mut buf = BytesMut::new();
        codec.encode(frame, &mut buf).unwrap();
        buf
    }

    #[test]
    fn encode_decode_roundtrip() {
        let mut codec = FrameCodec::new();
        let frame = Frame::Command {
            correlation: CorrelationId::from(1),
            payload: json!({"op": "ping"}),
        };
        let mut buf = encode(&mut codec, frame.clone());
        let decoded = codec.decode(&mut buf).unwrap();
        assert_eq!(decoded, Some(frame));
        assert!(buf.is_empty());
    }

    #[test]
    fn partial_frame_decodes_to_none() {
        let mut codec = FrameCodec::new();
        let buf = encode(&mut codec, Frame::Shutdown);
        let mut partial = BytesMut::from(&buf[..buf.len() - 2]);
        assert_eq!(codec.decode(&mut partial).unwrap(), None);
    }

    #[test]
    fn two_frames_decode_in_order() {
        let mut codec = FrameCodec::new();
        let first = Frame::Command {
            correlation: CorrelationId::from(1),
            payload: json!(1),
        };
        let second = Frame::Command {
            correlation: CorrelationId::from(2),
            payload: json!(2),
        };
        let mut buf = encode(&mut codec, first.clone());
        buf.extend_from_slice(&encode(&mut codec, second.clone()));

        assert_eq!(codec.decode(&mut buf).unwrap(), Some(first));
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(second));
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn garbage_body_is_a_codec_error() {
        let mut inner = LengthDelimitedCodec::new();
        let mut buf = BytesMut::new();
        inner
            .encode(Bytes::from_static(b"not json"), &mut buf)
            .unwrap();

        let mut codec = FrameCodec::new();
        let err = codec.decode(&mut buf).unwrap_err();
        assert_matches!(err, Error::Codec(_));
    }

    #[test]
    fn oversized_frame_is_rejected() {
        let mut codec = FrameCodec::with_max_frame(16);
        let frame = Frame::Command {
            correlation: CorrelationId::from(1),
            payload: json!("x".repeat(64)),
        };
        let mut buf = BytesMut::new();
        assert!(codec.encode(frame, &mut buf).is_err());
    }
}
