// src/core/wire/mod.rs

//! The TC's own length-prefixed wire frame and its `tokio_util` codec.
//!
//! This fixes one concrete in-process transport for the wire protocol's
//! positional field layout: a 4-byte big-endian length prefix followed by a
//! `bincode`-encoded `Frame`. The `Encoder`/`Decoder` pair follows the same
//! length-based framing plus max-size guard shape as a RESP frame codec, but
//! the TC speaks its own frame type, not RESP.

use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};
use tokio_util::codec::{Decoder, Encoder};

use crate::core::errors::TcError;

/// Caps a single frame's encoded payload so a corrupt or hostile peer can't
/// force an unbounded allocation while we wait for the rest of a frame.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// The wire's positional field layout, plus an
/// opaque payload blob carrying whatever the `op_type`/`data_type` combination
/// requires (a controller list, a driver-result set, a key/value pair, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub session_id: u32,
    pub config_id: u32,
    pub op_type: u32,
    pub result_code: u32,
    pub max_rep_count: u32,
    pub option1: u32,
    pub option2: u32,
    pub data_type: u32,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(session_id: u32, config_id: u32, op_type: u32) -> Self {
        Self {
            session_id,
            config_id,
            op_type,
            result_code: 0,
            max_rep_count: 0,
            option1: 0,
            option2: 0,
            data_type: 0,
            payload: Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
pub struct FrameCodec;

impl Encoder<Frame> for FrameCodec {
    type Error = TcError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let config = bincode::config::standard();
        let encoded = bincode::serde::encode_to_vec(&item, config)?;
        if encoded.len() > MAX_FRAME_SIZE {
            return Err(TcError::Protocol(format!(
                "encoded frame too large: {} bytes",
                encoded.len()
            )));
        }
        dst.reserve(4 + encoded.len());
        dst.put_u32(encoded.len() as u32);
        dst.extend_from_slice(&encoded);
        Ok(())
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = TcError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < 4 {
            return Ok(None);
        }
        let len = u32::from_be_bytes(src[..4].try_into().unwrap()) as usize;
        if len > MAX_FRAME_SIZE {
            return Err(TcError::Protocol(format!(
                "frame length {len} exceeds max {MAX_FRAME_SIZE}"
            )));
        }
        if src.len() < 4 + len {
            src.reserve(4 + len - src.len());
            return Ok(None);
        }
        src.advance(4);
        let bytes = src.split_to(len);
        let config = bincode::config::standard();
        let (frame, _): (Frame, usize) = bincode::serde::decode_from_slice(&bytes, config)?;
        Ok(Some(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_frame() {
        let mut codec = FrameCodec;
        let mut buf = BytesMut::new();
        let mut frame = Frame::new(7, 42, 1);
        frame.payload = b"hello".to_vec();
        codec.encode(frame.clone(), &mut buf).unwrap();
        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, frame);
        assert!(buf.is_empty());
    }

    #[test]
    fn partial_frame_yields_none() {
        let mut codec = FrameCodec;
        let mut buf = BytesMut::new();
        codec
            .encode(Frame::new(1, 1, 1), &mut buf)
            .unwrap();
        let mut partial = buf.split_to(buf.len() - 1);
        assert!(codec.decode(&mut partial).unwrap().is_none());
    }

    #[test]
    fn oversized_length_prefix_is_rejected() {
        let mut codec = FrameCodec;
        let mut buf = BytesMut::new();
        buf.put_u32((MAX_FRAME_SIZE + 1) as u32);
        assert!(codec.decode(&mut buf).is_err());
    }
}
