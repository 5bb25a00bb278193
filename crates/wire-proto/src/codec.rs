//! Length-delimited framing for the cluster RPC plane, carrying
//! `rmp-serde`-encoded [`crate::rpc::Envelope`] payloads.
//!
//! Plain length-delimited framing (4-byte big-endian length prefix) was
//! chosen over a text codec because the RPC plane is process-to-process and
//! benefits from compact binary framing; the client-facing transports
//! (websocket, long-poll, grpc) are each other's own concern and do not use
//! this codec.

use bytes::{Buf, BufMut, BytesMut};
use serde::{de::DeserializeOwned, Serialize};
use std::io;
use std::marker::PhantomData;
use tokio_util::codec::{Decoder, Encoder};

pub struct MsgPackCodec<T> {
    inner: tokio_util::codec::LengthDelimitedCodec,
    _marker: PhantomData<T>,
}

impl<T> Default for MsgPackCodec<T> {
    fn default() -> Self {
        MsgPackCodec {
            inner: tokio_util::codec::LengthDelimitedCodec::builder()
                .max_frame_length(16 * 1024 * 1024)
                .new_codec(),
            _marker: PhantomData,
        }
    }
}

impl<T: Serialize> Encoder<T> for MsgPackCodec<T> {
    type Error = io::Error;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let bytes = rmp_serde::to_vec_named(&item).map_err(io::Error::other)?;
        let mut buf = BytesMut::with_capacity(bytes.len());
        buf.put_slice(&bytes);
        self.inner.encode(buf.freeze(), dst)
    }
}

impl<T: DeserializeOwned> Decoder for MsgPackCodec<T> {
    type Item = T;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(mut frame) = self.inner.decode(src)? else {
            return Ok(None);
        };
        let bytes = frame.copy_to_bytes(frame.remaining());
        let value = rmp_serde::from_slice(&bytes).map_err(io::Error::other)?;
        Ok(Some(value))
    }
}
