//! [`tokio_util::codec`] implementation for clients.
//!
//! Requests are encoded as [`Frame`]s, responses are decoded to [`ResponseFrame`]s.
use std::io;

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::{
    codec::HEADER_LEN,
    error::ReadError,
    protocol::{Frame, Header, Response, ResponseFrame},
};

/// Client side codec, to be used with [`tokio_util::codec::Framed`].
#[derive(Debug, Default, Clone, Copy)]
pub struct ClientCodec;

impl Encoder<Frame> for ClientCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(&item.to_bytes());
        Ok(())
    }
}

impl Decoder for ClientCodec {
    type Item = ResponseFrame;
    type Error = ReadError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(header) = src.first_chunk::<HEADER_LEN>() else {
            return Ok(None);
        };
        let (header, pdu_len) = Header::parse(header)?;
        let frame_len = HEADER_LEN + pdu_len;
        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        let frame = src.split_to(frame_len);
        let response = Response::from_pdu(&frame[HEADER_LEN..])?;
        Ok(Some(ResponseFrame { header, response }))
    }
}
