use crate::proto::{command::Command, response::Response};
use bytes::{Buf, BufMut, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder};

/// Line terminator for both directions.
pub const EOL: u8 = b'\n';

/// Longest response line accepted before the buffer is discarded.
/// Regular responses are well below 100 bytes.
pub const MAX_LINE_LEN: usize = 1024;

#[derive(Debug, Default, Clone, Copy)]
pub struct ProtocolCodec;

/// Decode wire bytes as UTF-8, dropping everything that is not valid UTF-8.
///
/// The meter occasionally emits garbage bytes after being powered on or
/// reconfigured. A read never fails because of that.
pub fn lenient_utf8(bytes: &[u8]) -> String {
    let mut text = String::with_capacity(bytes.len());
    for chunk in bytes.utf8_chunks() {
        text.push_str(chunk.valid());
    }
    text
}

impl Decoder for ProtocolCodec {
    type Item = Response;
    // Only transport failures are errors here. An oversized line is
    // reported as Response::Overflow so the framed stream stays usable.
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match src.iter().position(|b| *b == EOL) {
            Some(n) if n > MAX_LINE_LEN => {
                src.advance(n + 1);
                Ok(Some(Response::Overflow(n + 1)))
            }
            Some(n) => {
                let line = src.split_to(n + 1);
                Ok(Some(Response::Line(
                    lenient_utf8(&line[..n]).trim().to_string(),
                )))
            }
            None if src.len() > MAX_LINE_LEN => {
                let len = src.len();
                src.clear();
                Ok(Some(Response::Overflow(len)))
            }
            None => Ok(None), // Not enough bytes yet
        }
    }
}

impl Encoder<Command> for ProtocolCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Command, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let cmd = item.as_str();
        dst.reserve(cmd.len() + 1);
        dst.put_slice(cmd.as_bytes());
        dst.put_u8(EOL);
        Ok(())
    }
}
