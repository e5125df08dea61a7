//! Whole-PDU framing over a byte stream.

use std::io::Cursor;
use std::time::Duration;

use bytes::{Buf, BytesMut};
use dicom_ul::Pdu;
use dicom_ul::pdu::{PDU_HEADER_SIZE, read_pdu, write_pdu};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::AssociationError::{self, *};

/// A connection to a peer, read and written one PDU at a time.
pub struct PduStream<S> {
    stream: S,
    read_buffer: BytesMut,
    max_pdu_length: u32,
    strict: bool,
    idle_timeout: Option<Duration>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> PduStream<S> {
    /// `max_pdu_length` is the length we announce as our maximum. It must be within the
    /// range allowed by the standard (4096 to 131072 bytes).
    pub fn new(stream: S, max_pdu_length: u32) -> Self {
        Self {
            stream,
            read_buffer: BytesMut::with_capacity(max_pdu_length as usize),
            max_pdu_length,
            strict: false,
            idle_timeout: None,
        }
    }

    /// Whether incoming PDUs longer than our maximum are an error.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Give up on the peer when no data arrives for this long.
    pub fn idle_timeout(mut self, idle_timeout: Option<Duration>) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Read the next PDU.
    ///
    /// Returns `None` if the peer closed the connection between two PDUs.
    pub async fn read_pdu(&mut self) -> Result<Option<Pdu>, AssociationError> {
        loop {
            let mut cursor = Cursor::new(&self.read_buffer[..]);
            if let Some(pdu) = read_pdu(&mut cursor, self.max_pdu_length, self.strict)
                .map_err(|e| ReadPdu(Box::new(e)))?
            {
                let consumed = cursor.position() as usize;
                self.read_buffer.advance(consumed);
                return Ok(Some(pdu));
            }
            // a whole PDU is buffered, yet an item inside it claims more bytes than it holds
            if let Some(pdu_type) = buffered_pdu_type(&self.read_buffer) {
                return Err(MalformedPdu(pdu_type));
            }
            let n = match self.idle_timeout {
                Some(t) => tokio::time::timeout(t, self.stream.read_buf(&mut self.read_buffer))
                    .await
                    .map_err(|_| IdleTimeout(t))??,
                None => self.stream.read_buf(&mut self.read_buffer).await?,
            };
            if n == 0 {
                return if self.read_buffer.is_empty() {
                    Ok(None)
                } else {
                    Err(Io(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "connection closed in the middle of a PDU",
                    )))
                };
            }
        }
    }

    pub async fn write_pdu(&mut self, pdu: &Pdu) -> Result<(), AssociationError> {
        let mut buffer = Vec::with_capacity(256);
        write_pdu(&mut buffer, pdu).map_err(|e| WritePdu(Box::new(e)))?;
        self.stream.write_all(&buffer).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Close our side of the connection.
    pub async fn shutdown(&mut self) -> std::io::Result<()> {
        self.stream.shutdown().await
    }

}

/// Type of the PDU at the start of `buffer`, if all of its bytes are there.
fn buffered_pdu_type(buffer: &[u8]) -> Option<u8> {
    let header = buffer.get(..PDU_HEADER_SIZE as usize)?;
    let pdu_length = u32::from_be_bytes([header[2], header[3], header[4], header[5]]);
    let total = PDU_HEADER_SIZE as usize + pdu_length as usize;
    (buffer.len() >= total).then_some(header[0])
}
