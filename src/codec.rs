// CA message header codec - the 16-byte short form plus the 8-byte extension.
//
// Two encode/decode paths live here on purpose. The queue-side helpers
// build outbound requests directly into the send queue, spilling across
// frame buffers. The standalone Cursor/BytesMut codec parses either header
// form from a contiguous slice and is what consumers (and the framing
// tests) re-parse circuit output with.

use std::io::Cursor;

use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;

use crate::circuit::{RequestError, RequestResult};
use crate::datatypes::{Command, DbrValue, MAX_TCP_BODY_BYTES};
use crate::recv_queue::RecvQueue;
use crate::send_queue::SendQueue;

/// Size of the short-form header common to every CA message.
pub const MSG_HEADER_SIZE: usize = 16;

/// Size of the extension that follows a sentinel short header.
pub const MSG_HEADER_EXTENSION_SIZE: usize = 8;

/// Sentinel in the 16-bit payload-size field announcing the extension.
pub const PAYLOAD_SIZE_SENTINEL: u16 = 0xffff;

/// Round a payload size up to the 8-byte message boundary.
pub const fn aligned_payload_size(n: u32) -> u32 {
    (n + 7) & !7
}

/// Codec errors for the standalone decoder.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("incomplete message header: need more data")]
    Incomplete,
}

/// One decoded CA message header.
///
/// `payload_size` and `element_count` are held widened to 32 bits; whether
/// the wire form was short or extended is decided by their magnitude when
/// encoding and by the sentinel when decoding.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MessageHeader {
    pub command: u16,
    pub payload_size: u32,
    pub data_type: u16,
    pub element_count: u32,
    pub cid: u32,
    pub available: u32,
}

impl MessageHeader {
    /// True when this header requires the extended form on the wire.
    pub fn extended(&self) -> bool {
        self.payload_size >= u32::from(PAYLOAD_SIZE_SENTINEL)
            || self.element_count >= u32::from(PAYLOAD_SIZE_SENTINEL)
    }

    /// Bytes this header occupies on the wire.
    pub fn wire_len(&self) -> usize {
        if self.extended() {
            MSG_HEADER_SIZE + MSG_HEADER_EXTENSION_SIZE
        } else {
            MSG_HEADER_SIZE
        }
    }

    /// Decode a complete header (short or extended) from a byte cursor.
    ///
    /// This path is independent of the receive queue parser and is what
    /// consumers (and the framing tests) re-parse circuit output with.
    pub fn decode(buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        if buf.remaining() < MSG_HEADER_SIZE {
            return Err(CodecError::Incomplete);
        }
        let command = buf.get_u16();
        let mut payload_size = u32::from(buf.get_u16());
        let data_type = buf.get_u16();
        let mut element_count = u32::from(buf.get_u16());
        let cid = buf.get_u32();
        let available = buf.get_u32();

        if payload_size == u32::from(PAYLOAD_SIZE_SENTINEL) {
            if buf.remaining() < MSG_HEADER_EXTENSION_SIZE {
                return Err(CodecError::Incomplete);
            }
            payload_size = buf.get_u32();
            element_count = buf.get_u32();
        }

        Ok(Self {
            command,
            payload_size,
            data_type,
            element_count,
            cid,
            available,
        })
    }

    /// Encode this header, choosing the short or extended form by magnitude.
    pub fn encode(&self, buf: &mut BytesMut) {
        if self.extended() {
            buf.put_u16(self.command);
            buf.put_u16(PAYLOAD_SIZE_SENTINEL);
            buf.put_u16(self.data_type);
            buf.put_u16(0);
            buf.put_u32(self.cid);
            buf.put_u32(self.available);
            buf.put_u32(self.payload_size);
            buf.put_u32(self.element_count);
        } else {
            buf.put_u16(self.command);
            buf.put_u16(self.payload_size as u16);
            buf.put_u16(self.data_type);
            buf.put_u16(self.element_count as u16);
            buf.put_u32(self.cid);
            buf.put_u32(self.available);
        }
    }

    /// Pop the six short-form fields off the receive queue. The caller has
    /// already established that 16 bytes are present.
    pub fn pop_short(queue: &mut RecvQueue) -> Option<Self> {
        Some(Self {
            command: queue.pop_u16()?,
            payload_size: u32::from(queue.pop_u16()?),
            data_type: queue.pop_u16()?,
            element_count: u32::from(queue.pop_u16()?),
            cid: queue.pop_u32()?,
            available: queue.pop_u32()?,
        })
    }

    /// True right after `pop_short` when the sentinel announced an extension.
    pub fn needs_extension(&self) -> bool {
        self.payload_size == u32::from(PAYLOAD_SIZE_SENTINEL)
    }

    /// Pop the 8-byte extension, replacing the sentinel fields.
    pub fn pop_extension(&mut self, queue: &mut RecvQueue) -> Option<()> {
        self.payload_size = queue.pop_u32()?;
        self.element_count = queue.pop_u32()?;
        Some(())
    }
}

/// Emit the six short-form fields as one unit. The message must already be
/// open on the queue.
pub(crate) fn push_short_header(
    queue: &mut SendQueue,
    command: Command,
    payload_size: u16,
    data_type: u16,
    element_count: u16,
    cid: u32,
    available: u32,
) {
    queue.push_u16(command as u16);
    queue.push_u16(payload_size);
    queue.push_u16(data_type);
    queue.push_u16(element_count);
    queue.push_u32(cid);
    queue.push_u32(available);
}

/// Open a message and emit its request header.
///
/// Small sizes use the 16-byte short form. When the payload size or element
/// count does not fit 16 bits the extended form is used, which is only legal
/// once both peers negotiated the extended-header floor (`extended_ok`);
/// otherwise the request is out of bounds. Bounds are checked before the
/// message is opened, so a rejected request leaves no half-built frame.
pub fn insert_request_header(
    queue: &mut SendQueue,
    command: Command,
    payload_size: u32,
    data_type: u16,
    element_count: u32,
    cid: u32,
    available: u32,
    extended_ok: bool,
) -> RequestResult<()> {
    let short_ok = payload_size < u32::from(PAYLOAD_SIZE_SENTINEL)
        && element_count < u32::from(PAYLOAD_SIZE_SENTINEL);
    if !short_ok && !extended_ok {
        return Err(RequestError::OutOfBounds);
    }

    queue.begin_msg();
    if short_ok {
        push_short_header(
            queue,
            command,
            payload_size as u16,
            data_type,
            element_count as u16,
            cid,
            available,
        );
    } else {
        push_short_header(queue, command, PAYLOAD_SIZE_SENTINEL, data_type, 0, cid, available);
        queue.push_u32(payload_size);
        queue.push_u32(element_count);
    }
    Ok(())
}

/// Open, emit and commit a payload-bearing request.
///
/// Computes the serialized size (a single string uses its actual length plus
/// terminator rather than a full cell), pads to the 8-byte message boundary
/// with zeros, and commits.
pub fn insert_request_with_payload(
    queue: &mut SendQueue,
    command: Command,
    value: &DbrValue,
    cid: u32,
    available: u32,
    extended_ok: bool,
) -> RequestResult<()> {
    let size = value.wire_size()?;
    if !extended_ok && size as usize > MAX_TCP_BODY_BYTES - MSG_HEADER_SIZE {
        return Err(RequestError::OutOfBounds);
    }
    let payload_size = aligned_payload_size(size);
    insert_request_header(
        queue,
        command,
        payload_size,
        value.dbr_type() as u16,
        value.element_count(),
        cid,
        available,
        extended_ok,
    )?;
    value.push_onto(queue);
    queue.push_zeros((payload_size - size) as usize);
    queue.commit_msg();
    Ok(())
}
