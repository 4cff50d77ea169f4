// ABOUTME: Fixed-capacity byte buffer, the unit of queued wire I/O
// ABOUTME: One fill or flush moves at most one buffer with a single syscall

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::OwnedReadHalf;

/// A fixed-capacity byte buffer with an append cursor (written by producers)
/// and a consume cursor (advanced by readers). `consume <= append <= capacity`
/// always holds. Integer pushes use network byte order.
#[derive(Debug)]
pub struct FrameBuffer {
    data: Box<[u8; FrameBuffer::CAPACITY]>,
    append: usize,
    consume: usize,
}

impl FrameBuffer {
    pub const CAPACITY: usize = 16 * 1024;

    pub fn new() -> Self {
        Self {
            data: Box::new([0u8; Self::CAPACITY]),
            append: 0,
            consume: 0,
        }
    }

    pub fn occupied_bytes(&self) -> usize {
        self.append - self.consume
    }

    pub fn unoccupied_bytes(&self) -> usize {
        Self::CAPACITY - self.append
    }

    /// The readable region: appended but not yet consumed.
    pub fn readable(&self) -> &[u8] {
        &self.data[self.consume..self.append]
    }

    fn push_raw(&mut self, bytes: &[u8]) -> bool {
        if self.unoccupied_bytes() < bytes.len() {
            return false;
        }
        self.data[self.append..self.append + bytes.len()].copy_from_slice(bytes);
        self.append += bytes.len();
        true
    }

    pub fn push_u8(&mut self, v: u8) -> bool {
        self.push_raw(&[v])
    }

    pub fn push_u16(&mut self, v: u16) -> bool {
        self.push_raw(&v.to_be_bytes())
    }

    pub fn push_u32(&mut self, v: u32) -> bool {
        self.push_raw(&v.to_be_bytes())
    }

    pub fn push_f32(&mut self, v: f32) -> bool {
        self.push_raw(&v.to_be_bytes())
    }

    pub fn push_f64(&mut self, v: f64) -> bool {
        self.push_raw(&v.to_be_bytes())
    }

    /// Copy exactly `len` bytes of `src`, no terminator logic. Refused when
    /// the remaining capacity is short.
    pub fn push_string(&mut self, src: &[u8], len: usize) -> bool {
        debug_assert!(len <= src.len());
        self.push_raw(&src[..len])
    }

    /// Copy in as much of `src` as fits; returns the number of bytes taken.
    pub fn push_bytes(&mut self, src: &[u8]) -> usize {
        let n = src.len().min(self.unoccupied_bytes());
        self.data[self.append..self.append + n].copy_from_slice(&src[..n]);
        self.append += n;
        n
    }

    pub fn pop_u8(&mut self) -> Option<u8> {
        if self.consume == self.append {
            return None;
        }
        let v = self.data[self.consume];
        self.consume += 1;
        Some(v)
    }

    /// Copy out up to `dst.len()` bytes; returns the number copied.
    pub fn copy_out(&mut self, dst: &mut [u8]) -> usize {
        let n = dst.len().min(self.occupied_bytes());
        dst[..n].copy_from_slice(&self.data[self.consume..self.consume + n]);
        self.consume += n;
        n
    }

    /// Discard up to `n` readable bytes; returns the number discarded.
    pub fn skip(&mut self, n: usize) -> usize {
        let n = n.min(self.occupied_bytes());
        self.consume += n;
        n
    }

    /// One read syscall into the remaining capacity. `Ok(0)` means the peer
    /// ended the stream (or the buffer was already full).
    pub async fn fill_from_wire<R>(&mut self, wire: &mut R) -> io::Result<usize>
    where
        R: AsyncRead + Unpin,
    {
        let n = wire.read(&mut self.data[self.append..]).await?;
        self.append += n;
        Ok(n)
    }

    /// Non-blocking fill used by the receive burst loop to drain bytes the
    /// kernel already holds. `Ok(None)` means nothing is pending right now;
    /// `Ok(Some(0))` means end of stream.
    pub fn try_fill_from_wire(&mut self, wire: &OwnedReadHalf) -> io::Result<Option<usize>> {
        match wire.try_read(&mut self.data[self.append..]) {
            Ok(n) => {
                self.append += n;
                Ok(Some(n))
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Write the whole readable region to the wire.
    pub async fn flush_to_wire<W>(&self, wire: &mut W) -> io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        wire.write_all(self.readable()).await
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursors_track_push_and_pop() {
        let mut buf = FrameBuffer::new();
        assert_eq!(buf.occupied_bytes(), 0);

        assert!(buf.push_u16(0xA1B2));
        assert!(buf.push_u32(0xC3D4E5F6));
        assert_eq!(buf.occupied_bytes(), 6);
        assert_eq!(buf.readable(), &[0xA1, 0xB2, 0xC3, 0xD4, 0xE5, 0xF6]);

        assert_eq!(buf.pop_u8(), Some(0xA1));
        assert_eq!(buf.occupied_bytes(), 5);

        let mut out = [0u8; 3];
        assert_eq!(buf.copy_out(&mut out), 3);
        assert_eq!(out, [0xB2, 0xC3, 0xD4]);
        assert_eq!(buf.skip(10), 2);
        assert_eq!(buf.pop_u8(), None);
    }

    #[test]
    fn scalar_push_refused_when_full() {
        let mut buf = FrameBuffer::new();
        let filler = vec![0u8; FrameBuffer::CAPACITY - 3];
        assert_eq!(buf.push_bytes(&filler), filler.len());
        assert!(!buf.push_u32(1));
        assert!(buf.push_u16(1));
        assert!(buf.push_u8(1));
        assert!(!buf.push_u8(1));
        assert_eq!(buf.unoccupied_bytes(), 0);
    }

    #[test]
    fn push_bytes_takes_what_fits() {
        let mut buf = FrameBuffer::new();
        let big = vec![7u8; FrameBuffer::CAPACITY + 100];
        assert_eq!(buf.push_bytes(&big), FrameBuffer::CAPACITY);
        assert_eq!(buf.push_bytes(&big), 0);
    }

    #[test]
    fn push_string_is_all_or_nothing() {
        let mut buf = FrameBuffer::new();
        assert!(buf.push_string(b"host-a\0x", 7));
        assert_eq!(buf.readable(), b"host-a\0");

        let filler = vec![0u8; FrameBuffer::CAPACITY - 10];
        buf.push_bytes(&filler);
        assert!(!buf.push_string(b"too long for the tail", 21));
    }

    #[test]
    fn float_pushes_are_big_endian() {
        let mut buf = FrameBuffer::new();
        buf.push_f64(1.0);
        assert_eq!(buf.readable(), &1.0f64.to_be_bytes());
    }
}
