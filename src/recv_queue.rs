// ABOUTME: Ordered queue of received FrameBuffers consumed left-to-right
// ABOUTME: Byte-granular pops span buffer boundaries for the header parser

use std::collections::VecDeque;

use crate::buffer::FrameBuffer;

/// Append-only on the receive side; the parser consumes it left-to-right.
/// All primitives operate across [`FrameBuffer`] boundaries, so a header
/// split over two socket reads parses the same as a contiguous one.
#[derive(Debug, Default)]
pub struct RecvQueue {
    bufs: VecDeque<FrameBuffer>,
    occupied: usize,
}

impl RecvQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn occupied_bytes(&self) -> usize {
        self.occupied
    }

    /// Append a freshly-filled buffer.
    pub fn push_buffer(&mut self, buf: FrameBuffer) {
        self.occupied += buf.occupied_bytes();
        self.bufs.push_back(buf);
    }

    fn drop_exhausted_front(&mut self) {
        while self
            .bufs
            .front()
            .is_some_and(|b| b.occupied_bytes() == 0)
        {
            self.bufs.pop_front();
        }
    }

    pub fn pop_u8(&mut self) -> Option<u8> {
        self.drop_exhausted_front();
        let v = self.bufs.front_mut()?.pop_u8()?;
        self.occupied -= 1;
        Some(v)
    }

    pub fn pop_u16(&mut self) -> Option<u16> {
        Some(u16::from_be_bytes([self.pop_u8()?, self.pop_u8()?]))
    }

    pub fn pop_u32(&mut self) -> Option<u32> {
        Some(u32::from_be_bytes([
            self.pop_u8()?,
            self.pop_u8()?,
            self.pop_u8()?,
            self.pop_u8()?,
        ]))
    }

    /// Copy out as many of `dst.len()` bytes as are available, spanning
    /// buffers; returns the number copied.
    pub fn copy_out_bytes(&mut self, dst: &mut [u8]) -> usize {
        let mut copied = 0;
        while copied < dst.len() {
            self.drop_exhausted_front();
            let Some(front) = self.bufs.front_mut() else {
                break;
            };
            let n = front.copy_out(&mut dst[copied..]);
            if n == 0 {
                break;
            }
            copied += n;
        }
        self.occupied -= copied;
        copied
    }

    /// Discard up to `n` bytes without copying (oversize-message skipping);
    /// returns the number discarded.
    pub fn remove_bytes(&mut self, n: usize) -> usize {
        let mut removed = 0;
        while removed < n {
            self.drop_exhausted_front();
            let Some(front) = self.bufs.front_mut() else {
                break;
            };
            removed += front.skip(n - removed);
        }
        self.occupied -= removed;
        removed
    }
}
