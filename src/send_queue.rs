// ABOUTME: Ordered queue of FrameBuffers awaiting transmission
// ABOUTME: Messages are built begin/push/commit; only committed frames are poppable

use std::collections::VecDeque;

use crate::buffer::FrameBuffer;

const ZERO_PAD: [u8; 64] = [0u8; 64];

/// FIFO of [`FrameBuffer`]s plus at most one partially-built message.
///
/// Message construction is a three-step protocol: `begin_msg` opens a
/// building region, typed pushes append bytes (spilling into fresh buffers
/// as needed — a message may cross buffer boundaries), `commit_msg` closes
/// it. `pop_next_buffer_to_send` never hands out a buffer that still holds
/// part of an open message, so no partial frame can reach the wire.
#[derive(Debug)]
pub struct SendQueue {
    bufs: VecDeque<FrameBuffer>,
    /// Buffers popped over the queue's lifetime; `popped + index` is a
    /// stable address for a queued buffer.
    popped: u64,
    /// Stable address of the first buffer holding uncommitted bytes.
    first_uncommitted: Option<u64>,
    occupied: usize,
    soft_limit: usize,
    hard_limit: usize,
}

impl SendQueue {
    pub fn new(soft_limit: usize, hard_limit: usize) -> Self {
        Self {
            bufs: VecDeque::new(),
            popped: 0,
            first_uncommitted: None,
            occupied: 0,
            soft_limit,
            hard_limit,
        }
    }

    pub fn occupied_bytes(&self) -> usize {
        self.occupied
    }

    /// True when queuing `extra` more bytes would cross the soft ceiling at
    /// which the send task should be nudged.
    pub fn flush_early_threshold(&self, extra: usize) -> bool {
        self.occupied + extra > self.soft_limit
    }

    /// True when the hard ceiling is reached and producers must block.
    pub fn flush_block_threshold(&self, extra: usize) -> bool {
        self.occupied + extra >= self.hard_limit
    }

    /// Open a building region. At most one message may be open.
    pub fn begin_msg(&mut self) {
        debug_assert!(self.first_uncommitted.is_none());
        let first = match self.bufs.back() {
            // a full tail stays poppable: the message starts in the next buffer
            Some(b) if b.unoccupied_bytes() == 0 => self.popped + self.bufs.len() as u64,
            Some(_) => self.popped + self.bufs.len() as u64 - 1,
            None => {
                self.bufs.push_back(FrameBuffer::new());
                self.popped
            }
        };
        self.first_uncommitted = Some(first);
    }

    /// Close the open message; it becomes eligible for transmission.
    pub fn commit_msg(&mut self) {
        self.first_uncommitted = None;
    }

    fn tail_with_room(&mut self, need: usize) -> &mut FrameBuffer {
        let needs_fresh = self
            .bufs
            .back()
            .is_none_or(|b| b.unoccupied_bytes() < need);
        if needs_fresh {
            self.bufs.push_back(FrameBuffer::new());
        }
        self.bufs.back_mut().expect("queue holds at least one buffer")
    }

    pub fn push_u8(&mut self, v: u8) {
        self.tail_with_room(1).push_u8(v);
        self.occupied += 1;
    }

    pub fn push_u16(&mut self, v: u16) {
        self.tail_with_room(2).push_u16(v);
        self.occupied += 2;
    }

    pub fn push_u32(&mut self, v: u32) {
        self.tail_with_room(4).push_u32(v);
        self.occupied += 4;
    }

    pub fn push_f32(&mut self, v: f32) {
        self.tail_with_room(4).push_f32(v);
        self.occupied += 4;
    }

    pub fn push_f64(&mut self, v: f64) {
        self.tail_with_room(8).push_f64(v);
        self.occupied += 8;
    }

    /// Copy exactly `len` bytes of `src`, no terminator logic.
    pub fn push_string(&mut self, src: &[u8], len: usize) {
        debug_assert!(len <= src.len());
        let mut copied = 0;
        while copied < len {
            let taken = self.tail_with_room(1).push_bytes(&src[copied..len]);
            copied += taken;
        }
        self.occupied += len;
    }

    /// Append `n` zero bytes (message-boundary padding, string cell fill).
    pub fn push_zeros(&mut self, n: usize) {
        let mut left = n;
        while left > 0 {
            let chunk = left.min(ZERO_PAD.len());
            self.push_string(&ZERO_PAD, chunk);
            left -= chunk;
        }
    }

    /// The oldest fully-committed buffer, or `None`. A buffer containing the
    /// tail of an open message is never returned.
    pub fn pop_next_buffer_to_send(&mut self) -> Option<FrameBuffer> {
        if self.first_uncommitted == Some(self.popped) {
            return None;
        }
        let buf = self.bufs.pop_front()?;
        self.popped += 1;
        self.occupied -= buf.occupied_bytes();
        Some(buf)
    }

    /// Drop everything queued (teardown discard).
    pub fn clear(&mut self) {
        self.popped += self.bufs.len() as u64;
        self.bufs.clear();
        self.occupied = 0;
        self.first_uncommitted = None;
    }
}
