// ABOUTME: Services a circuit consumes from its owning client context
// ABOUTME: Callback gate, buffer pools, identity strings and the response sink trait

use std::os::fd::RawFd;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;

use crate::buffer::FrameBuffer;
use crate::circuit::Circuit;
use crate::codec::MessageHeader;
use crate::datatypes::MAX_TCP_BODY_BYTES;

/// Tunables and identity supplied by the circuit's owner.
#[derive(Clone, Debug)]
pub struct ClientContextConfig {
    /// Client user name announced in the CLIENT_NAME frame
    pub user_name: String,
    /// Client host name announced in the HOST_NAME frame
    pub host_name: String,
    /// One deadline shared by connect, per-send writes and the
    /// expected-receive-activity watchdog
    pub connection_timeout: Duration,
    /// Largest response body this client accepts; sizes the large buffer
    /// class (never below the small class)
    pub max_array_bytes: usize,
    /// When false, the receive task blocks on a one-byte peek before taking
    /// the callback gate so dispatch stays pumpable by user threads
    pub preemptive_callbacks: bool,
    /// Send-queue occupancy at which the send task is nudged early
    pub send_queue_soft_limit: usize,
    /// Send-queue occupancy at which producers must block
    pub send_queue_hard_limit: usize,
}

impl Default for ClientContextConfig {
    fn default() -> Self {
        Self {
            user_name: std::env::var("USER").unwrap_or_else(|_| "nobody".into()),
            host_name: std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".into()),
            connection_timeout: Duration::from_secs(30),
            max_array_bytes: MAX_TCP_BODY_BYTES,
            preemptive_callbacks: true,
            send_queue_soft_limit: 4 * FrameBuffer::CAPACITY,
            send_queue_hard_limit: 16 * FrameBuffer::CAPACITY,
        }
    }
}

/// Context-wide services shared by every circuit of one client.
///
/// Two coarse locks govern all circuits: each circuit's primary lock (its
/// own shared state) and this context's callback gate, which serializes
/// response dispatch across circuits. Lock order is always gate first,
/// primary second.
pub struct ClientContext {
    config: ClientContextConfig,
    callback_gate: AsyncMutex<()>,
    small_pool: Arc<BufferPool>,
    large_pool: Arc<BufferPool>,
}

impl ClientContext {
    pub fn new(mut config: ClientContextConfig) -> Arc<Self> {
        config.max_array_bytes = config.max_array_bytes.max(MAX_TCP_BODY_BYTES);
        let large = config.max_array_bytes;
        Arc::new(Self {
            config,
            callback_gate: AsyncMutex::new(()),
            small_pool: Arc::new(BufferPool::new(MAX_TCP_BODY_BYTES)),
            large_pool: Arc::new(BufferPool::new(large)),
        })
    }

    pub fn user_name(&self) -> &str {
        &self.config.user_name
    }

    pub fn host_name(&self) -> &str {
        &self.config.host_name
    }

    pub fn connection_timeout(&self) -> Duration {
        self.config.connection_timeout
    }

    pub fn preemptive_callbacks_enabled(&self) -> bool {
        self.config.preemptive_callbacks
    }

    pub fn small_buffer_bytes(&self) -> usize {
        self.small_pool.buf_bytes
    }

    pub fn large_buffer_bytes(&self) -> usize {
        self.large_pool.buf_bytes
    }

    pub(crate) fn send_queue_limits(&self) -> (usize, usize) {
        (
            self.config.send_queue_soft_limit,
            self.config.send_queue_hard_limit,
        )
    }

    pub fn allocate_small_buffer(&self) -> PooledBuf {
        self.small_pool.allocate()
    }

    pub fn allocate_large_buffer(&self) -> PooledBuf {
        self.large_pool.allocate()
    }

    /// Take the context-wide callback gate. The returned guard is the proof
    /// of serialization threaded through response dispatch and shutdown.
    pub async fn lock_callbacks(&self) -> CallbackGuard<'_> {
        CallbackGuard {
            _gate: self.callback_gate.lock().await,
        }
    }
}

impl std::fmt::Debug for ClientContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientContext")
            .field("user_name", &self.config.user_name)
            .field("host_name", &self.config.host_name)
            .field("max_array_bytes", &self.config.max_array_bytes)
            .finish_non_exhaustive()
    }
}

/// Proof that the context callback gate is held.
pub struct CallbackGuard<'a> {
    _gate: tokio::sync::MutexGuard<'a, ()>,
}

/// Where a circuit delivers its inbound traffic and fd lifecycle events.
/// Every method is invoked with the callback gate held.
pub trait ResponseSink: Send + Sync + 'static {
    /// Dispatch one inbound message. Returning `false` reports a protocol
    /// violation and disconnects the circuit.
    fn execute_response(
        &self,
        guard: &mut CallbackGuard<'_>,
        circuit: &Circuit,
        header: &MessageHeader,
        body: &[u8],
    ) -> bool;

    /// The circuit's socket exists and is registered.
    fn fd_created(&self, _guard: &mut CallbackGuard<'_>, _fd: RawFd) {}

    /// The circuit's socket is about to go away. Called exactly once.
    fn fd_destroyed(&self, _guard: &mut CallbackGuard<'_>, _fd: RawFd) {}
}

/// What a circuit needs to know about a channel when framing its requests.
/// Implemented by the owner's channel objects.
pub trait CircuitChannel {
    fn connected(&self) -> bool;
    /// Client-assigned channel id
    fn cid(&self) -> u32;
    /// Server-assigned channel id
    fn sid(&self) -> u32;
    fn native_element_count(&self) -> u32;
    fn name(&self) -> &str;
}

/// Pool of fixed-size message body caches (the small and large TCP buffer
/// classes). Handles return themselves to their owning pool on drop, so an
/// upgraded circuit can never release a buffer to the wrong class.
pub struct BufferPool {
    buf_bytes: usize,
    free: Mutex<Vec<Box<[u8]>>>,
}

impl BufferPool {
    fn new(buf_bytes: usize) -> Self {
        Self {
            buf_bytes,
            free: Mutex::new(Vec::new()),
        }
    }

    fn allocate(self: &Arc<Self>) -> PooledBuf {
        let data = self
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
            .unwrap_or_else(|| vec![0u8; self.buf_bytes].into_boxed_slice());
        PooledBuf {
            data: Some(data),
            pool: Arc::clone(self),
        }
    }

    fn recycle(&self, data: Box<[u8]>) {
        self.free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(data);
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("buf_bytes", &self.buf_bytes)
            .finish_non_exhaustive()
    }
}

/// A message body cache checked out of a [`BufferPool`].
#[derive(Debug)]
pub struct PooledBuf {
    data: Option<Box<[u8]>>,
    pool: Arc<BufferPool>,
}

impl PooledBuf {
    pub fn capacity(&self) -> usize {
        self.pool.buf_bytes
    }
}

impl std::ops::Deref for PooledBuf {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.data.as_deref().expect("buffer present until drop")
    }
}

impl std::ops::DerefMut for PooledBuf {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.data.as_deref_mut().expect("buffer present until drop")
    }
}

impl Drop for PooledBuf {
    fn drop(&mut self) {
        if let Some(data) = self.data.take() {
            self.pool.recycle(data);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn large_class_never_smaller_than_small() {
        let ctx = ClientContext::new(ClientContextConfig {
            max_array_bytes: 1,
            ..Default::default()
        });
        assert_eq!(ctx.large_buffer_bytes(), ctx.small_buffer_bytes());

        let ctx = ClientContext::new(ClientContextConfig {
            max_array_bytes: 4 * MAX_TCP_BODY_BYTES,
            ..Default::default()
        });
        assert_eq!(ctx.large_buffer_bytes(), 4 * MAX_TCP_BODY_BYTES);
    }

    #[test]
    fn pooled_buffers_are_recycled() {
        let ctx = ClientContext::new(ClientContextConfig::default());
        let mut buf = ctx.allocate_small_buffer();
        buf[0] = 0xAA;
        assert_eq!(buf.capacity(), ctx.small_buffer_bytes());
        drop(buf);

        // the freed buffer comes back out of the pool
        let buf = ctx.allocate_small_buffer();
        assert_eq!(buf[0], 0xAA);
    }

    #[test]
    fn pools_are_independent() {
        let ctx = ClientContext::new(ClientContextConfig {
            max_array_bytes: 2 * MAX_TCP_BODY_BYTES,
            ..Default::default()
        });
        let small = ctx.allocate_small_buffer();
        let large = ctx.allocate_large_buffer();
        assert_eq!(small.capacity(), MAX_TCP_BODY_BYTES);
        assert_eq!(large.capacity(), 2 * MAX_TCP_BODY_BYTES);
    }
}
