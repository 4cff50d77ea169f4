// ABOUTME: The virtual circuit - one client-to-server TCP connection
// ABOUTME: Owns state, queues and watchdogs; exposes request APIs and shutdown

pub mod error;
pub(crate) mod flow_control;
pub(crate) mod incoming;
pub(crate) mod recv_loop;
pub(crate) mod send_loop;
pub(crate) mod watchdog;

pub use error::{RequestError, RequestResult};

use std::io;
use std::net::SocketAddr;
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::codec::{
    MSG_HEADER_SIZE, MessageHeader, aligned_payload_size, insert_request_header,
    insert_request_with_payload, push_short_header,
};
use crate::context::{CallbackGuard, CircuitChannel, ClientContext, ResponseSink};
use crate::datatypes::{
    CA_MINOR_PROTOCOL_REVISION, Command, DbrValue, MAX_TCP_BODY_BYTES, ProtocolVersion, dbr,
};
use crate::send_queue::SendQueue;

use flow_control::FlowController;
use watchdog::{RecvDog, SendDog};

/// Connection state of one circuit. Transitions are monotonic per
/// connection attempt; `Disconnected` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum CircuitState {
    Connecting = 0,
    Connected = 1,
    Disconnected = 2,
}

impl CircuitState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => CircuitState::Connecting,
            1 => CircuitState::Connected,
            _ => CircuitState::Disconnected,
        }
    }
}

/// State behind the primary lock.
pub(crate) struct Shared {
    pub send_queue: SendQueue,
    pub flow: FlowController,
    /// Direction last told to the server: true while EVENTS_OFF is in force
    pub flow_control_active: bool,
    pub echo_request_pending: bool,
    pub early_flush: bool,
    pub recv_process_postponed_flush: bool,
    /// Producers currently parked in backlog blocking
    pub blocking_for_flush: u32,
    /// Grows with every flushed byte, reset by any successful receive
    pub unacknowledged_send_bytes: usize,
}

/// Event with a sticky set flag (signal-once, observable late).
#[derive(Debug, Default)]
pub(crate) struct FlagEvent {
    set: AtomicBool,
    notify: Notify,
}

impl FlagEvent {
    pub fn signal(&self) {
        self.set.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub async fn wait(&self) {
        loop {
            let signalled = self.notify.notified();
            tokio::pin!(signalled);
            signalled.as_mut().enable();
            if self.set.load(Ordering::SeqCst) {
                return;
            }
            signalled.await;
        }
    }

    pub async fn wait_timeout(&self, budget: Duration) -> bool {
        tokio::time::timeout(budget, self.wait()).await.is_ok()
    }
}

/// One client-to-server TCP virtual circuit.
///
/// A circuit multiplexes channel creation, reads, writes, subscription
/// events and liveness probes for every channel sharing one
/// {host, priority} pair. Two background tasks service it: the receive
/// task (socket reads, frame parsing, response dispatch) and the send task
/// (queue draining, flow-control and echo control frames). Request APIs may
/// be called concurrently from any task; they only commit messages to the
/// send queue and never touch the socket.
///
/// Lifecycle: [`Circuit::spawn`] starts the receive task, which connects,
/// queues the handshake (VERSION, then the identity frames) and starts the
/// send task. Failure of either direction ends in the terminal
/// `Disconnected` state; the owner observes it via [`Circuit::state`],
/// [`Circuit::wait_connected`] or [`Circuit::join`] and decides about
/// reconnection.
pub struct Circuit {
    ctx: Arc<ClientContext>,
    sink: Box<dyn ResponseSink>,
    peer: SocketAddr,
    priority: u16,
    minor: ProtocolVersion,

    state: AtomicU8,
    state_changed: Notify,
    /// Raw fd snapshot for teardown; -1 until connected
    sock_fd: AtomicI32,
    /// SO_SNDBUF as reported by the socket library
    send_buf_bytes: AtomicUsize,
    sock_close_completed: AtomicBool,

    shared: Mutex<Shared>,
    send_flush: Notify,
    flush_unblock: Notify,
    send_exited: FlagEvent,
    recv_exited: FlagEvent,

    send_dog: SendDog,
    recv_dog: RecvDog,
}

impl Circuit {
    pub(crate) fn new(
        ctx: Arc<ClientContext>,
        peer: SocketAddr,
        priority: u16,
        minor: ProtocolVersion,
        sink: Box<dyn ResponseSink>,
    ) -> Arc<Self> {
        let (soft, hard) = ctx.send_queue_limits();
        let deadline = ctx.connection_timeout();
        Arc::new(Self {
            ctx,
            sink,
            peer,
            priority,
            minor,
            state: AtomicU8::new(CircuitState::Connecting as u8),
            state_changed: Notify::new(),
            sock_fd: AtomicI32::new(-1),
            send_buf_bytes: AtomicUsize::new(0),
            sock_close_completed: AtomicBool::new(false),
            shared: Mutex::new(Shared {
                send_queue: SendQueue::new(soft, hard),
                flow: FlowController::default(),
                flow_control_active: false,
                echo_request_pending: false,
                early_flush: false,
                recv_process_postponed_flush: false,
                blocking_for_flush: 0,
                unacknowledged_send_bytes: 0,
            }),
            send_flush: Notify::new(),
            flush_unblock: Notify::new(),
            send_exited: FlagEvent::default(),
            recv_exited: FlagEvent::default(),
            send_dog: SendDog::new(deadline),
            recv_dog: RecvDog::new(deadline),
        })
    }

    /// Create the circuit and start its receive task. The receive task
    /// connects, queues the handshake and starts the send task.
    pub fn spawn(
        ctx: Arc<ClientContext>,
        peer: SocketAddr,
        priority: u16,
        minor: ProtocolVersion,
        sink: Box<dyn ResponseSink>,
    ) -> Arc<Self> {
        let circuit = Self::new(ctx, peer, priority, minor, sink);
        tokio::spawn(recv_loop::run(Arc::clone(&circuit)));
        circuit
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn priority(&self) -> u16 {
        self.priority
    }

    pub fn minor_version(&self) -> ProtocolVersion {
        self.minor
    }

    pub(crate) fn ctx(&self) -> &ClientContext {
        &self.ctx
    }

    pub fn state(&self) -> CircuitState {
        CircuitState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Forward-only state transition; returns the previous state.
    pub(crate) fn transition(&self, to: CircuitState) -> CircuitState {
        let mut cur = self.state.load(Ordering::SeqCst);
        loop {
            if cur >= to as u8 {
                return CircuitState::from_u8(cur);
            }
            match self
                .state
                .compare_exchange(cur, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(prev) => {
                    self.state_changed.notify_waiters();
                    return CircuitState::from_u8(prev);
                }
                Err(now) => cur = now,
            }
        }
    }

    /// Resolves `true` once the circuit reaches Connected, `false` when it
    /// went straight to Disconnected.
    pub async fn wait_connected(&self) -> bool {
        loop {
            let changed = self.state_changed.notified();
            tokio::pin!(changed);
            changed.as_mut().enable();
            match self.state() {
                CircuitState::Connected => return true,
                CircuitState::Disconnected => return false,
                CircuitState::Connecting => changed.await,
            }
        }
    }

    /// Resolves once both background tasks have exited.
    pub async fn join(&self) {
        self.recv_exited.wait().await;
        self.send_exited.wait().await;
    }

    pub(crate) fn shared(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn nudge_if_above_early_threshold(&self, shared: &Shared, extra: usize) {
        if shared.send_queue.flush_early_threshold(extra) {
            self.send_flush.notify_one();
        }
    }

    // ---- flush surface -------------------------------------------------

    /// Wake the send task to drain the queue.
    pub fn flush_request(&self) {
        self.send_flush.notify_one();
    }

    /// Wake the send task once, the first time the queue crosses the soft
    /// ceiling. The latch clears when the queue next drains.
    pub fn flush_request_if_above_early_threshold(&self) {
        let mut shared = self.shared();
        if !shared.early_flush && shared.send_queue.flush_early_threshold(0) {
            shared.early_flush = true;
            drop(shared);
            self.send_flush.notify_one();
        }
    }

    /// True when the hard send-queue ceiling is reached.
    pub fn flush_block_threshold(&self) -> bool {
        self.shared().send_queue.flush_block_threshold(0)
    }

    /// Called from response dispatch: flush when the parser next pauses.
    pub fn request_recv_process_postponed_flush(&self) {
        self.shared().recv_process_postponed_flush = true;
    }

    pub(crate) fn flush_if_recv_process_requested(&self) {
        let mut shared = self.shared();
        if shared.recv_process_postponed_flush {
            shared.recv_process_postponed_flush = false;
            drop(shared);
            self.send_flush.notify_one();
        }
    }

    /// Park until the send backlog falls below the hard ceiling or the
    /// circuit disconnects. Counted, so teardown can wait for all parked
    /// producers to leave.
    pub async fn block_until_send_backlog_reasonable(&self) {
        self.shared().blocking_for_flush += 1;
        loop {
            let released = self.flush_unblock.notified();
            tokio::pin!(released);
            released.as_mut().enable();

            let blocked = self.state() == CircuitState::Connected
                && self.shared().send_queue.flush_block_threshold(0);
            if !blocked {
                break;
            }
            released.await;
        }
        let mut shared = self.shared();
        shared.blocking_for_flush -= 1;
        if shared.blocking_for_flush == 0 {
            drop(shared);
            self.flush_unblock.notify_waiters();
        }
    }

    // ---- control frames ------------------------------------------------

    fn queue_plain_command(&self, command: Command) {
        let mut shared = self.shared();
        self.nudge_if_above_early_threshold(&shared, MSG_HEADER_SIZE);
        shared.send_queue.begin_msg();
        push_short_header(&mut shared.send_queue, command, 0, 0, 0, 0, 0);
        shared.send_queue.commit_msg();
    }

    /// Tell the server to pause event emission (the client is busy).
    pub(crate) fn enable_flow_control_request(&self) {
        self.queue_plain_command(Command::EventsOff);
    }

    /// Tell the server to resume event emission.
    pub(crate) fn disable_flow_control_request(&self) {
        self.queue_plain_command(Command::EventsOn);
    }

    /// Announce this client's protocol revision. Also doubles as the NOOP
    /// surrogate for echo on pre-echo peers.
    pub fn version_request(&self) {
        let mut shared = self.shared();
        self.nudge_if_above_early_threshold(&shared, MSG_HEADER_SIZE);
        shared.send_queue.begin_msg();
        push_short_header(
            &mut shared.send_queue,
            Command::Version,
            0,
            self.priority,
            CA_MINOR_PROTOCOL_REVISION,
            0,
            0,
        );
        shared.send_queue.commit_msg();
    }

    pub fn echo_request(&self) {
        self.queue_plain_command(Command::Echo);
    }

    /// Latch an echo for the send task's next wake. Returns `true` when a
    /// real ECHO will go out, `false` when the peer predates echo and a
    /// VERSION frame stands in.
    pub fn set_echo_request_pending(&self) -> bool {
        self.shared().echo_request_pending = true;
        self.flush_request();
        self.minor.v43_ok()
    }

    // ---- identity ------------------------------------------------------

    fn identity_request(&self, command: Command, name: &str) {
        let size = name.len() + 1;
        let post = aligned_payload_size(size as u32) as usize;
        debug_assert!(post < 0xffff);

        let mut shared = self.shared();
        self.nudge_if_above_early_threshold(&shared, post + MSG_HEADER_SIZE);
        shared.send_queue.begin_msg();
        push_short_header(&mut shared.send_queue, command, post as u16, 0, 0, 0, 0);
        shared.send_queue.push_string(name.as_bytes(), name.len());
        shared.send_queue.push_zeros(post - name.len());
        shared.send_queue.commit_msg();
    }

    /// Announce the client host name (silently skipped on pre-v4.1 peers).
    pub fn host_name_set_request(&self) {
        if !self.minor.v41_ok() {
            return;
        }
        self.identity_request(Command::HostName, self.ctx.host_name());
    }

    /// Announce the client user name (silently skipped on pre-v4.1 peers).
    pub fn user_name_set_request(&self) {
        if !self.minor.v41_ok() {
            return;
        }
        self.identity_request(Command::ClientName, self.ctx.user_name());
    }

    // ---- channel requests ----------------------------------------------

    /// Fire-and-forget write to a connected channel.
    pub fn write_request(
        &self,
        chan: &dyn CircuitChannel,
        value: &DbrValue,
    ) -> RequestResult<()> {
        if !chan.connected() {
            return Err(RequestError::NotConnected);
        }
        let size = aligned_payload_size(value.wire_size()?) as usize;
        let mut shared = self.shared();
        self.nudge_if_above_early_threshold(&shared, size + MSG_HEADER_SIZE);
        insert_request_with_payload(
            &mut shared.send_queue,
            Command::Write,
            value,
            chan.sid(),
            chan.cid(),
            self.minor.v49_ok(),
        )
    }

    /// Confirmed write; the reply is matched by `io_id`.
    pub fn write_notify_request(
        &self,
        chan: &dyn CircuitChannel,
        io_id: u32,
        value: &DbrValue,
    ) -> RequestResult<()> {
        if !chan.connected() {
            return Err(RequestError::NotConnected);
        }
        if !self.minor.v41_ok() {
            return Err(RequestError::UnsupportedByService);
        }
        let size = aligned_payload_size(value.wire_size()?) as usize;
        let mut shared = self.shared();
        self.nudge_if_above_early_threshold(&shared, size + MSG_HEADER_SIZE);
        insert_request_with_payload(
            &mut shared.send_queue,
            Command::WriteNotify,
            value,
            chan.sid(),
            io_id,
            self.minor.v49_ok(),
        )
    }

    /// Largest element count whose response still fits the receive body
    /// cache for this peer.
    fn max_response_elements(&self, dtype: u16) -> RequestResult<u64> {
        let Some(fixed) = dbr::dbr_size_n(dtype, 1) else {
            return Err(RequestError::BadType);
        };
        let Some(element) = dbr::dbr_element_size(dtype) else {
            return Err(RequestError::BadType);
        };
        let max_bytes = if self.minor.v49_ok() {
            self.ctx.large_buffer_bytes() as u64
        } else {
            MAX_TCP_BODY_BYTES as u64
        };
        Ok(max_bytes.saturating_sub(fixed) / u64::from(element))
    }

    /// Confirmed read; empty body, count carries the element request.
    pub fn read_notify_request(
        &self,
        chan: &dyn CircuitChannel,
        io_id: u32,
        dtype: u16,
        n_elem: u32,
    ) -> RequestResult<()> {
        if !chan.connected() {
            return Err(RequestError::NotConnected);
        }
        if !dbr::dbr_type_is_valid(dtype) {
            return Err(RequestError::BadType);
        }
        if n_elem > chan.native_element_count() {
            return Err(RequestError::OutOfBounds);
        }
        if u64::from(n_elem) > self.max_response_elements(dtype)? {
            return Err(RequestError::MsgBodyCacheTooSmall);
        }

        let mut shared = self.shared();
        self.nudge_if_above_early_threshold(&shared, MSG_HEADER_SIZE);
        insert_request_header(
            &mut shared.send_queue,
            Command::ReadNotify,
            0,
            dtype,
            n_elem,
            chan.sid(),
            io_id,
            self.minor.v49_ok(),
        )?;
        shared.send_queue.commit_msg();
        Ok(())
    }

    /// Claim a channel on this circuit. The name travels in the payload at
    /// v4.4+; older servers key on the server-assigned id instead.
    pub fn create_channel_request(&self, chan: &dyn CircuitChannel) -> RequestResult<()> {
        let (identity, name) = if self.minor.v44_ok() {
            (chan.cid(), chan.name())
        } else {
            (chan.sid(), "")
        };
        let name_len = if name.is_empty() { 0 } else { name.len() + 1 };
        let post = aligned_payload_size(name_len as u32) as usize;
        if post >= usize::from(u16::MAX) {
            return Err(RequestError::UnsupportedByService);
        }

        let mut shared = self.shared();
        self.nudge_if_above_early_threshold(&shared, post + MSG_HEADER_SIZE);
        shared.send_queue.begin_msg();
        // the available field carries the minor revision since v4.1
        push_short_header(
            &mut shared.send_queue,
            Command::CreateChannel,
            post as u16,
            0,
            0,
            identity,
            u32::from(CA_MINOR_PROTOCOL_REVISION),
        );
        if !name.is_empty() {
            shared.send_queue.push_string(name.as_bytes(), name.len());
            shared.send_queue.push_zeros(post - name.len());
        }
        shared.send_queue.commit_msg();
        Ok(())
    }

    /// Release a channel. The cid field carries the server id; the client
    /// id rides in available.
    pub fn clear_channel_request(&self, sid: u32, cid: u32) {
        let mut shared = self.shared();
        self.nudge_if_above_early_threshold(&shared, MSG_HEADER_SIZE);
        shared.send_queue.begin_msg();
        push_short_header(&mut shared.send_queue, Command::ClearChannel, 0, 0, 0, sid, cid);
        shared.send_queue.commit_msg();
    }

    /// Register a subscription. Quietly does nothing on a disconnected
    /// channel: the owner re-issues subscriptions on reconnect.
    pub fn subscription_add_request(
        &self,
        chan: &dyn CircuitChannel,
        subscription_id: u32,
        dtype: u16,
        n_elem: u32,
        mask: u32,
    ) -> RequestResult<()> {
        if !chan.connected() {
            return Ok(());
        }
        let mask = if mask > 0xffff {
            warn!(mask, "truncated unusual event select mask");
            mask & 0xffff
        } else {
            mask
        };
        if !dbr::dbr_type_is_valid(dtype) {
            return Err(RequestError::BadType);
        }
        if u64::from(n_elem) > self.max_response_elements(dtype)? {
            return Err(RequestError::MsgBodyCacheTooSmall);
        }

        let mut shared = self.shared();
        self.nudge_if_above_early_threshold(&shared, 2 * MSG_HEADER_SIZE);
        insert_request_header(
            &mut shared.send_queue,
            Command::EventAdd,
            16,
            dtype,
            n_elem,
            chan.sid(),
            subscription_id,
            self.minor.v49_ok(),
        )?;
        // low, high and to-value thresholds are unused by current servers
        shared.send_queue.push_f32(0.0);
        shared.send_queue.push_f32(0.0);
        shared.send_queue.push_f32(0.0);
        shared.send_queue.push_u16(mask as u16);
        shared.send_queue.push_u16(0);
        shared.send_queue.commit_msg();
        Ok(())
    }

    /// Cancel a subscription; type and count echo the registration.
    pub fn subscription_cancel_request(
        &self,
        chan: &dyn CircuitChannel,
        subscription_id: u32,
        dtype: u16,
        n_elem: u32,
    ) -> RequestResult<()> {
        let mut shared = self.shared();
        self.nudge_if_above_early_threshold(&shared, MSG_HEADER_SIZE);
        insert_request_header(
            &mut shared.send_queue,
            Command::EventCancel,
            0,
            dtype,
            n_elem,
            chan.sid(),
            subscription_id,
            self.minor.v49_ok(),
        )?;
        shared.send_queue.commit_msg();
        Ok(())
    }

    // ---- inbound dispatch ----------------------------------------------

    pub(crate) fn dispatch_response(
        &self,
        guard: &mut CallbackGuard<'_>,
        header: &MessageHeader,
        body: &[u8],
    ) -> bool {
        self.sink.execute_response(guard, self, header, body)
    }

    // ---- error classification ------------------------------------------

    pub(crate) fn disconnect_on_recv_error(&self, err: &io::Error) {
        if !is_silent_disconnect(err.kind()) {
            warn!(peer = %self.peer, error = %err, "disconnecting from server");
        }
        self.transition(CircuitState::Disconnected);
    }

    pub(crate) fn disconnect_on_send_error(&self, err: &io::Error) {
        if !is_silent_disconnect(err.kind()) {
            warn!(peer = %self.peer, error = %err, "unexpected TCP send error");
        }
        self.transition(CircuitState::Disconnected);
    }

    // ---- shutdown ------------------------------------------------------

    /// Graceful teardown: committed frames already handed to the socket may
    /// still be delivered.
    pub async fn clean_shutdown(&self) {
        let mut guard = self.ctx.lock_callbacks().await;
        self.shutdown(&mut guard, false);
    }

    /// Abortive teardown: pending data in both directions is discarded.
    pub async fn forced_shutdown(&self) {
        let mut guard = self.ctx.lock_callbacks().await;
        self.shutdown(&mut guard, true);
    }

    /// Core teardown, callable with the callback gate already held (for
    /// sinks reacting inside dispatch). Idempotent: the fd leaves the sink
    /// and the socket is shut down exactly once.
    pub fn shutdown(&self, guard: &mut CallbackGuard<'_>, discard: bool) {
        if self.sock_close_completed.swap(true, Ordering::SeqCst) {
            return;
        }
        let fd = self.sock_fd.load(Ordering::SeqCst);
        if fd >= 0 {
            self.sink.fd_destroyed(guard, fd);
        }
        let previous = self.transition(CircuitState::Disconnected);
        if fd >= 0 {
            if discard {
                set_abortive_linger(fd);
            }
            // close() alone does not wake a blocked reader everywhere, so
            // shut the socket down at the protocol level first; the fd
            // itself closes when the owned halves drop
            if previous == CircuitState::Connected {
                raw_socket_shutdown(fd);
            }
        }
        self.send_flush.notify_one();
    }

    /// Orderly wind-down run by the receive task after its loop exits.
    pub(crate) async fn stop_threads(&self) {
        self.clean_shutdown().await;
        self.recv_dog.cancel();

        const SHUTDOWN_DELAY: Duration = Duration::from_secs(15);
        while !self.send_exited.wait_timeout(SHUTDOWN_DELAY).await {
            warn!(
                peer = %self.peer,
                "gave up waiting for socket shutdown to stop the send task; forcing it"
            );
            let fd = self.sock_fd.load(Ordering::SeqCst);
            if fd >= 0 {
                raw_socket_shutdown(fd);
            }
            self.send_flush.notify_one();
        }

        // wake producers parked on the backlog and wait for them to leave
        self.flush_unblock.notify_waiters();
        while self.shared().blocking_for_flush > 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            self.flush_unblock.notify_waiters();
        }

        // in-flight pokes may have rearmed the dog
        self.recv_dog.cancel();
        debug!(peer = %self.peer, "circuit wound down");
    }
}

impl std::fmt::Debug for Circuit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("Circuit");
        s.field("peer", &self.peer)
            .field("version", &self.minor.to_string())
            .field("priority", &self.priority)
            .field("state", &self.state());
        if let Ok(shared) = self.shared.try_lock() {
            s.field("flow_control_active", &shared.flow_control_active)
                .field("busy_state_detected", &shared.flow.busy())
                .field("queued_bytes", &shared.send_queue.occupied_bytes());
        }
        s.finish_non_exhaustive()
    }
}

fn is_silent_disconnect(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::TimedOut
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::NotConnected
            | io::ErrorKind::Interrupted
    )
}

fn set_abortive_linger(fd: RawFd) {
    let linger = libc::linger {
        l_onoff: 1,
        l_linger: 0,
    };
    let rc = unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_LINGER,
            (&linger as *const libc::linger).cast(),
            std::mem::size_of::<libc::linger>() as libc::socklen_t,
        )
    };
    if rc != 0 {
        warn!(error = %io::Error::last_os_error(), "socket linger set error");
    }
}

fn raw_socket_shutdown(fd: RawFd) {
    let rc = unsafe { libc::shutdown(fd, libc::SHUT_RDWR) };
    if rc != 0 {
        debug!(error = %io::Error::last_os_error(), "socket shutdown");
    }
}
