// ABOUTME: Background task reading the socket, parsing frames and dispatching
// ABOUTME: Drives connect, starts the send task and winds the circuit down

use std::os::fd::AsRawFd;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpSocket, TcpStream};
use tracing::warn;

use crate::buffer::FrameBuffer;
use crate::circuit::incoming::Assembler;
use crate::circuit::{Circuit, CircuitState, send_loop};

/// Frames handled per callback-gate acquisition before the activity
/// watchdog must be fed again.
const RECV_BURST_FRAMES: u32 = 50;

/// The receive task: the circuit's driver.
///
/// Connects, queues the handshake, starts the send task, then loops filling
/// buffers from the socket and running the incoming-message parser under
/// the callback gate. On any exit path it winds the whole circuit down.
pub(crate) async fn run(circuit: Arc<Circuit>) {
    let Some(stream) = connect(&circuit).await else {
        circuit.send_exited.signal();
        circuit.clean_shutdown().await;
        circuit.recv_exited.signal();
        return;
    };

    // handshake frames, queued for the first flush in wire order and
    // before anyone can observe the Connected state
    circuit.version_request();
    circuit.host_name_set_request();
    circuit.user_name_set_request();

    if circuit.transition(CircuitState::Connected) != CircuitState::Connecting {
        // a shutdown raced the connect
        circuit.send_exited.signal();
        circuit.clean_shutdown().await;
        circuit.recv_exited.signal();
        return;
    }
    circuit.recv_dog.connect_notify();

    let (mut wire, write_half) = stream.into_split();
    tokio::spawn(send_loop::run(Arc::clone(&circuit), write_half));

    let mut assembler = Assembler::new(circuit.ctx().allocate_small_buffer());
    let mut combuf = FrameBuffer::new();

    'outer: while circuit.state() == CircuitState::Connected {
        let mut n_bytes_in = 0usize;
        let preemptive = circuit.ctx().preemptive_callbacks_enabled();

        if preemptive {
            match filled(&circuit, &mut combuf, &mut wire).await {
                Some(n) => n_bytes_in = n,
                None => break 'outer,
            }
        } else {
            // leave the bytes pending and block on a one-byte peek so the
            // callback gate is not held while idle; the real fill happens
            // strictly after the gate is taken
            let mut probe = [0u8; 1];
            let peeked = tokio::select! {
                r = wire.peek(&mut probe) => r,
                _ = circuit.recv_dog.expired() => {
                    warn!(peer = %circuit.peer, "server unresponsive; disconnecting");
                    break 'outer;
                }
            };
            match peeked {
                Ok(0) => {
                    circuit.transition(CircuitState::Disconnected);
                    break 'outer;
                }
                Ok(_) => {}
                Err(e) => {
                    circuit.disconnect_on_recv_error(&e);
                    break 'outer;
                }
            }
        }

        if circuit.state() != CircuitState::Connected {
            break;
        }

        // reschedule the activity watchdog; the poke never blocks and the
        // primary lock is not held here
        circuit.recv_dog.message_arrival_notify();

        // only one receive task at a time may run callbacks
        let mut guard = circuit.ctx().lock_callbacks().await;

        if !preemptive {
            match combuf.fill_from_wire(&mut wire).await {
                Ok(0) => {
                    circuit.transition(CircuitState::Disconnected);
                    break 'outer;
                }
                Ok(n) => n_bytes_in = n,
                Err(e) => {
                    circuit.disconnect_on_recv_error(&e);
                    break 'outer;
                }
            }
        }

        let mut contiguous_frames = 0u32;
        while contiguous_frames < RECV_BURST_FRAMES {
            contiguous_frames += 1;

            {
                let mut shared = circuit.shared();
                shared.flow.observe_fill(n_bytes_in, FrameBuffer::CAPACITY);
                shared.unacknowledged_send_bytes = 0;
            }

            assembler.push_buffer(combuf);
            combuf = FrameBuffer::new();

            if !assembler.process(&circuit, &mut guard) {
                circuit.transition(CircuitState::Disconnected);
                break;
            }

            // drain whatever the kernel already holds before giving the
            // gate up; stop as soon as nothing is pending
            match combuf.try_fill_from_wire(&wire) {
                Ok(Some(0)) => {
                    circuit.transition(CircuitState::Disconnected);
                    break;
                }
                Ok(Some(n)) => n_bytes_in = n,
                Ok(None) => break,
                Err(e) => {
                    circuit.disconnect_on_recv_error(&e);
                    break;
                }
            }
        }
    }

    circuit.stop_threads().await;
    circuit.recv_exited.signal();
}

/// One watched fill: resolves with the byte count, or `None` when the
/// stream ended, errored or the activity watchdog expired.
async fn filled(
    circuit: &Circuit,
    combuf: &mut FrameBuffer,
    wire: &mut OwnedReadHalf,
) -> Option<usize> {
    tokio::select! {
        r = combuf.fill_from_wire(wire) => match r {
            Ok(0) => {
                circuit.transition(CircuitState::Disconnected);
                None
            }
            Ok(n) => Some(n),
            Err(e) => {
                circuit.disconnect_on_recv_error(&e);
                None
            }
        },
        _ = circuit.recv_dog.expired() => {
            warn!(peer = %circuit.peer, "server unresponsive; disconnecting");
            None
        }
    }
}

/// Create the socket, apply its options, connect under the send dog and
/// register the fd. `None` on any failure; the caller cleans up.
async fn connect(circuit: &Circuit) -> Option<TcpStream> {
    let socket = match if circuit.peer.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    } {
        Ok(socket) => socket,
        Err(e) => {
            warn!(error = %e, "unable to create virtual circuit socket");
            return None;
        }
    };

    if let Err(e) = socket.set_keepalive(true) {
        warn!(error = %e, "problems setting socket option SO_KEEPALIVE");
    }
    match socket.send_buffer_size() {
        Ok(n) => circuit
            .send_buf_bytes
            .store(n as usize, Ordering::Relaxed),
        Err(e) => warn!(error = %e, "problems querying socket option SO_SNDBUF"),
    }

    let stream = match circuit.send_dog.watch(socket.connect(circuit.peer)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            warn!(peer = %circuit.peer, error = %e, "unable to connect");
            return None;
        }
        Err(_elapsed) => {
            warn!(peer = %circuit.peer, "connect timed out");
            return None;
        }
    };

    if let Err(e) = stream.set_nodelay(true) {
        warn!(error = %e, "problems setting socket option TCP_NODELAY");
    }

    let fd = stream.as_raw_fd();
    circuit.sock_fd.store(fd, Ordering::SeqCst);

    {
        let mut guard = circuit.ctx().lock_callbacks().await;
        // a shutdown that raced the connect wins; never register the fd
        // after it was torn down
        if circuit.sock_close_completed.load(Ordering::SeqCst) {
            return None;
        }
        circuit.sink.fd_created(&mut guard, fd);
    }

    Some(stream)
}
