// ABOUTME: Background task draining the send queue onto the socket
// ABOUTME: Also emits flow-control toggles and echo probes on its way through

use std::sync::Arc;
use std::sync::atomic::Ordering;

use tokio::net::tcp::OwnedWriteHalf;
use tracing::{debug, warn};

use crate::circuit::{Circuit, CircuitState};

/// The send task. Parks on the flush event; each wake performs the pending
/// control labor (flow-control direction changes, echo), then drains the
/// queue. Exits when the circuit leaves Connected or a send fails, always
/// signalling the send-exited event on the way out.
pub(crate) async fn run(circuit: Arc<Circuit>, mut wire: OwnedWriteHalf) {
    loop {
        circuit.send_flush.notified().await;

        if circuit.state() != CircuitState::Connected {
            break;
        }

        let (flow_control_labor, echo_labor) = {
            let mut shared = circuit.shared();
            let flow = shared.flow.busy() != shared.flow_control_active;
            let echo = shared.echo_request_pending;
            shared.echo_request_pending = false;
            (flow, echo)
        };

        if flow_control_labor {
            let active = circuit.shared().flow_control_active;
            if active {
                circuit.disable_flow_control_request();
                circuit.shared().flow_control_active = false;
                debug!(peer = %circuit.peer, "flow control off");
            } else {
                circuit.enable_flow_control_request();
                circuit.shared().flow_control_active = true;
                debug!(peer = %circuit.peer, "flow control on");
            }
        }

        if echo_labor {
            if circuit.minor_version().v43_ok() {
                circuit.echo_request();
            } else {
                circuit.version_request();
            }
        }

        if !flush(&circuit, &mut wire).await {
            break;
        }
    }

    circuit.send_exited.signal();
}

/// Drain every committed buffer to the wire. Returns `false` on failure,
/// after discarding whatever remained queued.
async fn flush(circuit: &Circuit, wire: &mut OwnedWriteHalf) -> bool {
    loop {
        let popped = {
            let mut shared = circuit.shared();
            match shared.send_queue.pop_next_buffer_to_send() {
                Some(buf) => {
                    shared.unacknowledged_send_bytes += buf.occupied_bytes();
                    Some((buf, shared.unacknowledged_send_bytes))
                }
                None => {
                    if shared.blocking_for_flush > 0 {
                        circuit.flush_unblock.notify_waiters();
                    }
                    shared.early_flush = false;
                    None
                }
            }
        };
        let Some((buf, unacked)) = popped else {
            return true;
        };

        // poke the activity dog without the primary lock held: a backlog
        // larger than the socket send buffer means the peer owes us reads
        if unacked > circuit.send_buf_bytes.load(Ordering::Relaxed) {
            circuit.recv_dog.send_backlog_progress_notify();
        }

        let ok = match circuit.send_dog.watch(buf.flush_to_wire(wire)).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                circuit.disconnect_on_send_error(&e);
                false
            }
            Err(_elapsed) => {
                warn!(peer = %circuit.peer, "send timed out; forcing circuit shutdown");
                circuit.forced_shutdown().await;
                false
            }
        };

        if !ok {
            let mut shared = circuit.shared();
            shared.send_queue.clear();
            if shared.blocking_for_flush > 0 {
                circuit.flush_unblock.notify_waiters();
            }
            return false;
        }
    }
}
