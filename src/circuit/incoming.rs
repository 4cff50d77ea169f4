// ABOUTME: Resumable parser turning the receive queue into dispatched messages
// ABOUTME: Suspends mid-header or mid-body and picks up where it left off

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{trace, warn};

use crate::buffer::FrameBuffer;
use crate::circuit::Circuit;
use crate::codec::{MSG_HEADER_EXTENSION_SIZE, MSG_HEADER_SIZE, MessageHeader};
use crate::context::{CallbackGuard, PooledBuf};
use crate::recv_queue::RecvQueue;

static OVERSIZE_WARNED: AtomicBool = AtomicBool::new(false);

/// The incoming-message state machine.
///
/// Consumes the receive queue one message at a time: 16-byte short header,
/// optional 8-byte extension, then the body into the body cache. At any
/// point the queue may run dry; the machine records how far it got
/// (`short_header_parsed` / `header_complete` / `body_bytes`) and resumes on
/// the next buffer, so byte-stream splits are invisible to dispatch order.
pub(crate) struct Assembler {
    queue: RecvQueue,
    header: MessageHeader,
    short_header_parsed: bool,
    header_complete: bool,
    /// Body cache; starts small, upgraded to the large class on demand
    body: PooledBuf,
    /// Bytes of the current body copied (or, for an oversize message,
    /// drained) so far
    body_bytes: usize,
}

impl Assembler {
    pub fn new(body: PooledBuf) -> Self {
        Self {
            queue: RecvQueue::new(),
            header: MessageHeader::default(),
            short_header_parsed: false,
            header_complete: false,
            body,
            body_bytes: 0,
        }
    }

    pub fn push_buffer(&mut self, buf: FrameBuffer) {
        self.queue.push_buffer(buf);
    }

    /// Parse and dispatch messages until the queue runs dry. Returns
    /// `false` when the sink reports a protocol violation; the circuit is
    /// then dead.
    pub fn process(&mut self, circuit: &Circuit, guard: &mut CallbackGuard<'_>) -> bool {
        loop {
            if !self.header_complete {
                if !self.short_header_parsed {
                    if self.queue.occupied_bytes() < MSG_HEADER_SIZE {
                        circuit.flush_if_recv_process_requested();
                        return true;
                    }
                    let Some(header) = MessageHeader::pop_short(&mut self.queue) else {
                        return true;
                    };
                    self.header = header;
                    self.short_header_parsed = true;
                }
                if self.header.needs_extension() {
                    if self.queue.occupied_bytes() < MSG_HEADER_EXTENSION_SIZE {
                        circuit.flush_if_recv_process_requested();
                        return true;
                    }
                    if self.header.pop_extension(&mut self.queue).is_none() {
                        return true;
                    }
                }
                self.header_complete = true;
                trace!(
                    cmd = self.header.command,
                    dtype = self.header.data_type,
                    count = self.header.element_count,
                    size = self.header.payload_size,
                    cid = self.header.cid,
                    available = self.header.available,
                    "message header"
                );
            }

            let postsize = self.header.payload_size as usize;

            // a small body cache may be swapped for the large class when
            // that would make the message fit
            if postsize > self.body.capacity()
                && self.body.capacity() == circuit.ctx().small_buffer_bytes()
                && circuit.ctx().large_buffer_bytes() >= postsize
            {
                self.body = circuit.ctx().allocate_large_buffer();
            }

            if postsize <= self.body.capacity() {
                if postsize > 0 {
                    let copied = self
                        .queue
                        .copy_out_bytes(&mut self.body[self.body_bytes..postsize]);
                    self.body_bytes += copied;
                    if self.body_bytes < postsize {
                        circuit.flush_if_recv_process_requested();
                        return true;
                    }
                }
                if !circuit.dispatch_response(guard, &self.header, &self.body[..postsize]) {
                    return false;
                }
            } else {
                if !OVERSIZE_WARNED.swap(true, Ordering::Relaxed) {
                    warn!(
                        payload_size = postsize,
                        "response larger than the message body cache ignored"
                    );
                }
                self.body_bytes += self.queue.remove_bytes(postsize - self.body_bytes);
                if self.body_bytes < postsize {
                    circuit.flush_if_recv_process_requested();
                    return true;
                }
            }

            self.short_header_parsed = false;
            self.header_complete = false;
            self.body_bytes = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::sync::{Arc, Mutex};

    use bytes::BytesMut;

    use crate::circuit::Circuit;
    use crate::context::{ClientContext, ClientContextConfig, ResponseSink};
    use crate::datatypes::{CA_MINOR_PROTOCOL_REVISION, Command, MAX_TCP_BODY_BYTES, ProtocolVersion};

    /// Records every dispatched (header, body) pair; optionally rejects a
    /// specific command as a protocol violation.
    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(MessageHeader, Vec<u8>)>>,
        reject_command: Option<u16>,
    }

    impl ResponseSink for Arc<Recorder> {
        fn execute_response(
            &self,
            _guard: &mut CallbackGuard<'_>,
            _circuit: &Circuit,
            header: &MessageHeader,
            body: &[u8],
        ) -> bool {
            if self.reject_command == Some(header.command) {
                return false;
            }
            self.seen
                .lock()
                .unwrap()
                .push((*header, body.to_vec()));
            true
        }
    }

    fn detached_circuit(recorder: Arc<Recorder>) -> (Arc<ClientContext>, Arc<Circuit>) {
        let ctx = ClientContext::new(ClientContextConfig {
            max_array_bytes: 2 * MAX_TCP_BODY_BYTES,
            ..Default::default()
        });
        let peer: SocketAddr = "127.0.0.1:5064".parse().unwrap();
        let circuit = Circuit::new(
            Arc::clone(&ctx),
            peer,
            0,
            ProtocolVersion::new(CA_MINOR_PROTOCOL_REVISION),
            Box::new(recorder),
        );
        (ctx, circuit)
    }

    fn message(command: Command, dtype: u16, count: u32, cid: u32, body: &[u8]) -> Vec<u8> {
        let mut out = BytesMut::new();
        MessageHeader {
            command: command as u16,
            payload_size: body.len() as u32,
            data_type: dtype,
            element_count: count,
            cid,
            available: 0,
        }
        .encode(&mut out);
        out.extend_from_slice(body);
        out.to_vec()
    }

    fn feed_in_chunks(
        assembler: &mut Assembler,
        circuit: &Circuit,
        guard: &mut CallbackGuard<'_>,
        stream: &[u8],
        chunk: usize,
    ) -> bool {
        for piece in stream.chunks(chunk) {
            let mut buf = FrameBuffer::new();
            assert_eq!(buf.push_bytes(piece), piece.len());
            assembler.push_buffer(buf);
            if !assembler.process(circuit, guard) {
                return false;
            }
        }
        true
    }

    #[tokio::test]
    async fn one_byte_splits_dispatch_identically() {
        let mut stream = Vec::new();
        stream.extend(message(Command::AccessRights, 0, 0, 7, &[1, 0, 0, 0, 0, 0, 0, 0]));
        stream.extend(message(Command::Echo, 0, 0, 0, &[]));
        stream.extend(message(Command::ReadNotify, 6, 1, 9, &1.5f64.to_be_bytes()));

        let mut dispatches = Vec::new();
        for chunk in [1usize, 3, 16, stream.len()] {
            let recorder = Arc::new(Recorder::default());
            let (ctx, circuit) = detached_circuit(Arc::clone(&recorder));
            let mut guard = ctx.lock_callbacks().await;
            let mut assembler = Assembler::new(ctx.allocate_small_buffer());

            assert!(feed_in_chunks(&mut assembler, &circuit, &mut guard, &stream, chunk));
            dispatches.push(recorder.seen.lock().unwrap().clone());
        }

        for other in &dispatches[1..] {
            assert_eq!(&dispatches[0], other);
        }
        assert_eq!(dispatches[0].len(), 3);
        assert_eq!(dispatches[0][2].1, 1.5f64.to_be_bytes());
    }

    #[tokio::test]
    async fn extended_header_bodies_are_assembled() {
        // force the extended form with an element count above the sentinel
        let body = vec![0xA5u8; 24];
        let mut wire = BytesMut::new();
        MessageHeader {
            command: Command::ReadNotify as u16,
            payload_size: body.len() as u32,
            data_type: 4,
            element_count: 0x10000,
            cid: 3,
            available: 4,
        }
        .encode(&mut wire);
        wire.extend_from_slice(&body);

        let recorder = Arc::new(Recorder::default());
        let (ctx, circuit) = detached_circuit(Arc::clone(&recorder));
        let mut guard = ctx.lock_callbacks().await;
        let mut assembler = Assembler::new(ctx.allocate_small_buffer());

        assert!(feed_in_chunks(&mut assembler, &circuit, &mut guard, &wire, 5));

        let seen = recorder.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0.element_count, 0x10000);
        assert_eq!(seen[0].1, body);
    }

    #[tokio::test]
    async fn body_cache_upgrades_to_the_large_class() {
        let body = vec![3u8; MAX_TCP_BODY_BYTES + 1];
        let stream = message(Command::ReadNotify, 4, body.len() as u32, 1, &body);

        let recorder = Arc::new(Recorder::default());
        let (ctx, circuit) = detached_circuit(Arc::clone(&recorder));
        let mut guard = ctx.lock_callbacks().await;
        let mut assembler = Assembler::new(ctx.allocate_small_buffer());

        assert!(feed_in_chunks(
            &mut assembler,
            &circuit,
            &mut guard,
            &stream,
            FrameBuffer::CAPACITY
        ));

        let seen = recorder.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].1.len(), body.len());
    }

    #[tokio::test]
    async fn oversize_message_is_drained_and_the_stream_continues() {
        let too_big = vec![9u8; 2 * MAX_TCP_BODY_BYTES + 8];
        let mut stream = message(Command::ReadNotify, 4, too_big.len() as u32, 1, &too_big);
        stream.extend(message(Command::Echo, 0, 0, 0, &[]));

        let recorder = Arc::new(Recorder::default());
        let (ctx, circuit) = detached_circuit(Arc::clone(&recorder));
        let mut guard = ctx.lock_callbacks().await;
        let mut assembler = Assembler::new(ctx.allocate_small_buffer());

        assert!(feed_in_chunks(
            &mut assembler,
            &circuit,
            &mut guard,
            &stream,
            FrameBuffer::CAPACITY
        ));

        // only the valid message after the oversize one is dispatched
        let seen = recorder.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0.command, Command::Echo as u16);
    }

    #[tokio::test]
    async fn protocol_violation_stops_processing() {
        let mut stream = message(Command::Echo, 0, 0, 0, &[]);
        stream.extend(message(Command::AccessRights, 0, 0, 1, &[0u8; 8]));

        let recorder = Arc::new(Recorder {
            reject_command: Some(Command::Echo as u16),
            ..Default::default()
        });
        let (ctx, circuit) = detached_circuit(Arc::clone(&recorder));
        let mut guard = ctx.lock_callbacks().await;
        let mut assembler = Assembler::new(ctx.allocate_small_buffer());

        let mut buf = FrameBuffer::new();
        buf.push_bytes(&stream);
        assembler.push_buffer(buf);
        assert!(!assembler.process(&circuit, &mut guard));
        assert!(recorder.seen.lock().unwrap().is_empty());
    }
}
