// ABOUTME: Client-side TCP virtual circuit for the CA process-variable protocol
// ABOUTME: Crate root - module layout and the public re-export surface

//! Client-side TCP virtual circuit for the Channel Access (CA)
//! process-variable protocol.
//!
//! A virtual circuit is the long-lived, ordered byte stream between one
//! client and one server host. Over it the client multiplexes channel
//! creation, reads, writes, subscription events and liveness probes for
//! every channel sharing the same {host, priority} pair. This crate owns
//! the hard part of that client: socket lifecycle, the send/receive task
//! pair, wire framing with version negotiation, adaptive flow control,
//! liveness watchdogs and teardown ordering. Discovery (UDP search),
//! channel bookkeeping and response routing live in the layer above and
//! plug in through [`ClientContext`], [`ResponseSink`] and
//! [`CircuitChannel`].
//!
//! # Example
//!
//! ```rust,no_run
//! use cacircuit::{
//!     CA_MINOR_PROTOCOL_REVISION, CallbackGuard, Circuit, ClientContext,
//!     ClientContextConfig, MessageHeader, ProtocolVersion, ResponseSink,
//! };
//!
//! struct PrintSink;
//!
//! impl ResponseSink for PrintSink {
//!     fn execute_response(
//!         &self,
//!         _guard: &mut CallbackGuard<'_>,
//!         _circuit: &Circuit,
//!         header: &MessageHeader,
//!         body: &[u8],
//!     ) -> bool {
//!         println!("cmd={} payload={}B", header.command, body.len());
//!         true
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let ctx = ClientContext::new(ClientContextConfig::default());
//!     let circuit = Circuit::spawn(
//!         ctx,
//!         "10.0.0.7:5064".parse().unwrap(),
//!         0,
//!         ProtocolVersion::new(CA_MINOR_PROTOCOL_REVISION),
//!         Box::new(PrintSink),
//!     );
//!
//!     if circuit.wait_connected().await {
//!         // handshake frames (VERSION, identity) go out on the first flush
//!         circuit.flush_request();
//!     }
//!
//!     circuit.clean_shutdown().await;
//!     circuit.join().await;
//! }
//! ```

pub mod buffer;
pub mod circuit;
pub mod codec;
pub mod context;
pub mod datatypes;
pub mod recv_queue;
pub mod send_queue;


pub use buffer::FrameBuffer;
pub use circuit::{Circuit, CircuitState, RequestError, RequestResult};
pub use codec::{
    CodecError, MSG_HEADER_EXTENSION_SIZE, MSG_HEADER_SIZE, MessageHeader, aligned_payload_size,
    insert_request_header, insert_request_with_payload,
};
pub use context::{
    CallbackGuard, CircuitChannel, ClientContext, ClientContextConfig, PooledBuf, ResponseSink,
};
pub use datatypes::{
    CA_MINOR_PROTOCOL_REVISION, Command, DbrBasic, DbrValue, MAX_STRING_SIZE, MAX_TCP_BODY_BYTES,
    ProtocolVersion,
};
pub use recv_queue::RecvQueue;
pub use send_queue::SendQueue;
