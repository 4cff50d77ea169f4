// ABOUTME: Protocol-level constants and typed values for the CA wire protocol
// ABOUTME: Exports command identifiers, DBR transfer types and version floors

pub mod command_id;
pub mod dbr;
pub mod version;

pub use command_id::Command;
pub use dbr::{DbrBasic, DbrValue, dbr_size_n, dbr_type_is_valid};
pub use version::{CA_MAJOR_PROTOCOL_REVISION, CA_MINOR_PROTOCOL_REVISION, ProtocolVersion};

/// Default maximum TCP message body and the size of the small receive body
/// cache, in bytes. Responses larger than this need the large buffer class.
pub const MAX_TCP_BODY_BYTES: usize = 16 * 1024;

/// Fixed capacity of a CA protocol string, NUL terminator included.
pub const MAX_STRING_SIZE: usize = 40;
