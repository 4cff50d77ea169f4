// ABOUTME: Defines CA protocol command identifiers for the TCP virtual circuit
// ABOUTME: Covers every command a client emits plus the responses it dispatches

use num_enum::TryFromPrimitive;

/// CA protocol command identifiers.
///
/// The command occupies the first 16-bit field of every message header and
/// is the same code in both directions: a READ_NOTIFY request and its reply
/// share command 15, distinguished only by who sent them.
///
/// Only the commands that travel over the TCP virtual circuit are listed
/// here; the UDP search/beacon traffic uses its own subset and never reaches
/// this crate. Unknown inbound commands are not an error at this layer —
/// the header is parsed and the message handed to the response sink as-is.
#[derive(TryFromPrimitive)]
#[repr(u16)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Command {
    /// Protocol revision exchange; the minor revision rides in the count field
    Version = 0,

    // Subscription management
    /// Register a subscription; carries the 16-byte mask extension body
    EventAdd = 1,
    /// Cancel a subscription
    EventCancel = 2,

    /// Fire-and-forget channel write
    Write = 4,
    /// Suspend server-side event emission (client is falling behind)
    EventsOff = 8,
    /// Resume server-side event emission
    EventsOn = 9,
    /// Error report from the server; payload carries the offending header
    Error = 11,
    /// Release a channel; cid field carries the sid
    ClearChannel = 12,
    /// Confirmed read; the reply echoes this command
    ReadNotify = 15,
    /// Claim a channel on this circuit (name payload at v4.4+)
    CreateChannel = 18,
    /// Confirmed channel write
    WriteNotify = 19,

    // Client identity (v4.1+)
    /// Announce the client user name
    ClientName = 20,
    /// Announce the client host name
    HostName = 21,

    /// Server-pushed read/write permission change for a channel
    AccessRights = 22,
    /// Liveness probe (v4.3+); the server echoes it back verbatim
    Echo = 23,
    /// Server could not attach the claimed channel
    CreateChannelFail = 26,
    /// Server-initiated disconnect notice for a channel
    ServerDisconnect = 27,
}
