//! Bridge: loopback TCP control surface for a live host application.
//!
//! Protocol: one JSON object per line. A connection's first message resolves
//! the human approval handshake; approved connections then exec/eval against
//! the shared namespace. Minimal by intent: two operations plus auth.

mod approval;
mod protocol;
mod server;

pub use approval::{
    ApprovalDecision, ApprovalGate, ApprovalPrompt, ChannelPrompt, PendingApproval, StaticPrompt,
};
pub use protocol::{
    decode_request, encode_line, DecodeError, Handshake, Request, Response, REJECTED_BY_USER,
};
pub use server::{run_bridge, start_bridge, BridgeHandle};
