//! The Bitcoin wire protocol: message framing, the command set this node
//! understands, and the types carried by each message (§4.A, §4.K).

pub mod external;
