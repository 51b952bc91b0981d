//! Type-tagged, checksummed binary frames over TCP and UDP.
//!
//! A frame carries a one-byte command and an ordered list of typed arguments
//! (booleans, integers, floats, text, byte sequences). Frames survive
//! arbitrary fragmentation and coalescing on a stream.
//!
//! # Crate Structure
//!
//! - [`frame`]: Value model, frame encoder and streaming parser
//! - [`transport`]: TCP/UDP sockets with a background receive loop, stall
//!   watchdog and TCP accept loop

/// Re-export frame types.
pub mod frame {
    pub use netcomm_frame::*;
}

/// Re-export transport types.
pub mod transport {
    pub use netcomm_transport::*;
}
