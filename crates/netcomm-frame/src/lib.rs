//! Type-tagged, checksummed binary framing.
//!
//! Every frame carries a command byte and an ordered list of typed arguments:
//! - `0x01` start marker
//! - a width-tagged, big-endian signed body length
//! - `0x02`, the body (command + tag-prefixed arguments), `0x03`
//! - an XOR checksum of the body and a `0x04` end marker
//!
//! [`FrameParser`] decodes incrementally from a byte stream that may arrive
//! fragmented or coalesced.

pub mod codec;
pub mod error;
pub mod parser;
pub mod tag;
pub mod value;

pub use codec::{checksum, encode_frame, Frame, FrameBuilder, MAX_ARGUMENT_LEN, MAX_BODY_LEN};
pub use error::{BuildError, ParseError, Result};
pub use parser::{decode_frame, Advance, FrameParser, ParseStep};
pub use value::{ArgumentList, Value, ValueKind};
