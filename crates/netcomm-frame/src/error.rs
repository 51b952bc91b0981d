use crate::parser::ParseStep;
use crate::value::ValueKind;

/// Reasons a frame could not be built.
///
/// No bytes are produced when building fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    /// The command value does not fit in one byte.
    #[error("command value {command} out of range (0..=255)")]
    CommandOutOfRange { command: i64 },

    /// A text argument's UTF-8 encoding is too long.
    #[error("text argument too long ({len} bytes, max {max})")]
    StringTooLong { len: usize, max: usize },

    /// A byte-sequence argument is too long.
    #[error("bytes argument too long ({len} bytes, max {max})")]
    BytesTooLong { len: usize, max: usize },

    /// The encoded body exceeds the maximum frame length.
    #[error("frame body too long ({len} bytes, max {max})")]
    BodyTooLong { len: usize, max: usize },

    /// The argument kind has no wire encoding.
    ///
    /// Every [`ValueKind`] is currently encodable; this variant is reserved for
    /// kinds added without a matching encoder.
    #[error("argument kind {0} has no wire encoding")]
    UnsupportedKind(ValueKind),

    /// Nothing has been built yet (no command was supplied).
    #[error("no frame data: command not set")]
    NoData,
}

/// Why the parser rejected the buffered bytes.
///
/// Any of these is terminal for the byte stream it was produced from.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// A marker byte did not match the one expected at this step.
    #[error("unexpected byte 0x{found:02X} at {step:?} (expected 0x{expected:02X})")]
    UnexpectedByte {
        step: ParseStep,
        expected: u8,
        found: u8,
    },

    /// The frame-length tag is not one of 0x11, 0x12, 0x14.
    #[error("unknown frame-length tag 0x{0:02X}")]
    UnknownLengthTag(u8),

    /// A length field decoded to a negative value.
    #[error("negative length field ({0})")]
    NegativeLength(i64),

    /// The declared body is longer than the parser accepts.
    #[error("frame body too large ({len} bytes, max {max})")]
    BodyTooLarge { len: usize, max: usize },

    /// The declared body cannot hold the command byte.
    #[error("frame body is empty")]
    EmptyBody,

    /// An argument tag byte is not in the tag table.
    #[error("unknown argument tag 0x{tag:02X} at body offset {offset}")]
    UnknownArgumentTag { tag: u8, offset: usize },

    /// An argument extends past the declared body length.
    #[error("argument at body offset {offset} overruns the frame body")]
    ArgumentOverrun { offset: usize },

    /// A text argument is not valid UTF-8.
    #[error("text argument at body offset {offset} is not valid UTF-8")]
    InvalidUtf8 { offset: usize },

    /// The checksum byte does not match the XOR of the body.
    #[error("checksum mismatch (computed 0x{computed:02X}, received 0x{received:02X})")]
    ChecksumMismatch { computed: u8, received: u8 },
}

pub type Result<T> = std::result::Result<T, BuildError>;
