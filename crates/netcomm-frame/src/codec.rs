use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{BuildError, Result};
use crate::tag::{float_width, integer_width, length_width, Family, EOT, ETX, SOH, STX};
use crate::value::{ArgumentList, Value};

/// Largest text or byte-sequence argument, in bytes.
pub const MAX_ARGUMENT_LEN: usize = 0x7F_FFFF - 5;

/// Largest frame body (command byte plus encoded arguments), in bytes.
pub const MAX_BODY_LEN: usize = i32::MAX as usize - 10;

/// Bytes a frame adds around its body, excluding the length field itself:
/// SOH, length tag, STX, ETX, checksum, EOT.
const ENVELOPE_SIZE: usize = 6;

/// A command byte with its ordered arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub command: u8,
    pub args: ArgumentList,
}

impl Frame {
    /// Create a new frame.
    pub fn new(command: u8, args: impl Into<ArgumentList>) -> Self {
        Self {
            command,
            args: args.into(),
        }
    }

    /// Encode this frame into a fresh buffer.
    pub fn encode(&self) -> Result<Bytes> {
        let mut dst = BytesMut::new();
        encode_frame(self.command, self.args.as_slice(), &mut dst)?;
        Ok(dst.freeze())
    }
}

/// Incrementally assembles a frame and encodes it.
///
/// ```
/// use netcomm_frame::FrameBuilder;
///
/// let bytes = FrameBuilder::new()
///     .command(0x88)
///     .arg(-256)
///     .arg(true)
///     .arg("Hello")
///     .build()
///     .unwrap();
/// assert_eq!(bytes[0], 0x01);
/// ```
#[derive(Debug, Clone, Default)]
pub struct FrameBuilder {
    command: Option<i64>,
    args: ArgumentList,
}

impl FrameBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn command(mut self, command: impl Into<i64>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value);
        self
    }

    pub fn args(mut self, values: impl IntoIterator<Item = Value>) -> Self {
        for value in values {
            self.args.push(value);
        }
        self
    }

    /// Encode the frame. Fails with [`BuildError::NoData`] if no command was set.
    pub fn build(&self) -> Result<Bytes> {
        let command = self.command.ok_or(BuildError::NoData)?;
        let mut dst = BytesMut::new();
        encode_frame(command, self.args.as_slice(), &mut dst)?;
        Ok(dst.freeze())
    }
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌─────┬────────────┬──────────┬─────┬─────────┬───────────┬─────┬──────────┬─────┐
/// │ SOH │ length tag │ length   │ STX │ command │ args...   │ ETX │ checksum │ EOT │
/// │ 01  │ 11/12/14   │ (1/2/4B) │ 02  │ (1B)    │ tag+field │ 03  │ XOR body │ 04  │
/// └─────┴────────────┴──────────┴─────┴─────────┴───────────┴─────┴──────────┴─────┘
/// ```
///
/// The length counts the body (command byte plus arguments). On failure
/// nothing is written to `dst`.
pub fn encode_frame(command: impl Into<i64>, args: &[Value], dst: &mut BytesMut) -> Result<()> {
    encode_frame_bounded(command.into(), args, dst, MAX_BODY_LEN)
}

fn encode_frame_bounded(
    command: i64,
    args: &[Value],
    dst: &mut BytesMut,
    max_body: usize,
) -> Result<()> {
    let command = u8::try_from(command).map_err(|_| BuildError::CommandOutOfRange { command })?;

    let mut body = BytesMut::new();
    body.put_u8(command);
    for arg in args {
        encode_value(arg, &mut body)?;
    }

    if body.len() > max_body {
        return Err(BuildError::BodyTooLong {
            len: body.len(),
            max: max_body,
        });
    }

    let width = length_width(body.len());
    dst.reserve(ENVELOPE_SIZE + width + body.len());
    dst.put_u8(SOH);
    dst.put_u8(Family::Length.tag(width));
    put_signed(dst, body.len() as i64, width);
    dst.put_u8(STX);
    dst.put_slice(&body);
    dst.put_u8(ETX);
    dst.put_u8(checksum(&body));
    dst.put_u8(EOT);
    Ok(())
}

fn encode_value(value: &Value, dst: &mut BytesMut) -> Result<()> {
    match value {
        Value::Integer(i) => {
            let width = integer_width(*i);
            dst.put_u8(Family::Integer.tag(width));
            put_signed(dst, *i, width);
        }
        Value::Float(v) => {
            let width = float_width(*v);
            dst.put_u8(Family::Float.tag(width));
            if width == 4 {
                dst.put_f32(*v as f32);
            } else {
                dst.put_f64(*v);
            }
        }
        Value::Boolean(b) => {
            dst.put_u8(Family::Boolean.tag(1));
            dst.put_u8(u8::from(*b));
        }
        Value::Text(s) => {
            put_length_prefixed(Family::Text, s.as_bytes(), dst).map_err(|len| {
                BuildError::StringTooLong {
                    len,
                    max: MAX_ARGUMENT_LEN,
                }
            })?;
        }
        Value::Bytes(b) => {
            put_length_prefixed(Family::Bytes, b, dst).map_err(|len| BuildError::BytesTooLong {
                len,
                max: MAX_ARGUMENT_LEN,
            })?;
        }
    }
    Ok(())
}

/// Write tag, length field and payload. Returns the payload length if it
/// exceeds [`MAX_ARGUMENT_LEN`].
fn put_length_prefixed(
    family: Family,
    payload: &[u8],
    dst: &mut BytesMut,
) -> std::result::Result<(), usize> {
    if payload.len() > MAX_ARGUMENT_LEN {
        return Err(payload.len());
    }
    let width = length_width(payload.len());
    dst.put_u8(family.tag(width));
    put_signed(dst, payload.len() as i64, width);
    dst.put_slice(payload);
    Ok(())
}

/// Big-endian two's complement, truncated to `width` bytes.
fn put_signed(dst: &mut BytesMut, value: i64, width: usize) {
    dst.put_slice(&value.to_be_bytes()[8 - width..]);
}

/// XOR fold of the body bytes.
pub fn checksum(body: &[u8]) -> u8 {
    body.iter().fold(0, |acc, b| acc ^ b)
}
