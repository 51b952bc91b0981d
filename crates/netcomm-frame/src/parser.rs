//! Incremental frame parser.
//!
//! Bytes are appended as they arrive; [`FrameParser::advance`] moves a
//! cursor-based state machine forward as far as the buffered bytes allow.
//! A step that lacks bytes consumes nothing, so the next `advance` after more
//! bytes arrive re-enters it cleanly. That is what lets a length field split
//! across two reads decode correctly.

use bytes::{Buf, Bytes, BytesMut};
use tracing::{debug, trace};

use crate::codec::{checksum, Frame, MAX_BODY_LEN};
use crate::error::ParseError;
use crate::tag::{read_float, read_signed, Family, EOT, ETX, SOH, STX};
use crate::value::{ArgumentList, Value};

const INITIAL_BUFFER_CAPACITY: usize = 4 * 1024;

/// Position of the parser within a frame.
///
/// Steps run strictly in declaration order and wrap back to `ExpectStart`
/// after a frame completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParseStep {
    ExpectStart,
    ExpectLengthTag,
    ExpectBodyMarker,
    ExpectBodyAndEnd,
    ExpectChecksum,
    ExpectEndMarker,
}

/// Outcome of one [`FrameParser::advance`] call.
#[derive(Debug, Clone, PartialEq)]
pub enum Advance {
    /// A full frame was decoded and its bytes dropped from the buffer.
    Completed(Frame),
    /// The buffer holds a valid-so-far partial frame.
    InProgress,
    /// The buffer is empty.
    NoData,
    /// The buffer violates the wire format. Terminal for this stream.
    ParsingError(ParseError),
}

enum Poll {
    Continue,
    NeedMore,
    Completed(Frame),
}

/// Streaming parser state for one connection.
#[derive(Debug)]
pub struct FrameParser {
    buf: BytesMut,
    pos: usize,
    step: ParseStep,
    max_body_len: usize,
    body_len: usize,
    checksum: u8,
    command: u8,
    args: ArgumentList,
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameParser {
    pub fn new() -> Self {
        Self::with_max_body_len(MAX_BODY_LEN)
    }

    /// Parser that rejects any frame declaring a body longer than `max`
    /// bytes, before buffering that body.
    pub fn with_max_body_len(max: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            pos: 0,
            step: ParseStep::ExpectStart,
            max_body_len: max.min(MAX_BODY_LEN),
            body_len: 0,
            checksum: 0,
            command: 0,
            args: ArgumentList::new(),
        }
    }

    /// Add received bytes to the tail of the buffer.
    pub fn append(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Largest body length this parser accepts.
    pub fn max_body_len(&self) -> usize {
        self.max_body_len
    }

    /// Current step.
    pub fn step(&self) -> ParseStep {
        self.step
    }

    /// True while a frame has been started but not completed.
    pub fn in_frame(&self) -> bool {
        self.step != ParseStep::ExpectStart
    }

    /// Bytes held in the buffer, consumed or not, for the current frame onward.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Make as much progress as the buffered bytes allow.
    ///
    /// Returns after at most one completed frame; call again to drain frames
    /// that arrived back to back. After a `ParsingError` the parser makes no
    /// further progress and keeps returning the same error.
    pub fn advance(&mut self) -> Advance {
        loop {
            match self.poll_step() {
                Ok(Poll::Continue) => continue,
                Ok(Poll::Completed(frame)) => {
                    trace!(command = frame.command, args = frame.args.len(), "frame decoded");
                    return Advance::Completed(frame);
                }
                Ok(Poll::NeedMore) => break,
                Err(err) => {
                    debug!(error = %err, step = ?self.step, "frame rejected");
                    return Advance::ParsingError(err);
                }
            }
        }

        if self.buf.is_empty() {
            Advance::NoData
        } else {
            Advance::InProgress
        }
    }

    fn poll_step(&mut self) -> Result<Poll, ParseError> {
        let available = &self.buf[self.pos..];

        match self.step {
            ParseStep::ExpectStart => {
                let Some(&byte) = available.first() else {
                    return Ok(Poll::NeedMore);
                };
                expect_marker(self.step, SOH, byte)?;
                self.pos += 1;
                self.step = ParseStep::ExpectLengthTag;
            }
            ParseStep::ExpectLengthTag => {
                let Some(&tag) = available.first() else {
                    return Ok(Poll::NeedMore);
                };
                let width = match Family::from_tag(tag) {
                    Some((Family::Length, width)) => width,
                    _ => return Err(ParseError::UnknownLengthTag(tag)),
                };
                let Some(field) = available.get(1..1 + width) else {
                    return Ok(Poll::NeedMore);
                };
                let len = read_signed(field);
                if len < 0 {
                    return Err(ParseError::NegativeLength(len));
                }
                if len == 0 {
                    return Err(ParseError::EmptyBody);
                }
                let len = len as usize;
                if len > self.max_body_len {
                    return Err(ParseError::BodyTooLarge {
                        len,
                        max: self.max_body_len,
                    });
                }
                self.body_len = len;
                self.pos += 1 + width;
                self.step = ParseStep::ExpectBodyMarker;
            }
            ParseStep::ExpectBodyMarker => {
                let Some(&byte) = available.first() else {
                    return Ok(Poll::NeedMore);
                };
                expect_marker(self.step, STX, byte)?;
                self.pos += 1;
                self.step = ParseStep::ExpectBodyAndEnd;
            }
            ParseStep::ExpectBodyAndEnd => {
                let Some(&end) = available.get(self.body_len) else {
                    return Ok(Poll::NeedMore);
                };
                expect_marker(self.step, ETX, end)?;
                let body = &available[..self.body_len];
                let (command, args) = decode_body(body)?;
                self.checksum = checksum(body);
                self.command = command;
                self.args = args;
                self.pos += self.body_len + 1;
                self.step = ParseStep::ExpectChecksum;
            }
            ParseStep::ExpectChecksum => {
                let Some(&received) = available.first() else {
                    return Ok(Poll::NeedMore);
                };
                if received != self.checksum {
                    return Err(ParseError::ChecksumMismatch {
                        computed: self.checksum,
                        received,
                    });
                }
                self.pos += 1;
                self.step = ParseStep::ExpectEndMarker;
            }
            ParseStep::ExpectEndMarker => {
                let Some(&byte) = available.first() else {
                    return Ok(Poll::NeedMore);
                };
                expect_marker(self.step, EOT, byte)?;
                self.pos += 1;
                let frame = Frame::new(self.command, std::mem::take(&mut self.args));
                self.reset();
                return Ok(Poll::Completed(frame));
            }
        }

        Ok(Poll::Continue)
    }

    /// Drop the consumed prefix and wait for the next frame.
    fn reset(&mut self) {
        self.buf.advance(self.pos);
        self.pos = 0;
        self.step = ParseStep::ExpectStart;
        self.body_len = 0;
        self.checksum = 0;
        self.command = 0;
    }
}

fn expect_marker(step: ParseStep, expected: u8, found: u8) -> Result<(), ParseError> {
    if found == expected {
        Ok(())
    } else {
        Err(ParseError::UnexpectedByte {
            step,
            expected,
            found,
        })
    }
}

/// Decode command byte and arguments from a complete body.
fn decode_body(body: &[u8]) -> Result<(u8, ArgumentList), ParseError> {
    let Some(&command) = body.first() else {
        return Err(ParseError::EmptyBody);
    };

    let mut args = ArgumentList::new();
    let mut offset = 1;

    while offset < body.len() {
        let tag = body[offset];
        let (family, width) =
            Family::from_tag(tag).ok_or(ParseError::UnknownArgumentTag { tag, offset })?;
        let field_end = offset + 1 + width;
        let field = body
            .get(offset + 1..field_end)
            .ok_or(ParseError::ArgumentOverrun { offset })?;

        let (value, next) = match family {
            Family::Integer => (Value::Integer(read_signed(field)), field_end),
            Family::Float => (Value::Float(read_float(field)), field_end),
            Family::Boolean => (Value::Boolean(field[0] != 0), field_end),
            Family::Text | Family::Bytes => {
                let len = read_signed(field);
                if len < 0 {
                    return Err(ParseError::NegativeLength(len));
                }
                let end = field_end
                    .checked_add(len as usize)
                    .ok_or(ParseError::ArgumentOverrun { offset })?;
                let payload = body
                    .get(field_end..end)
                    .ok_or(ParseError::ArgumentOverrun { offset })?;
                let value = if family == Family::Text {
                    let text = std::str::from_utf8(payload)
                        .map_err(|_| ParseError::InvalidUtf8 { offset })?;
                    Value::Text(text.to_string())
                } else {
                    Value::Bytes(Bytes::copy_from_slice(payload))
                };
                (value, end)
            }
            Family::Length => return Err(ParseError::UnknownArgumentTag { tag, offset }),
        };

        args.push(value);
        offset = next;
    }

    Ok((command, args))
}

/// Decode a single frame from a complete buffer.
///
/// Returns `Ok(None)` if `src` holds only part of a frame (or nothing).
pub fn decode_frame(src: &[u8]) -> Result<Option<Frame>, ParseError> {
    let mut parser = FrameParser::new();
    parser.append(src);
    match parser.advance() {
        Advance::Completed(frame) => Ok(Some(frame)),
        Advance::InProgress | Advance::NoData => Ok(None),
        Advance::ParsingError(err) => Err(err),
    }
}
