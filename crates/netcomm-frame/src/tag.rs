//! Marker bytes and the tag-byte table shared by the encoder and the parser.
//!
//! A tag byte's high nibble names the field family and its low nibble the
//! byte width of the fixed-size field that follows it.

/// Start-of-frame marker.
pub const SOH: u8 = 0x01;
/// Body marker, follows the frame-length field.
pub const STX: u8 = 0x02;
/// End-of-body marker, precedes the checksum.
pub const ETX: u8 = 0x03;
/// End-of-frame marker.
pub const EOT: u8 = 0x04;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Family {
    Length,
    Integer,
    Float,
    Boolean,
    Text,
    Bytes,
}

impl Family {
    const ALL: [Family; 6] = [
        Family::Length,
        Family::Integer,
        Family::Float,
        Family::Boolean,
        Family::Text,
        Family::Bytes,
    ];

    const fn nibble(self) -> u8 {
        match self {
            Family::Length => 0x10,
            Family::Integer => 0x30,
            Family::Float => 0x50,
            Family::Boolean => 0x70,
            Family::Text => 0x90,
            Family::Bytes => 0xB0,
        }
    }

    const fn widths(self) -> &'static [usize] {
        match self {
            Family::Length | Family::Text | Family::Bytes => &[1, 2, 4],
            Family::Integer => &[1, 2, 4, 8],
            Family::Float => &[4, 8],
            Family::Boolean => &[1],
        }
    }

    /// Tag byte for this family at `width`. `width` must be one of the
    /// family's legal widths.
    pub(crate) fn tag(self, width: usize) -> u8 {
        debug_assert!(self.widths().contains(&width));
        self.nibble() | width as u8
    }

    /// Split a tag byte into family and width, rejecting unknown tags.
    pub(crate) fn from_tag(tag: u8) -> Option<(Family, usize)> {
        let width = usize::from(tag & 0x0F);
        Self::ALL
            .into_iter()
            .find(|family| family.nibble() == tag & 0xF0)
            .filter(|family| family.widths().contains(&width))
            .map(|family| (family, width))
    }
}

/// Smallest of 1/2/4 bytes whose signed range holds `len`.
pub(crate) fn length_width(len: usize) -> usize {
    if len <= i8::MAX as usize {
        1
    } else if len <= i16::MAX as usize {
        2
    } else {
        4
    }
}

/// Smallest of 1/2/4/8 bytes whose signed range holds `value`.
pub(crate) fn integer_width(value: i64) -> usize {
    if i8::try_from(value).is_ok() {
        1
    } else if i16::try_from(value).is_ok() {
        2
    } else if i32::try_from(value).is_ok() {
        4
    } else {
        8
    }
}

/// 4 bytes when the magnitude fits an f32, otherwise 8. NaN takes 8.
pub(crate) fn float_width(value: f64) -> usize {
    if value.abs() <= f64::from(f32::MAX) {
        4
    } else {
        8
    }
}

/// Decode a big-endian signed integer of `src.len()` bytes (1, 2, 4 or 8).
pub(crate) fn read_signed(src: &[u8]) -> i64 {
    match *src {
        [b] => i64::from(b as i8),
        [a, b] => i64::from(i16::from_be_bytes([a, b])),
        [a, b, c, d] => i64::from(i32::from_be_bytes([a, b, c, d])),
        [a, b, c, d, e, f, g, h] => i64::from_be_bytes([a, b, c, d, e, f, g, h]),
        _ => unreachable!("tag widths are limited to 1, 2, 4 and 8"),
    }
}

/// Decode a big-endian IEEE-754 float of 4 or 8 bytes, widened to f64.
pub(crate) fn read_float(src: &[u8]) -> f64 {
    match *src {
        [a, b, c, d] => f64::from(f32::from_be_bytes([a, b, c, d])),
        [a, b, c, d, e, f, g, h] => f64::from_be_bytes([a, b, c, d, e, f, g, h]),
        _ => unreachable!("float widths are limited to 4 and 8"),
    }
}
