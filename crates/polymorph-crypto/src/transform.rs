//! Reversible byte transforms.
//!
//! Eight transforms operate on whole buffers. Every transform has an exact
//! inverse, so any sequence of them can be undone by applying the inverses in
//! reverse order:
//!
//! ```text
//! undo(apply(d, ts), ts) == d
//! ```

use crate::error::CodecError;

/// XOR mask used by [`Transform::XorMask`].
const XOR_MASK: u8 = 0x55;

/// One reversible byte transform.
///
/// The wire-level identifiers 1..=8 are only meaningful at the
/// [`TryFrom<u8>`] boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transform {
    /// XOR every byte with `0x55`. Self-inverse.
    XorMask,
    /// Rotate every byte left by one bit.
    RotateLeft1,
    /// Add one to every byte, wrapping.
    Increment,
    /// Subtract one from every byte, wrapping.
    Decrement,
    /// Reverse the byte order of the buffer. Self-inverse.
    Reverse,
    /// Swap the high and low nibble of every byte. Self-inverse.
    SwapNibbles,
    /// Bitwise NOT of every byte. Self-inverse.
    Invert,
    /// Rotate every byte left by three bits.
    RotateLeft3,
}

impl Transform {
    /// All transforms in identifier order.
    pub const ALL: [Self; 8] = [
        Self::XorMask,
        Self::RotateLeft1,
        Self::Increment,
        Self::Decrement,
        Self::Reverse,
        Self::SwapNibbles,
        Self::Invert,
        Self::RotateLeft3,
    ];

    /// Wire-level identifier (1..=8).
    pub fn id(self) -> u8 {
        match self {
            Self::XorMask => 1,
            Self::RotateLeft1 => 2,
            Self::Increment => 3,
            Self::Decrement => 4,
            Self::Reverse => 5,
            Self::SwapNibbles => 6,
            Self::Invert => 7,
            Self::RotateLeft3 => 8,
        }
    }

    /// True if the transform is its own inverse.
    pub fn is_involution(self) -> bool {
        matches!(self, Self::XorMask | Self::Reverse | Self::SwapNibbles | Self::Invert)
    }

    /// Apply the forward transform in place.
    pub fn forward(self, buf: &mut [u8]) {
        match self {
            Self::XorMask => map_bytes(buf, |b| b ^ XOR_MASK),
            Self::RotateLeft1 => map_bytes(buf, |b| b.rotate_left(1)),
            Self::Increment => map_bytes(buf, |b| b.wrapping_add(1)),
            Self::Decrement => map_bytes(buf, |b| b.wrapping_sub(1)),
            Self::Reverse => buf.reverse(),
            Self::SwapNibbles => map_bytes(buf, |b| b.rotate_left(4)),
            Self::Invert => map_bytes(buf, |b| !b),
            Self::RotateLeft3 => map_bytes(buf, |b| b.rotate_left(3)),
        }
    }

    /// Apply the inverse transform in place.
    pub fn inverse(self, buf: &mut [u8]) {
        match self {
            Self::RotateLeft1 => map_bytes(buf, |b| b.rotate_right(1)),
            Self::Increment => map_bytes(buf, |b| b.wrapping_sub(1)),
            Self::Decrement => map_bytes(buf, |b| b.wrapping_add(1)),
            Self::RotateLeft3 => map_bytes(buf, |b| b.rotate_right(3)),
            Self::XorMask | Self::Reverse | Self::SwapNibbles | Self::Invert => self.forward(buf),
        }
    }
}

impl TryFrom<u8> for Transform {
    type Error = CodecError;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        match id {
            1..=8 => Ok(Self::ALL[usize::from(id - 1)]),
            _ => Err(CodecError::UnknownTransform { id }),
        }
    }
}

fn map_bytes(buf: &mut [u8], f: impl Fn(u8) -> u8) {
    for byte in buf.iter_mut() {
        *byte = f(*byte);
    }
}

/// Fold the forward transforms over `data` in listed order.
pub fn apply(data: &[u8], transforms: &[Transform]) -> Vec<u8> {
    let mut buf = data.to_vec();
    for transform in transforms {
        transform.forward(&mut buf);
    }
    buf
}

/// Fold the inverse transforms over `data` in reverse listed order.
pub fn undo(data: &[u8], transforms: &[Transform]) -> Vec<u8> {
    let mut buf = data.to_vec();
    for transform in transforms.iter().rev() {
        transform.inverse(&mut buf);
    }
    buf
}
