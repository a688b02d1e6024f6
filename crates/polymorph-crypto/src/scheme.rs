//! Scheme table.
//!
//! A 4-bit sequence number selects one of sixteen fixed schemes. Each scheme
//! names the transforms applied to the plaintext and the instruction that
//! reads the next sequence number out of the same plaintext.

use crate::{
    error::CodecError,
    transform::Transform::{
        self, Decrement, Increment, Invert, Reverse, RotateLeft1, RotateLeft3, SwapNibbles,
        XorMask,
    },
};

/// A 4-bit sequence number (0..=15).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SequenceNumber(u8);

impl SequenceNumber {
    /// Sequence number in force at handshake completion.
    pub const MIN: Self = Self(0);

    /// Largest valid sequence number.
    pub const MAX: Self = Self(0x0f);

    /// Build from the low nibble of `byte`, ignoring the high nibble.
    pub fn from_low_nibble(byte: u8) -> Self {
        Self(byte & 0x0f)
    }

    /// Raw value.
    pub fn value(self) -> u8 {
        self.0
    }

    /// The scheme this sequence number selects.
    pub fn scheme(self) -> &'static Scheme {
        &SCHEMES[usize::from(self.0)]
    }
}

impl TryFrom<u8> for SequenceNumber {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if value > Self::MAX.0 {
            return Err(CodecError::InvalidSequenceNumber { value });
        }
        Ok(Self(value))
    }
}

impl std::fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:X}", self.0)
    }
}

/// How to read a 4-bit value out of a plaintext buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Extraction {
    /// Low nibble of the byte at this index.
    ByteIndex(usize),
    /// Low nibble of the final byte.
    LastByte,
    /// Low nibble of `plaintext[start]`; `len` only widens the bounds check.
    Slice {
        /// First byte of the slice.
        start: usize,
        /// Slice length.
        len: usize,
    },
    /// One nibble of the byte at `byte_index`: selector 0 reads the low
    /// nibble, any other value the high nibble.
    BitPos {
        /// Byte to read.
        byte_index: usize,
        /// Nibble selector.
        selector: u8,
    },
}

impl Extraction {
    /// Instruction in force before any message has been exchanged.
    pub const INITIAL: Self = Self::ByteIndex(0);

    /// Minimum plaintext length this instruction can read from.
    pub fn required_len(self) -> usize {
        match self {
            Self::ByteIndex(index) | Self::BitPos { byte_index: index, .. } => {
                index.saturating_add(1)
            },
            Self::LastByte => 1,
            Self::Slice { start, len } => start.saturating_add(len),
        }
    }

    /// Read the next sequence number from `plaintext`.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::ExtractionOutOfRange` if the plaintext is shorter
    /// than [`Self::required_len`].
    pub fn extract(self, plaintext: &[u8]) -> Result<SequenceNumber, CodecError> {
        let needed = self.required_len();
        let out_of_range = CodecError::ExtractionOutOfRange { needed, len: plaintext.len() };

        let byte = match self {
            Self::ByteIndex(index) => plaintext.get(index),
            Self::LastByte => plaintext.last(),
            // The slice length takes part in the bounds check only.
            Self::Slice { start, .. } => {
                if needed > plaintext.len() {
                    return Err(out_of_range);
                }
                plaintext.get(start)
            },
            Self::BitPos { byte_index, selector } => {
                return plaintext
                    .get(byte_index)
                    .map(|&b| if selector == 0 { b } else { b >> 4 })
                    .map(SequenceNumber::from_low_nibble)
                    .ok_or(out_of_range);
            },
        };

        byte.copied().map(SequenceNumber::from_low_nibble).ok_or(out_of_range)
    }
}

/// A transform sequence plus the instruction for the next sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scheme {
    /// Transforms applied in order on encode, undone in reverse on decode.
    pub transforms: &'static [Transform],
    /// How the next sequence number is read from this message's plaintext.
    pub next: Extraction,
}

/// The sixteen schemes, indexed by sequence number.
pub static SCHEMES: [Scheme; 16] = [
    Scheme {
        transforms: &[XorMask, RotateLeft1, Increment, Decrement],
        next: Extraction::ByteIndex(0),
    },
    Scheme { transforms: &[XorMask, Increment, Reverse], next: Extraction::LastByte },
    Scheme {
        transforms: &[RotateLeft1, Decrement, SwapNibbles, RotateLeft3],
        next: Extraction::Slice { start: 1, len: 1 },
    },
    Scheme {
        transforms: &[RotateLeft3, Invert],
        next: Extraction::BitPos { byte_index: 0, selector: 4 },
    },
    Scheme { transforms: &[XorMask, Reverse], next: Extraction::ByteIndex(2) },
    Scheme { transforms: &[Increment, SwapNibbles, XorMask], next: Extraction::LastByte },
    Scheme { transforms: &[Decrement, RotateLeft1], next: Extraction::Slice { start: 0, len: 2 } },
    Scheme {
        transforms: &[SwapNibbles, Increment, RotateLeft3],
        next: Extraction::ByteIndex(1),
    },
    Scheme {
        transforms: &[Invert, XorMask, Decrement],
        next: Extraction::Slice { start: 2, len: 1 },
    },
    Scheme { transforms: &[RotateLeft1, RotateLeft3], next: Extraction::ByteIndex(3) },
    Scheme {
        transforms: &[Increment, XorMask, SwapNibbles, Invert],
        next: Extraction::LastByte,
    },
    Scheme {
        transforms: &[Decrement, RotateLeft3, RotateLeft1],
        next: Extraction::BitPos { byte_index: 1, selector: 4 },
    },
    Scheme {
        transforms: &[Reverse, Invert, Increment],
        next: Extraction::Slice { start: 0, len: 1 },
    },
    Scheme {
        transforms: &[SwapNibbles, RotateLeft1, XorMask],
        next: Extraction::ByteIndex(4),
    },
    Scheme { transforms: &[Invert, Decrement], next: Extraction::Slice { start: 4, len: 1 } },
    Scheme {
        transforms: &[RotateLeft3, Reverse, XorMask, Increment],
        next: Extraction::ByteIndex(5),
    },
];
