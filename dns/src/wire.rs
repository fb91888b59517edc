//! The DNS wire protocol: errors, cursors, and the compression map.

pub(crate) use std::io::{Cursor, Read};
pub(crate) use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use std::collections::HashMap;
use std::io;

use log::*;


/// The largest offset that a compression pointer can encode. The high two
/// bits of the pointer are the `11` marker, leaving fourteen for the offset.
pub const MAX_POINTER_OFFSET: u16 = 0x3FFF;

/// How many compression pointers a single name may chase before the decoder
/// gives up and declares a loop.
pub const POINTER_LIMIT: usize = 10;


/// Something that can go wrong deciphering DNS wire data.
#[derive(PartialEq, Debug, Clone)]
pub enum WireError {

    /// There was an IO error reading from the cursor.
    /// Almost all the time, this means that the buffer was too short.
    IO,
    // (io::Error is not PartialEq so we don’t propagate it)

    /// When the DNS standard requires records of this type to have a certain
    /// fixed length, but the message specified a different length.
    WrongRecordLength {

        /// The length of the record’s data, as specified in the message.
        stated_length: u16,

        /// The length that the DNS specification mandates.
        mandated_length: MandatedLength,
    },

    /// When the length of this record as specified in the message differs
    /// from the length computed by actually reading its fields.
    ///
    /// The record size is length-prefixed up front, but fields inside the
    /// record (names, counted strings) carry their own lengths, and the two
    /// sources can disagree. The reader trusts the stated length to bound
    /// the record and raises this error when the totals differ, after
    /// resynchronising the outer cursor to the stated end so one bad record
    /// cannot corrupt the rest of the message.
    WrongLabelLength {

        /// The length of the record’s data, as specified in the message.
        stated_length: u16,

        /// The computed length of the record’s data, based on the number of
        /// bytes consumed by reading its fields.
        length_after_labels: u16,
    },

    /// When a name contained a chain of more than [`POINTER_LIMIT`]
    /// compression pointers. Contains the offsets that were being chased.
    TooMuchRecursion(Vec<u16>),

    /// When a name contained a compression pointer to an offset at or past
    /// the pointer itself. Forward pointers can produce loops, so they are
    /// rejected outright. Contains the invalid offset.
    OutOfBounds(u16),

    /// When a label length byte had `10` or `01` in its high two bits.
    /// Those combinations are reserved and never valid.
    BadLabelBits(u8),

    /// When a label was longer than 63 octets.
    LabelTooLong(usize),

    /// When a whole name came out longer than 255 octets on the wire.
    NameTooLong(usize),
}

/// The rule for how long a record in a message should be.
#[derive(PartialEq, Debug, Copy, Clone)]
pub enum MandatedLength {

    /// The record should be exactly this many bytes in length.
    Exactly(u16),

    /// The record should be _at least_ this many bytes in length.
    AtLeast(u16),
}

impl From<io::Error> for WireError {
    fn from(ioe: io::Error) -> Self {
        error!("IO error -> {:?}", ioe);
        Self::IO
    }
}

impl std::fmt::Display for WireError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IO => {
                write!(f, "Malformed message: insufficient data")
            }
            Self::WrongRecordLength { stated_length, mandated_length: MandatedLength::Exactly(len) } => {
                write!(f, "Malformed message: record length {} should be exactly {}", stated_length, len)
            }
            Self::WrongRecordLength { stated_length, mandated_length: MandatedLength::AtLeast(len) } => {
                write!(f, "Malformed message: record length {} should be at least {}", stated_length, len)
            }
            Self::WrongLabelLength { stated_length, length_after_labels } => {
                write!(f, "Malformed message: record length {} but fields totalled {}", stated_length, length_after_labels)
            }
            Self::TooMuchRecursion(offsets) => {
                write!(f, "Malformed message: too many compression pointers: {:?}", offsets)
            }
            Self::OutOfBounds(offset) => {
                write!(f, "Malformed message: pointer to out-of-bounds offset {}", offset)
            }
            Self::BadLabelBits(byte) => {
                write!(f, "Malformed message: reserved label bits in {:#04x}", byte)
            }
            Self::LabelTooLong(len) => {
                write!(f, "Malformed message: label of {} octets", len)
            }
            Self::NameTooLong(len) => {
                write!(f, "Malformed message: name of {} octets", len)
            }
        }
    }
}


/// The compression map used while serialising a message.
///
/// Maps each name suffix that has already been written to the absolute
/// offset of its first occurrence. Serialisation is two-pass: a size pass
/// and a write pass run the same algorithm over the same records, and the
/// map is cleared in between so both passes make identical pointer choices.
#[derive(Debug, Default)]
pub struct Compressor {
    offsets: HashMap<String, u16>,
}

impl Compressor {

    /// Creates an empty compression map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Forgets every recorded suffix, ready for the next pass.
    pub fn clear(&mut self) {
        self.offsets.clear();
    }

    /// Returns the offset the given suffix was first written at, if any.
    /// Suffix keys are case-folded, as compression is case-insensitive.
    pub fn lookup(&self, suffix: &str) -> Option<u16> {
        self.offsets.get(&suffix.to_ascii_lowercase()).copied()
    }

    /// Records that the given suffix lives at the given offset. Offsets
    /// that do not fit in a fourteen-bit pointer are not recorded, so they
    /// can never be pointed at.
    pub fn insert(&mut self, suffix: &str, offset: usize) {
        if offset <= usize::from(MAX_POINTER_OFFSET) {
            self.offsets.entry(suffix.to_ascii_lowercase())
                        .or_insert(offset as u16);
        }
        else {
            trace!("Offset {} too large to compress against", offset);
        }
    }
}


#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn compressor_round_trip() {
        let mut comp = Compressor::new();
        comp.insert("example.com.", 12);

        assert_eq!(comp.lookup("example.com."), Some(12));
        assert_eq!(comp.lookup("EXAMPLE.com."), Some(12));
        assert_eq!(comp.lookup("com."), None);
    }

    #[test]
    fn compressor_first_offset_wins() {
        let mut comp = Compressor::new();
        comp.insert("example.com.", 12);
        comp.insert("example.com.", 40);

        assert_eq!(comp.lookup("example.com."), Some(12));
    }

    #[test]
    fn compressor_rejects_wide_offsets() {
        let mut comp = Compressor::new();
        comp.insert("example.com.", 0x4000);

        assert_eq!(comp.lookup("example.com."), None);
    }

    #[test]
    fn compressor_clears() {
        let mut comp = Compressor::new();
        comp.insert("example.com.", 12);
        comp.clear();

        assert_eq!(comp.lookup("example.com."), None);
    }
}
