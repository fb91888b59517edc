//! Domain names: labels, case-insensitive comparison, presentation escapes,
//! and the compressed wire form.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::io;

use log::*;

use crate::wire::*;


/// The maximum length of a whole name on the wire, including the root label.
pub const MAX_NAME_SIZE: usize = 255;

/// The maximum length of a single label.
pub const MAX_LABEL_SIZE: usize = 63;

/// The characters that must be escaped with a backslash in presentation
/// form, on top of the non-printable range.
const RESERVED: &[u8] = b".();@\"\\ ";


/// A domain name: a sequence of labels, each 1 to 63 octets of opaque
/// bytes, at most 255 octets in total on the wire.
///
/// Labels keep the case they arrived with, but names compare and hash
/// case-insensitively (ASCII fold only), so `Example.COM.` and
/// `example.com.` are the same name that prints differently.
#[derive(Debug, Clone, Default)]
pub struct Name {
    labels: Vec<Vec<u8>>,
}

impl Name {

    /// The root name, which has no labels.
    pub fn root() -> Self {
        Self { labels: Vec::new() }
    }

    /// Creates a name from raw label bytes, validating the length limits.
    pub fn from_labels(labels: Vec<Vec<u8>>) -> Result<Self, NameError> {
        for label in &labels {
            if label.is_empty() {
                return Err(NameError::EmptyLabel);
            }
            if label.len() > MAX_LABEL_SIZE {
                return Err(NameError::LabelTooLong(label.len()));
            }
        }

        let name = Self { labels };
        if name.wire_len() > MAX_NAME_SIZE {
            return Err(NameError::NameTooLong(name.wire_len()));
        }

        Ok(name)
    }

    /// Parses a name from its presentation form, which may or may not have
    /// a trailing dot; both produce the same fully-qualified name. Escapes
    /// are `\X` for a single character and `\DDD` for a decimal octet.
    pub fn parse(input: &str) -> Result<Self, NameError> {
        if input == "." {
            return Ok(Self::root());
        }
        if input.is_empty() {
            return Err(NameError::Empty);
        }

        let mut labels = Vec::new();
        let mut label = Vec::new();
        let mut chars = input.bytes().peekable();

        while let Some(b) = chars.next() {
            match b {
                b'\\' => {
                    let next = chars.next().ok_or(NameError::TrailingBackslash)?;
                    if next.is_ascii_digit() {
                        let d2 = chars.next().ok_or(NameError::BadEscape)?;
                        let d3 = chars.next().ok_or(NameError::BadEscape)?;
                        if ! d2.is_ascii_digit() || ! d3.is_ascii_digit() {
                            return Err(NameError::BadEscape);
                        }

                        let value = u32::from(next - b'0') * 100
                                  + u32::from(d2 - b'0') * 10
                                  + u32::from(d3 - b'0');
                        if value > 255 {
                            return Err(NameError::BadEscape);
                        }

                        label.push(value as u8);
                    }
                    else {
                        label.push(next);
                    }
                }
                b'.' => {
                    if label.is_empty() {
                        return Err(NameError::EmptyLabel);
                    }
                    labels.push(std::mem::take(&mut label));
                }
                _ => {
                    label.push(b);
                }
            }
        }

        if ! label.is_empty() {
            labels.push(label);
        }

        Self::from_labels(labels)
    }

    /// Whether this is the root name.
    pub fn is_root(&self) -> bool {
        self.labels.is_empty()
    }

    /// The number of labels, not counting the root.
    pub fn label_count(&self) -> usize {
        self.labels.len()
    }

    /// The labels themselves, leftmost first.
    pub fn labels(&self) -> impl Iterator<Item = &[u8]> {
        self.labels.iter().map(|l| l.as_slice())
    }

    /// The length of this name on the wire, with no compression applied:
    /// one length octet per label, the label bytes, and the root octet.
    pub fn wire_len(&self) -> usize {
        self.labels.iter().map(|l| l.len() + 1).sum::<usize>() + 1
    }

    /// The name with the leftmost label removed, or `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            None
        }
        else {
            Some(Self { labels: self.labels[1..].to_vec() })
        }
    }

    /// Whether this name is equal to, or underneath, the given name.
    /// The root contains every name.
    pub fn is_subdomain_of(&self, other: &Self) -> bool {
        if other.labels.len() > self.labels.len() {
            return false;
        }

        let skip = self.labels.len() - other.labels.len();
        self.labels.iter().skip(skip).zip(&other.labels)
            .all(|(a, b)| fold_eq(a, b))
    }

    /// The case-folded presentation form, used as a map key.
    pub fn lookup_key(&self) -> String {
        self.to_string().to_ascii_lowercase()
    }

    /// The presentation form of the suffix starting at the given label.
    fn suffix_string(&self, from: usize) -> String {
        let mut out = String::new();
        for label in &self.labels[from..] {
            escape_label_into(label, &mut out);
            out.push('.');
        }
        if out.is_empty() {
            out.push('.');
        }
        out
    }

    /// Reads a name off the cursor, following compression pointers.
    ///
    /// Returns the name and the number of bytes the name occupies at the
    /// outer position: bytes read up to and including the first pointer,
    /// not the bytes visited while chasing it.
    pub fn read(c: &mut Cursor<&[u8]>) -> Result<(Self, u16), WireError> {
        let mut labels = Vec::new();
        let mut bytes_read = 0_u16;
        let mut followed: Vec<u16> = Vec::new();
        let mut wire_len = 1_usize;
        let mut return_position = None;

        loop {
            let byte = c.read_u8()?;
            if followed.is_empty() {
                bytes_read += 1;
            }

            match byte {
                0 => break,

                b if b & 0b_1100_0000 == 0b_1100_0000 => {
                    if followed.len() >= POINTER_LIMIT {
                        return Err(WireError::TooMuchRecursion(followed));
                    }

                    let second = c.read_u8()?;
                    if followed.is_empty() {
                        bytes_read += 1;
                    }

                    let offset = u16::from_be_bytes([b & 0b_0011_1111, second]);

                    // The pointer occupies the two bytes before the current
                    // position, so anything at or past that is a forward
                    // reference and gets rejected before it can loop.
                    let pointer_position = c.position() - 2;
                    if u64::from(offset) >= pointer_position {
                        return Err(WireError::OutOfBounds(offset));
                    }

                    trace!("Following pointer to offset {}", offset);
                    if return_position.is_none() {
                        return_position = Some(c.position());
                    }

                    followed.push(offset);
                    c.set_position(u64::from(offset));
                }

                b if b & 0b_1100_0000 != 0 => {
                    return Err(WireError::BadLabelBits(b));
                }

                len => {
                    let mut label = vec![0_u8; usize::from(len)];
                    c.read_exact(&mut label)?;
                    if followed.is_empty() {
                        bytes_read += u16::from(len);
                    }

                    wire_len += usize::from(len) + 1;
                    if wire_len > MAX_NAME_SIZE {
                        return Err(WireError::NameTooLong(wire_len));
                    }

                    labels.push(label);
                }
            }
        }

        if let Some(pos) = return_position {
            c.set_position(pos);
        }

        Ok((Self { labels }, bytes_read))
    }

    /// Writes this name to the buffer, which must be the whole message so
    /// far, as compression offsets count from its start.
    ///
    /// With a compression map, each suffix already in the map is written as
    /// a pointer to its first occurrence; new suffixes are recorded as they
    /// are written. Without a map the name is written as plain labels.
    pub fn write(&self, buf: &mut Vec<u8>, compressor: Option<&mut Compressor>) -> io::Result<()> {
        if let Some(comp) = compressor {
            for (i, label) in self.labels.iter().enumerate() {
                let suffix = self.suffix_string(i);

                if let Some(offset) = comp.lookup(&suffix) {
                    trace!("Compressing {:?} as pointer to {}", suffix, offset);
                    buf.write_u16::<BigEndian>(0b_1100_0000_0000_0000 | offset)?;
                    return Ok(());
                }

                comp.insert(&suffix, buf.len());
                buf.write_u8(label.len() as u8)?;
                buf.extend_from_slice(label);
            }
        }
        else {
            for label in &self.labels {
                buf.write_u8(label.len() as u8)?;
                buf.extend_from_slice(label);
            }
        }

        buf.write_u8(0)?;
        Ok(())
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        self.labels.len() == other.labels.len()
            && self.labels.iter().zip(&other.labels).all(|(a, b)| fold_eq(a, b))
    }
}

impl Eq for Name {}

impl Hash for Name {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for label in &self.labels {
            for b in label {
                state.write_u8(b.to_ascii_lowercase());
            }
            state.write_u8(0);
        }
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            return write!(f, ".");
        }

        let mut out = String::new();
        for label in &self.labels {
            escape_label_into(label, &mut out);
            out.push('.');
        }
        write!(f, "{}", out)
    }
}

impl std::str::FromStr for Name {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}


/// Compares two labels byte-by-byte with an ASCII case fold on both sides.
fn fold_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len()
        && a.iter().zip(b).all(|(x, y)| {
               x.to_ascii_lowercase() == y.to_ascii_lowercase()
           })
}

/// Appends the escaped presentation form of one label.
fn escape_label_into(label: &[u8], out: &mut String) {
    for &b in label {
        if b < 0x20 || b > 0x7E {
            out.push('\\');
            out.push_str(&format!("{:03}", b));
        }
        else if RESERVED.contains(&b) {
            out.push('\\');
            out.push(char::from(b));
        }
        else {
            out.push(char::from(b));
        }
    }
}


/// Something that can go wrong parsing a presentation-form name.
#[derive(PartialEq, Debug, Copy, Clone)]
pub enum NameError {

    /// The input string was empty.
    Empty,

    /// A label was empty, such as in `a..b.`.
    EmptyLabel,

    /// A label was longer than 63 octets.
    LabelTooLong(usize),

    /// The whole name would be longer than 255 octets on the wire.
    NameTooLong(usize),

    /// The input ended in the middle of a backslash escape.
    TrailingBackslash,

    /// A `\DDD` escape was cut short, had non-digits, or exceeded 255.
    BadEscape,
}

impl fmt::Display for NameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty              => write!(f, "empty name"),
            Self::EmptyLabel         => write!(f, "empty label"),
            Self::LabelTooLong(len)  => write!(f, "label of {} octets", len),
            Self::NameTooLong(len)   => write!(f, "name of {} octets", len),
            Self::TrailingBackslash  => write!(f, "trailing backslash"),
            Self::BadEscape          => write!(f, "invalid decimal escape"),
        }
    }
}


#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_and_prints() {
        let name = Name::parse("dns.lookup.dog").unwrap();
        assert_eq!(name.label_count(), 3);
        assert_eq!(name.to_string(), "dns.lookup.dog.");
    }

    #[test]
    fn trailing_dot_is_optional() {
        assert_eq!(Name::parse("example.com"), Name::parse("example.com."));
    }

    #[test]
    fn root() {
        let root = Name::parse(".").unwrap();
        assert!(root.is_root());
        assert_eq!(root.to_string(), ".");
        assert_eq!(root.wire_len(), 1);
    }

    #[test]
    fn case_folding_compares_both_sides() {
        assert_eq!(Name::parse("Example.COM.").unwrap(),
                   Name::parse("eXAMPLE.com.").unwrap());
        assert_ne!(Name::parse("exomple.com.").unwrap(),
                   Name::parse("example.com.").unwrap());
    }

    #[test]
    fn case_is_preserved() {
        let name = Name::parse("Example.COM.").unwrap();
        assert_eq!(name.to_string(), "Example.COM.");
    }

    #[test]
    fn decimal_escapes() {
        let name = Name::parse("\\003a\\046b.c").unwrap();
        assert_eq!(name.labels().next().unwrap(), &[3, b'a', b'.', b'b'][..]);
        assert_eq!(name.to_string(), "\\003a\\.b.c.");
    }

    #[test]
    fn character_escapes() {
        let name = Name::parse("a\\.b.c").unwrap();
        assert_eq!(name.label_count(), 2);
        assert_eq!(name.to_string(), "a\\.b.c.");
    }

    #[test]
    fn bad_escapes() {
        assert_eq!(Name::parse("a\\"),     Err(NameError::TrailingBackslash));
        assert_eq!(Name::parse("a\\25"),   Err(NameError::BadEscape));
        assert_eq!(Name::parse("a\\999"),  Err(NameError::BadEscape));
        assert_eq!(Name::parse("a..b"),    Err(NameError::EmptyLabel));
        assert_eq!(Name::parse(""),        Err(NameError::Empty));
    }

    #[test]
    fn label_limit() {
        let long = "a".repeat(64);
        assert_eq!(Name::parse(&long), Err(NameError::LabelTooLong(64)));
        assert!(Name::parse(&"a".repeat(63)).is_ok());
    }

    #[test]
    fn name_limit() {
        // Four 63-octet labels total 4 * 64 + 1 = 257 wire octets.
        let long = ["a".repeat(63), "b".repeat(63), "c".repeat(63), "d".repeat(63)].join(".");
        assert_eq!(Name::parse(&long), Err(NameError::NameTooLong(257)));

        // Shortening one label to 61 brings it to exactly 255.
        let edge = ["a".repeat(63), "b".repeat(63), "c".repeat(63), "d".repeat(61)].join(".");
        let name = Name::parse(&edge).unwrap();
        assert_eq!(name.wire_len(), 255);
    }

    #[test]
    fn subdomains() {
        let zone = Name::parse("example.com.").unwrap();
        assert!(Name::parse("www.example.com.").unwrap().is_subdomain_of(&zone));
        assert!(zone.is_subdomain_of(&zone));
        assert!(zone.is_subdomain_of(&Name::root()));
        assert!(! Name::parse("www.other.com.").unwrap().is_subdomain_of(&zone));
    }

    #[test]
    fn reads_uncompressed() {
        let buf = &[ 0x03, b'd', b'n', b's', 0x06, b'l', b'o', b'o', b'k',
                     b'u', b'p', 0x03, b'd', b'o', b'g', 0x00 ][..];

        let (name, len) = Name::read(&mut Cursor::new(buf)).unwrap();
        assert_eq!(name, Name::parse("dns.lookup.dog.").unwrap());
        assert_eq!(len, 16);
    }

    #[test]
    fn reads_pointer() {
        let buf = &[ 0x03, b'd', b'o', b'g', 0x00,   // "dog." at offset 0
                     0x03, b'w', b'w', b'w', 0xC0, 0x00 ][..];

        let mut c = Cursor::new(buf);
        c.set_position(5);
        let (name, len) = Name::read(&mut c).unwrap();
        assert_eq!(name, Name::parse("www.dog.").unwrap());
        assert_eq!(len, 6);
        assert_eq!(c.position(), 11);
    }

    #[test]
    fn rejects_self_pointer() {
        let buf = &[ 0x00, 0xC0, 0x01 ][..];
        let mut c = Cursor::new(buf);
        c.set_position(1);

        assert_eq!(Name::read(&mut c), Err(WireError::OutOfBounds(1)));
    }

    #[test]
    fn rejects_forward_pointer() {
        let buf = &[ 0xC0, 0x04, 0x00, 0x00, 0x00 ][..];

        assert_eq!(Name::read(&mut Cursor::new(buf)),
                   Err(WireError::OutOfBounds(4)));
    }

    #[test]
    fn rejects_reserved_label_bits() {
        assert_eq!(Name::read(&mut Cursor::new(&[ 0b_0100_0001, b'x', 0x00 ][..])),
                   Err(WireError::BadLabelBits(0b_0100_0001)));
        assert_eq!(Name::read(&mut Cursor::new(&[ 0b_1000_0001, b'x', 0x00 ][..])),
                   Err(WireError::BadLabelBits(0b_1000_0001)));
    }

    #[test]
    fn writes_with_compression() {
        let mut buf = Vec::new();
        let mut comp = Compressor::new();

        Name::parse("example.com.").unwrap().write(&mut buf, Some(&mut comp)).unwrap();
        let first_len = buf.len();
        Name::parse("www.example.com.").unwrap().write(&mut buf, Some(&mut comp)).unwrap();

        assert_eq!(&buf[..first_len],
                   &[ 0x07, b'e', b'x', b'a', b'm', b'p', b'l', b'e',
                      0x03, b'c', b'o', b'm', 0x00 ][..]);
        assert_eq!(&buf[first_len..],
                   &[ 0x03, b'w', b'w', b'w', 0xC0, 0x00 ][..]);
    }

    #[test]
    fn compressed_write_reads_back() {
        let mut buf = Vec::new();
        let mut comp = Compressor::new();

        let first = Name::parse("a.example.com.").unwrap();
        let second = Name::parse("b.a.example.com.").unwrap();
        first.write(&mut buf, Some(&mut comp)).unwrap();
        let second_start = buf.len();
        second.write(&mut buf, Some(&mut comp)).unwrap();

        let mut c = Cursor::new(&buf[..]);
        assert_eq!(Name::read(&mut c).unwrap().0, first);
        c.set_position(second_start as u64);
        assert_eq!(Name::read(&mut c).unwrap().0, second);
    }
}
