//! The window-format type bitmap carried by NSEC, NSEC3, and CSYNC records.

use std::fmt;

use log::*;

use crate::wire::*;


/// A set of record type numbers in the RFC 4034 §4.1.2 window format: a
/// sequence of `(window, length, bits…)` blocks where block `w` covers
/// types `w*256` through `w*256 + length*8 - 1`, most significant bit
/// first within each octet.
#[derive(PartialEq, Eq, Debug, Clone, Default)]
pub struct TypeBitmap {
    types: Vec<u16>,
}

impl TypeBitmap {

    /// Builds a bitmap from the given type numbers, deduplicating and
    /// sorting them.
    pub fn from_types(types: impl IntoIterator<Item = u16>) -> Self {
        let mut types: Vec<u16> = types.into_iter().collect();
        types.sort_unstable();
        types.dedup();
        Self { types }
    }

    /// Whether the bitmap is empty.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Whether the given type number is present.
    pub fn has_type(&self, rtype: u16) -> bool {
        self.types.binary_search(&rtype).is_ok()
    }

    /// The type numbers in ascending order.
    pub fn types(&self) -> &[u16] {
        &self.types
    }

    /// Reads the given number of bytes as window blocks.
    pub fn read(len: usize, c: &mut Cursor<&[u8]>) -> Result<Self, WireError> {
        let mut types = Vec::new();
        let mut remaining = len;
        let mut previous_window = None;

        while remaining > 0 {
            if remaining < 2 {
                warn!("Dangling type bitmap window header");
                return Err(WireError::IO);
            }

            let window = c.read_u8()?;
            let block_len = c.read_u8()?;
            remaining -= 2;

            // Windows must be strictly increasing, and a block must carry
            // between 1 and 32 octets of bits.
            if previous_window.map_or(false, |w| window <= w) {
                warn!("Type bitmap windows out of order ({} after {:?})", window, previous_window);
                return Err(WireError::IO);
            }
            if block_len == 0 || block_len > 32 {
                warn!("Type bitmap block of {} octets", block_len);
                return Err(WireError::IO);
            }
            if remaining < usize::from(block_len) {
                return Err(WireError::IO);
            }

            for i in 0 .. block_len {
                let octet = c.read_u8()?;
                for bit in 0 .. 8 {
                    if octet & (0x80 >> bit) != 0 {
                        types.push(u16::from(window) * 256
                                 + u16::from(i) * 8
                                 + (bit as u16));
                    }
                }
            }

            remaining -= usize::from(block_len);
            previous_window = Some(window);
        }

        Ok(Self { types })
    }

    /// Writes the bitmap as window blocks, trimming trailing zero octets
    /// within each window.
    pub fn write(&self, buf: &mut Vec<u8>) {
        let mut window_start = 0;
        while window_start < self.types.len() {
            let window = (self.types[window_start] / 256) as u8;
            let window_end = self.types[window_start ..].iter()
                .take_while(|t| (*t / 256) as u8 == window)
                .count() + window_start;

            let mut bits = [0_u8; 32];
            let mut top_octet = 0;
            for &rtype in &self.types[window_start .. window_end] {
                let low = rtype % 256;
                let octet = usize::from(low / 8);
                bits[octet] |= 0x80 >> (low % 8);
                top_octet = top_octet.max(octet);
            }

            buf.push(window);
            buf.push(top_octet as u8 + 1);
            buf.extend_from_slice(&bits[..= top_octet]);

            window_start = window_end;
        }
    }

    /// The size of the encoded bitmap in bytes.
    pub fn wire_len(&self) -> usize {
        let mut buf = Vec::new();
        self.write(&mut buf);
        buf.len()
    }
}

impl fmt::Display for TypeBitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for &rtype in &self.types {
            if ! first {
                write!(f, " ")?;
            }
            write!(f, "{}", crate::record::RecordType::from(rtype))?;
            first = false;
        }
        Ok(())
    }
}


#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn round_trips() {
        let bitmap = TypeBitmap::from_types(vec![ 1, 2, 6, 15, 46, 47, 257, 1234 ]);

        let mut buf = Vec::new();
        bitmap.write(&mut buf);
        let read_back = TypeBitmap::read(buf.len(), &mut Cursor::new(&buf)).unwrap();

        assert_eq!(read_back, bitmap);
    }

    #[test]
    fn dedupes_and_sorts() {
        let bitmap = TypeBitmap::from_types(vec![ 15, 1, 15, 2 ]);
        assert_eq!(bitmap.types(), &[ 1, 2, 15 ]);
    }

    #[test]
    fn known_encoding() {
        // A NS SOA RRSIG NSEC DNSKEY, the root zone apex set.
        let bitmap = TypeBitmap::from_types(vec![ 1, 2, 6, 46, 47, 48 ]);

        let mut buf = Vec::new();
        bitmap.write(&mut buf);
        assert_eq!(buf, &[ 0x00, 0x07, 0x62, 0x00, 0x00, 0x00, 0x00, 0x03, 0x80 ]);
    }

    #[test]
    fn lookup() {
        let bitmap = TypeBitmap::from_types(vec![ 2, 43, 46, 47 ]);
        assert!(bitmap.has_type(2));
        assert!(bitmap.has_type(47));
        assert!(! bitmap.has_type(1));
        assert!(! bitmap.has_type(256 + 47));
    }

    #[test]
    fn high_window() {
        let bitmap = TypeBitmap::from_types(vec![ 32769 ]);

        let mut buf = Vec::new();
        bitmap.write(&mut buf);
        assert_eq!(buf[0], 128);

        let read_back = TypeBitmap::read(buf.len(), &mut Cursor::new(&buf)).unwrap();
        assert_eq!(read_back.types(), &[ 32769 ]);
    }

    #[test]
    fn rejects_bad_windows() {
        // second window not greater than the first
        let buf = &[ 0x01, 0x01, 0x80, 0x01, 0x01, 0x80 ][..];
        assert!(TypeBitmap::read(buf.len(), &mut Cursor::new(buf)).is_err());

        // zero-length block
        let buf = &[ 0x00, 0x00 ][..];
        assert!(TypeBitmap::read(buf.len(), &mut Cursor::new(buf)).is_err());
    }

    #[test]
    fn empty() {
        let bitmap = TypeBitmap::read(0, &mut Cursor::new(&[][..])).unwrap();
        assert!(bitmap.is_empty());
        assert_eq!(bitmap.wire_len(), 0);
    }
}
