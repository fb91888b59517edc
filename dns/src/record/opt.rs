//! The OPT pseudo-record and the EDNS(0) options it carries.
//!
//! Unlike every other record type, OPT re-purposes the class and TTL
//! fields of the record frame: the class holds the sender’s UDP payload
//! size, and the TTL holds the extended response-code bits, the EDNS
//! version, and a flags word. The message codec lifts the one permitted
//! OPT record out of the additional section into a typed [`Edns`] value.

use std::convert::TryFrom;
use std::io;

use log::*;

use crate::name::Name;
use crate::wire::*;


/// The record type number of OPT.
pub const OPT_TYPE: u16 = 41;

/// The lower bound of the code range reserved for local use.
const LOCAL_LOW: u16 = 65001;

/// The upper bound of the code range reserved for local use.
const LOCAL_HIGH: u16 = 65534;


/// The EDNS(0) data carried by a message’s OPT record.
#[derive(PartialEq, Debug, Clone)]
pub struct Edns {

    /// The maximum size of a UDP packet the sender supports.
    pub udp_size: u16,

    /// The high eight bits of the twelve-bit response code.
    pub ext_rcode: u8,

    /// The version number of the DNS extension mechanism.
    pub version: u8,

    /// Sixteen bits worth of flags, of which only DO is assigned.
    pub flags: u16,

    /// The options in the record’s payload.
    pub options: Vec<EdnsOption>,
}

impl Default for Edns {
    fn default() -> Self {
        Self {
            udp_size: crate::types::MAX_EDNS_SIZE as u16,
            ext_rcode: 0,
            version: 0,
            flags: 0,
            options: Vec::new(),
        }
    }
}

impl Edns {

    /// Reads an OPT record body from the cursor. The owner name and the
    /// type number have already been taken off.
    pub fn read(c: &mut Cursor<&[u8]>) -> Result<Self, WireError> {
        let udp_size = c.read_u16::<BigEndian>()?;  // replaces the class field
        trace!("Parsed UDP payload size -> {:?}", udp_size);

        let ext_rcode = c.read_u8()?;  // replaces the ttl field...
        trace!("Parsed extended RCODE bits -> {:#010b}", ext_rcode);

        let version = c.read_u8()?;  // ...as does this...
        trace!("Parsed EDNS(0) version -> {:?}", version);

        let flags = c.read_u16::<BigEndian>()?;  // ...as does this
        trace!("Parsed flags -> {:#018b}", flags);

        let data_length = c.read_u16::<BigEndian>()?;
        let end = c.position() + u64::from(data_length);
        if end > c.get_ref().len() as u64 {
            return Err(WireError::IO);
        }

        let mut options = Vec::new();
        while c.position() < end {
            options.push(EdnsOption::read(c, end)?);
        }

        Ok(Self { udp_size, ext_rcode, version, flags, options })
    }

    /// Writes the whole OPT record: the root owner name, the type, the
    /// re-purposed class and TTL fields, and the options.
    pub fn write(&self, buf: &mut Vec<u8>) -> io::Result<()> {
        buf.write_u8(0)?;  // the root name
        buf.write_u16::<BigEndian>(OPT_TYPE)?;
        buf.write_u16::<BigEndian>(self.udp_size)?;
        buf.write_u8(self.ext_rcode)?;
        buf.write_u8(self.version)?;
        buf.write_u16::<BigEndian>(self.flags)?;

        let mut payload = Vec::new();
        for option in &self.options {
            option.write(&mut payload)?;
        }

        let payload_len = u16::try_from(payload.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "oversized OPT payload"))?;
        buf.write_u16::<BigEndian>(payload_len)?;
        buf.extend_from_slice(&payload);
        Ok(())
    }

    /// The size of the whole OPT record on the wire.
    pub fn wire_len(&self) -> usize {
        11 + self.options.iter().map(|o| 4 + o.data_len()).sum::<usize>()
    }

    /// Whether the DO (DNSSEC OK) flag is set.
    pub fn dnssec_ok(&self) -> bool {
        self.flags & 0x8000 != 0
    }
}


/// One EDNS(0) option: a tag, a length, and a code-specific payload.
#[derive(PartialEq, Debug, Clone)]
pub enum EdnsOption {

    /// Long-lived query metadata (code 1).
    Llq {
        version: u16,
        llq_opcode: u16,
        error: u16,
        id: u64,
        lease: u32,
    },

    /// An update lease duration (code 2).
    Ul {
        lease: u32,
    },

    /// A nameserver identifier (code 3).
    Nsid(Vec<u8>),

    /// Understood DNSSEC algorithms (code 5).
    Dau(Vec<u8>),

    /// Understood DS hash algorithms (code 6).
    Dhu(Vec<u8>),

    /// Understood NSEC3 hash algorithms (code 7).
    N3u(Vec<u8>),

    /// A client subnet hint (code 8).
    Subnet {
        family: u16,
        source_prefix: u8,
        scope_prefix: u8,
        address: Vec<u8>,
    },

    /// A zone expiry timer (code 9), empty in queries.
    Expire(Option<u32>),

    /// A server cookie (code 10).
    Cookie(Vec<u8>),

    /// An idle-timeout hint in hundreds of milliseconds (code 11),
    /// empty in queries.
    TcpKeepalive(Option<u16>),

    /// Padding to frustrate traffic analysis (code 12).
    Padding(Vec<u8>),

    /// The closest trust point for DNSSEC chain queries (code 13).
    Chain(Name),

    /// The key tags of the sender’s trust anchors (code 14).
    Keytag(Vec<u16>),

    /// An option from the local-use code range.
    Local {
        code: u16,
        data: Vec<u8>,
    },

    /// An option with a code this library does not recognise.
    Unknown {
        code: u16,
        data: Vec<u8>,
    },
}

impl EdnsOption {

    /// Reads one `<code><length><data>` option off the cursor.
    pub fn read(c: &mut Cursor<&[u8]>, end: u64) -> Result<Self, WireError> {
        let code = c.read_u16::<BigEndian>()?;
        let length = c.read_u16::<BigEndian>()?;
        trace!("Parsed option code {} with length {}", code, length);

        if c.position() + u64::from(length) > end {
            warn!("Option runs past the OPT payload");
            return Err(WireError::IO);
        }

        let mut data = vec![0_u8; usize::from(length)];
        c.read_exact(&mut data)?;

        let option = match code {
            1 => {
                let mut d = Cursor::new(&data[..]);
                Self::Llq {
                    version: d.read_u16::<BigEndian>()?,
                    llq_opcode: d.read_u16::<BigEndian>()?,
                    error: d.read_u16::<BigEndian>()?,
                    id: d.read_u64::<BigEndian>()?,
                    lease: d.read_u32::<BigEndian>()?,
                }
            }
            2 => {
                let mut d = Cursor::new(&data[..]);
                Self::Ul { lease: d.read_u32::<BigEndian>()? }
            }
            3 => Self::Nsid(data),
            5 => Self::Dau(data),
            6 => Self::Dhu(data),
            7 => Self::N3u(data),
            8 => {
                let mut d = Cursor::new(&data[..]);
                let family = d.read_u16::<BigEndian>()?;
                let source_prefix = d.read_u8()?;
                let scope_prefix = d.read_u8()?;
                let mut address = vec![0_u8; data.len().saturating_sub(4)];
                d.read_exact(&mut address)?;
                Self::Subnet { family, source_prefix, scope_prefix, address }
            }
            9 => {
                if data.is_empty() {
                    Self::Expire(None)
                }
                else {
                    let mut d = Cursor::new(&data[..]);
                    Self::Expire(Some(d.read_u32::<BigEndian>()?))
                }
            }
            10 => Self::Cookie(data),
            11 => {
                if data.is_empty() {
                    Self::TcpKeepalive(None)
                }
                else {
                    let mut d = Cursor::new(&data[..]);
                    Self::TcpKeepalive(Some(d.read_u16::<BigEndian>()?))
                }
            }
            12 => Self::Padding(data),
            13 => {
                let mut d = Cursor::new(&data[..]);
                let (name, _) = Name::read(&mut d)?;
                Self::Chain(name)
            }
            14 => {
                let mut d = Cursor::new(&data[..]);
                let mut tags = Vec::with_capacity(data.len() / 2);
                for _ in 0 .. data.len() / 2 {
                    tags.push(d.read_u16::<BigEndian>()?);
                }
                Self::Keytag(tags)
            }
            c if (LOCAL_LOW ..= LOCAL_HIGH).contains(&c) => Self::Local { code: c, data },
            c => Self::Unknown { code: c, data },
        };

        Ok(option)
    }

    /// Writes the option as `<code><length><data>`.
    pub fn write(&self, buf: &mut Vec<u8>) -> io::Result<()> {
        buf.write_u16::<BigEndian>(self.code())?;
        buf.write_u16::<BigEndian>(self.data_len() as u16)?;

        match self {
            Self::Llq { version, llq_opcode, error, id, lease } => {
                buf.write_u16::<BigEndian>(*version)?;
                buf.write_u16::<BigEndian>(*llq_opcode)?;
                buf.write_u16::<BigEndian>(*error)?;
                buf.write_u64::<BigEndian>(*id)?;
                buf.write_u32::<BigEndian>(*lease)?;
            }
            Self::Ul { lease } => {
                buf.write_u32::<BigEndian>(*lease)?;
            }
            Self::Nsid(data) | Self::Dau(data) | Self::Dhu(data) | Self::N3u(data)
            | Self::Cookie(data) | Self::Padding(data)
            | Self::Local { data, .. } | Self::Unknown { data, .. } => {
                buf.extend_from_slice(data);
            }
            Self::Subnet { family, source_prefix, scope_prefix, address } => {
                buf.write_u16::<BigEndian>(*family)?;
                buf.write_u8(*source_prefix)?;
                buf.write_u8(*scope_prefix)?;
                buf.extend_from_slice(address);
            }
            Self::Expire(lease) => {
                if let Some(lease) = lease {
                    buf.write_u32::<BigEndian>(*lease)?;
                }
            }
            Self::TcpKeepalive(timeout) => {
                if let Some(timeout) = timeout {
                    buf.write_u16::<BigEndian>(*timeout)?;
                }
            }
            Self::Chain(name) => {
                name.write(buf, None)?;
            }
            Self::Keytag(tags) => {
                for tag in tags {
                    buf.write_u16::<BigEndian>(*tag)?;
                }
            }
        }

        Ok(())
    }

    /// Rebuilds an option from its code and payload alone, as carried in
    /// the JSON and transcript forms.
    pub fn from_wire_parts(code: u16, data: &[u8]) -> Result<Self, WireError> {
        let mut wire = Vec::with_capacity(4 + data.len());
        wire.extend_from_slice(&code.to_be_bytes());
        wire.extend_from_slice(&(data.len() as u16).to_be_bytes());
        wire.extend_from_slice(data);

        let mut c = Cursor::new(&wire[..]);
        Self::read(&mut c, wire.len() as u64)
    }

    /// The option’s payload bytes, without the code and length tags.
    pub fn payload(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        let _ = self.write(&mut buf);
        buf.split_off(4)
    }

    /// The option’s assigned code.
    pub fn code(&self) -> u16 {
        match self {
            Self::Llq { .. }          => 1,
            Self::Ul { .. }           => 2,
            Self::Nsid(_)             => 3,
            Self::Dau(_)              => 5,
            Self::Dhu(_)              => 6,
            Self::N3u(_)              => 7,
            Self::Subnet { .. }       => 8,
            Self::Expire(_)           => 9,
            Self::Cookie(_)           => 10,
            Self::TcpKeepalive(_)     => 11,
            Self::Padding(_)          => 12,
            Self::Chain(_)            => 13,
            Self::Keytag(_)           => 14,
            Self::Local { code, .. }  => *code,
            Self::Unknown { code, .. } => *code,
        }
    }

    /// The length of the option’s payload.
    pub fn data_len(&self) -> usize {
        match self {
            Self::Llq { .. } => 18,
            Self::Ul { .. } => 4,
            Self::Nsid(data) | Self::Dau(data) | Self::Dhu(data) | Self::N3u(data)
            | Self::Cookie(data) | Self::Padding(data)
            | Self::Local { data, .. } | Self::Unknown { data, .. } => data.len(),
            Self::Subnet { address, .. } => 4 + address.len(),
            Self::Expire(lease) => if lease.is_some() { 4 } else { 0 },
            Self::TcpKeepalive(timeout) => if timeout.is_some() { 2 } else { 0 },
            Self::Chain(name) => name.wire_len(),
            Self::Keytag(tags) => tags.len() * 2,
        }
    }
}


#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_no_options() {
        let buf = &[
            0x05, 0xAC,  // UDP payload size
            0x00,        // extended RCODE bits
            0x00,        // EDNS(0) version
            0x00, 0x00,  // flags
            0x00, 0x00,  // payload length (followed by no payload)
        ][..];

        assert_eq!(Edns::read(&mut Cursor::new(buf)).unwrap(),
                   Edns {
                       udp_size: 1452,
                       ext_rcode: 0,
                       version: 0,
                       flags: 0,
                       options: vec![],
                   });
    }

    #[test]
    fn parses_cookie_option() {
        let buf = &[
            0x10, 0x00,  // UDP payload size
            0x00, 0x00, 0x00, 0x00,  // extended RCODE, version, flags
            0x00, 0x0C,  // payload length
            0x00, 0x0A,  // option code: COOKIE
            0x00, 0x08,  // option length
            0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08,
        ][..];

        let edns = Edns::read(&mut Cursor::new(buf)).unwrap();
        assert_eq!(edns.options,
                   vec![ EdnsOption::Cookie(vec![ 1, 2, 3, 4, 5, 6, 7, 8 ]) ]);
    }

    #[test]
    fn local_range_and_unknown_codes() {
        let buf = &[
            0x10, 0x00,
            0x00, 0x00, 0x00, 0x00,
            0x00, 0x0A,  // payload length
            0xFD, 0xE9,  // 65001, the bottom of the local range
            0x00, 0x01,
            0xAA,
            0x00, 0x63,  // 99, unassigned
            0x00, 0x01,
            0xBB,
        ][..];

        let edns = Edns::read(&mut Cursor::new(buf)).unwrap();
        assert_eq!(edns.options, vec![
            EdnsOption::Local { code: 65001, data: vec![ 0xAA ] },
            EdnsOption::Unknown { code: 99, data: vec![ 0xBB ] },
        ]);
    }

    #[test]
    fn option_round_trip() {
        let options = vec![
            EdnsOption::Nsid(vec![ b'n', b's', b'1' ]),
            EdnsOption::Subnet {
                family: 1,
                source_prefix: 24,
                scope_prefix: 0,
                address: vec![ 192, 0, 2 ],
            },
            EdnsOption::Expire(None),
            EdnsOption::TcpKeepalive(Some(100)),
            EdnsOption::Keytag(vec![ 20326 ]),
            EdnsOption::Chain(Name::parse("example.com.").unwrap()),
        ];

        let edns = Edns { options, ..Edns::default() };

        let mut buf = Vec::new();
        edns.write(&mut buf).unwrap();
        assert_eq!(buf.len(), edns.wire_len());

        // skip the owner name and the type number, as the message codec
        // takes those off before dispatching here
        let mut c = Cursor::new(&buf[..]);
        c.set_position(3);
        assert_eq!(Edns::read(&mut c).unwrap(), edns);
    }

    #[test]
    fn record_empty() {
        assert_eq!(Edns::read(&mut Cursor::new(&[][..])), Err(WireError::IO));
    }

    #[test]
    fn buffer_ends_abruptly() {
        let buf = &[ 0x05 ][..];
        assert_eq!(Edns::read(&mut Cursor::new(buf)), Err(WireError::IO));
    }

    #[test]
    fn option_runs_past_payload() {
        let buf = &[
            0x10, 0x00,
            0x00, 0x00, 0x00, 0x00,
            0x00, 0x04,  // payload length
            0x00, 0x0A,  // COOKIE
            0x00, 0x08,  // claims eight bytes, but the payload has none left
        ][..];

        assert!(Edns::read(&mut Cursor::new(buf)).is_err());
    }
}
