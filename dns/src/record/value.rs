//! Runtime field values and the wire-format side of the schema
//! interpreter.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use log::*;

use crate::bitmap::TypeBitmap;
use crate::name::Name;
use crate::wire::*;

use super::{FieldKind, RecordType, schema_of};


/// The data carried by one record: either decoded fields matching the
/// type’s schema, or opaque bytes for types without one.
#[derive(PartialEq, Debug, Clone)]
pub enum RData {

    /// Decoded fields, in schema order.
    Fields(Vec<FieldValue>),

    /// The raw bytes of a record whose type has no schema.
    Unknown(Vec<u8>),
}

/// The decoded value of one record field.
#[derive(PartialEq, Debug, Clone)]
pub enum FieldValue {
    Name(Name),
    Servers(Vec<Name>),
    Inet4(Ipv4Addr),
    Inet6(Ipv6Addr),
    Inet(IpAddr),
    Gateway(Gateway),
    Bytes(Vec<u8>),
    CharString(Vec<u8>),
    Strings(Vec<Vec<u8>>),
    Bitmap(TypeBitmap),
    Keytags(Vec<u16>),
    Time(u32),
    Type(RecordType),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    Locator32(u32),
    Locator64(u64),
    Eui48([u8; 6]),
    Eui64([u8; 8]),
    Apl(Vec<AplItem>),
    Atma { format: u8, address: Vec<u8> },
    Ports(Vec<u16>),
}

/// An IPsec gateway, whose shape is selected by the record’s
/// gateway-type field.
#[derive(PartialEq, Debug, Clone)]
pub enum Gateway {
    None,
    V4(Ipv4Addr),
    V6(Ipv6Addr),
    Name(Name),
}

/// One item of an address-prefix list.
#[derive(PartialEq, Debug, Clone)]
pub struct AplItem {

    /// The address family: 1 for IPv4, 2 for IPv6.
    pub family: u16,

    /// The prefix length in bits.
    pub prefix: u8,

    /// Whether the prefix is negated.
    pub negation: bool,

    /// The address, trimmed of trailing zero octets.
    pub address: Vec<u8>,
}


impl RData {

    /// Reads record data off the cursor, bounded by `end`, decoding it
    /// through the type’s schema or capturing it opaquely.
    pub fn read(rtype: RecordType, c: &mut Cursor<&[u8]>, end: u64) -> Result<Self, WireError> {
        if rtype == RecordType::HIP {
            return read_hip(c, end);
        }

        let schema = match schema_of(rtype) {
            Some(schema) => schema,
            None => {
                let mut bytes = vec![0_u8; (end - c.position()) as usize];
                c.read_exact(&mut bytes)?;
                return Ok(Self::Unknown(bytes));
            }
        };

        let start = c.position();
        let mut fields = Vec::with_capacity(schema.len());
        for field in schema {
            let value = read_field(field.kind, c, end, &fields)?;
            trace!("Parsed {} -> {:?}", field.name, value);

            if c.position() > end {
                return Err(WireError::WrongLabelLength {
                    stated_length: (end - start) as u16,
                    length_after_labels: (c.position() - start) as u16,
                });
            }

            fields.push(value);
        }

        Ok(Self::Fields(fields))
    }

    /// Writes the record data. Names compress only when a map is handed
    /// in, which the record frame does for the legacy types alone.
    pub fn write(&self, rtype: RecordType, buf: &mut Vec<u8>, mut compressor: Option<&mut Compressor>) -> io::Result<()> {
        let fields = match self {
            Self::Unknown(bytes) => {
                buf.extend_from_slice(bytes);
                return Ok(());
            }
            Self::Fields(fields) => fields,
        };

        if rtype == RecordType::HIP {
            return write_hip(fields, buf);
        }

        let schema = schema_of(rtype)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "no schema for type"))?;
        if schema.len() != fields.len() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "field count mismatch"));
        }

        for (field, value) in schema.iter().zip(fields) {
            write_field(field.kind, value, buf, compressor.as_deref_mut())?;
        }

        Ok(())
    }

    /// The size of the record data on the wire with no compression.
    pub fn wire_len(&self, rtype: RecordType) -> usize {
        match self {
            Self::Unknown(bytes) => bytes.len(),
            Self::Fields(fields) => {
                if rtype == RecordType::HIP {
                    return hip_wire_len(fields);
                }
                match schema_of(rtype) {
                    Some(schema) => {
                        schema.iter().zip(fields)
                              .map(|(field, value)| field_len_with_kind(field.kind, value))
                              .sum()
                    }
                    None => fields.iter().map(field_wire_len).sum(),
                }
            }
        }
    }

    /// The decoded fields, or the empty slice for opaque data.
    pub fn fields(&self) -> &[FieldValue] {
        match self {
            Self::Fields(fields) => fields,
            Self::Unknown(_) => &[],
        }
    }

    /// The first name field, which for the single-name record types is
    /// the record’s target.
    pub fn first_name(&self) -> Option<&Name> {
        self.fields().iter().find_map(|f| {
            match f {
                FieldValue::Name(name) => Some(name),
                _ => None,
            }
        })
    }

    /// Parses record data from its presentation form.
    pub fn read_str(rtype: RecordType, input: &str) -> Result<Self, super::TextError> {
        super::rdata_from_str(rtype, input)
    }
}


fn remaining(c: &Cursor<&[u8]>, end: u64) -> usize {
    end.saturating_sub(c.position()) as usize
}

fn read_exactly(c: &mut Cursor<&[u8]>, end: u64, len: usize) -> Result<Vec<u8>, WireError> {
    if remaining(c, end) < len {
        return Err(WireError::IO);
    }
    let mut bytes = vec![0_u8; len];
    c.read_exact(&mut bytes)?;
    Ok(bytes)
}

fn read_field(kind: FieldKind, c: &mut Cursor<&[u8]>, end: u64, prev: &[FieldValue]) -> Result<FieldValue, WireError> {
    use FieldKind as K;

    let value = match kind {
        K::Name => {
            let (name, _) = Name::read(c)?;
            FieldValue::Name(name)
        }
        K::Servers => {
            let mut servers = Vec::new();
            while c.position() < end {
                let (name, _) = Name::read(c)?;
                servers.push(name);
            }
            FieldValue::Servers(servers)
        }
        K::Inet4 => {
            let mut octets = [0_u8; 4];
            c.read_exact(&mut octets)?;
            FieldValue::Inet4(Ipv4Addr::from(octets))
        }
        K::Inet6 => {
            let mut octets = [0_u8; 16];
            c.read_exact(&mut octets)?;
            FieldValue::Inet6(Ipv6Addr::from(octets))
        }
        K::Inet => {
            match remaining(c, end) {
                4 => {
                    let mut octets = [0_u8; 4];
                    c.read_exact(&mut octets)?;
                    FieldValue::Inet(IpAddr::V4(Ipv4Addr::from(octets)))
                }
                16 => {
                    let mut octets = [0_u8; 16];
                    c.read_exact(&mut octets)?;
                    FieldValue::Inet(IpAddr::V6(Ipv6Addr::from(octets)))
                }
                len => {
                    warn!("Address field of {} bytes", len);
                    return Err(WireError::WrongRecordLength {
                        stated_length: len as u16,
                        mandated_length: MandatedLength::Exactly(4),
                    });
                }
            }
        }
        K::Target => {
            let gateway_type = prev.iter().rev().find_map(|f| {
                match f {
                    FieldValue::U8(n) => Some(*n),
                    _ => None,
                }
            });
            match gateway_type {
                Some(0) => FieldValue::Gateway(Gateway::None),
                Some(1) => {
                    let mut octets = [0_u8; 4];
                    c.read_exact(&mut octets)?;
                    FieldValue::Gateway(Gateway::V4(Ipv4Addr::from(octets)))
                }
                Some(2) => {
                    let mut octets = [0_u8; 16];
                    c.read_exact(&mut octets)?;
                    FieldValue::Gateway(Gateway::V6(Ipv6Addr::from(octets)))
                }
                Some(3) => {
                    let (name, _) = Name::read(c)?;
                    FieldValue::Gateway(Gateway::Name(name))
                }
                other => {
                    warn!("Unusable gateway type {:?}", other);
                    return Err(WireError::IO);
                }
            }
        }
        K::Hex | K::Base32Hex => {
            let len = c.read_u8()?;
            FieldValue::Bytes(read_exactly(c, end, usize::from(len))?)
        }
        K::Hex16 | K::Base64 => {
            let len = c.read_u16::<BigEndian>()?;
            FieldValue::Bytes(read_exactly(c, end, usize::from(len))?)
        }
        K::HexEnd | K::Base64End | K::Nsap => {
            FieldValue::Bytes(read_exactly(c, end, remaining(c, end))?)
        }
        K::Raw => {
            FieldValue::CharString(read_exactly(c, end, remaining(c, end))?)
        }
        K::CharacterString => {
            let len = c.read_u8()?;
            FieldValue::CharString(read_exactly(c, end, usize::from(len))?)
        }
        K::Txt => {
            let mut strings = Vec::new();
            while c.position() < end {
                let len = c.read_u8()?;
                strings.push(read_exactly(c, end, usize::from(len))?);
            }
            FieldValue::Strings(strings)
        }
        K::NsecBitmap => {
            FieldValue::Bitmap(TypeBitmap::read(remaining(c, end), c)?)
        }
        K::KeytagList => {
            let mut tags = Vec::new();
            while c.position() + 1 < end {
                tags.push(c.read_u16::<BigEndian>()?);
            }
            FieldValue::Keytags(tags)
        }
        K::SigTime => FieldValue::Time(c.read_u32::<BigEndian>()?),
        K::TypeNumber => FieldValue::Type(RecordType::from(c.read_u16::<BigEndian>()?)),
        K::U8 | K::Protocol => FieldValue::U8(c.read_u8()?),
        K::U16 => FieldValue::U16(c.read_u16::<BigEndian>()?),
        K::U32 => FieldValue::U32(c.read_u32::<BigEndian>()?),
        K::U48 => FieldValue::U64(c.read_u48::<BigEndian>()?),
        K::U64 => FieldValue::U64(c.read_u64::<BigEndian>()?),
        K::Nid32 => FieldValue::Locator32(c.read_u32::<BigEndian>()?),
        K::Nid64 => FieldValue::Locator64(c.read_u64::<BigEndian>()?),
        K::Eui48 => {
            let mut octets = [0_u8; 6];
            c.read_exact(&mut octets)?;
            FieldValue::Eui48(octets)
        }
        K::Eui64 => {
            let mut octets = [0_u8; 8];
            c.read_exact(&mut octets)?;
            FieldValue::Eui64(octets)
        }
        K::Apl => {
            let mut items = Vec::new();
            while c.position() < end {
                let family = c.read_u16::<BigEndian>()?;
                let prefix = c.read_u8()?;
                let len_octet = c.read_u8()?;
                let negation = len_octet & 0x80 != 0;
                let address = read_exactly(c, end, usize::from(len_octet & 0x7F))?;
                items.push(AplItem { family, prefix, negation, address });
            }
            FieldValue::Apl(items)
        }
        K::Atma => {
            let format = c.read_u8()?;
            let address = read_exactly(c, end, remaining(c, end))?;
            FieldValue::Atma { format, address }
        }
        K::Wks => {
            let bitmap = read_exactly(c, end, remaining(c, end))?;
            let mut ports = Vec::new();
            for (i, octet) in bitmap.iter().enumerate() {
                for bit in 0 .. 8 {
                    if octet & (0x80 >> bit) != 0 {
                        ports.push((i * 8 + bit) as u16);
                    }
                }
            }
            FieldValue::Ports(ports)
        }
    };

    Ok(value)
}

fn mismatch() -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, "field value does not match its kind")
}

fn write_counted_u8(bytes: &[u8], buf: &mut Vec<u8>) -> io::Result<()> {
    if bytes.len() > 255 {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "counted field over 255 bytes"));
    }
    buf.write_u8(bytes.len() as u8)?;
    buf.extend_from_slice(bytes);
    Ok(())
}

fn write_field(kind: FieldKind, value: &FieldValue, buf: &mut Vec<u8>, compressor: Option<&mut Compressor>) -> io::Result<()> {
    use FieldKind as K;

    match (kind, value) {
        (K::Name, FieldValue::Name(name)) => {
            name.write(buf, compressor)?;
        }
        (K::Servers, FieldValue::Servers(servers)) => {
            for server in servers {
                server.write(buf, None)?;
            }
        }
        (K::Inet4, FieldValue::Inet4(addr)) => {
            buf.extend_from_slice(&addr.octets());
        }
        (K::Inet6, FieldValue::Inet6(addr)) => {
            buf.extend_from_slice(&addr.octets());
        }
        (K::Inet, FieldValue::Inet(IpAddr::V4(addr))) => {
            buf.extend_from_slice(&addr.octets());
        }
        (K::Inet, FieldValue::Inet(IpAddr::V6(addr))) => {
            buf.extend_from_slice(&addr.octets());
        }
        (K::Target, FieldValue::Gateway(gateway)) => {
            match gateway {
                Gateway::None => { /* nothing on the wire */ }
                Gateway::V4(addr) => buf.extend_from_slice(&addr.octets()),
                Gateway::V6(addr) => buf.extend_from_slice(&addr.octets()),
                Gateway::Name(name) => name.write(buf, None)?,
            }
        }
        (K::Hex, FieldValue::Bytes(bytes)) | (K::Base32Hex, FieldValue::Bytes(bytes)) => {
            write_counted_u8(bytes, buf)?;
        }
        (K::Hex16, FieldValue::Bytes(bytes)) | (K::Base64, FieldValue::Bytes(bytes)) => {
            buf.write_u16::<BigEndian>(bytes.len() as u16)?;
            buf.extend_from_slice(bytes);
        }
        (K::HexEnd, FieldValue::Bytes(bytes))
        | (K::Base64End, FieldValue::Bytes(bytes))
        | (K::Nsap, FieldValue::Bytes(bytes)) => {
            buf.extend_from_slice(bytes);
        }
        (K::Raw, FieldValue::CharString(bytes)) => {
            buf.extend_from_slice(bytes);
        }
        (K::CharacterString, FieldValue::CharString(bytes)) => {
            write_counted_u8(bytes, buf)?;
        }
        (K::Txt, FieldValue::Strings(strings)) => {
            for string in strings {
                write_counted_u8(string, buf)?;
            }
        }
        (K::NsecBitmap, FieldValue::Bitmap(bitmap)) => {
            bitmap.write(buf);
        }
        (K::KeytagList, FieldValue::Keytags(tags)) => {
            for tag in tags {
                buf.write_u16::<BigEndian>(*tag)?;
            }
        }
        (K::SigTime, FieldValue::Time(time)) => {
            buf.write_u32::<BigEndian>(*time)?;
        }
        (K::TypeNumber, FieldValue::Type(rtype)) => {
            buf.write_u16::<BigEndian>(rtype.to_u16())?;
        }
        (K::U8, FieldValue::U8(n)) | (K::Protocol, FieldValue::U8(n)) => {
            buf.write_u8(*n)?;
        }
        (K::U16, FieldValue::U16(n)) => {
            buf.write_u16::<BigEndian>(*n)?;
        }
        (K::U32, FieldValue::U32(n)) => {
            buf.write_u32::<BigEndian>(*n)?;
        }
        (K::U48, FieldValue::U64(n)) => {
            buf.write_u48::<BigEndian>(*n)?;
        }
        (K::U64, FieldValue::U64(n)) => {
            buf.write_u64::<BigEndian>(*n)?;
        }
        (K::Nid32, FieldValue::Locator32(n)) => {
            buf.write_u32::<BigEndian>(*n)?;
        }
        (K::Nid64, FieldValue::Locator64(n)) => {
            buf.write_u64::<BigEndian>(*n)?;
        }
        (K::Eui48, FieldValue::Eui48(octets)) => {
            buf.extend_from_slice(octets);
        }
        (K::Eui64, FieldValue::Eui64(octets)) => {
            buf.extend_from_slice(octets);
        }
        (K::Apl, FieldValue::Apl(items)) => {
            for item in items {
                buf.write_u16::<BigEndian>(item.family)?;
                buf.write_u8(item.prefix)?;
                let negation = if item.negation { 0x80 } else { 0 };
                buf.write_u8(negation | (item.address.len() as u8 & 0x7F))?;
                buf.extend_from_slice(&item.address);
            }
        }
        (K::Atma, FieldValue::Atma { format, address }) => {
            buf.write_u8(*format)?;
            buf.extend_from_slice(address);
        }
        (K::Wks, FieldValue::Ports(ports)) => {
            if let Some(top) = ports.iter().max() {
                let mut bitmap = vec![0_u8; usize::from(top / 8) + 1];
                for port in ports {
                    bitmap[usize::from(port / 8)] |= 0x80 >> (port % 8);
                }
                buf.extend_from_slice(&bitmap);
            }
        }
        _ => return Err(mismatch()),
    }

    Ok(())
}

fn field_wire_len(value: &FieldValue) -> usize {
    match value {
        FieldValue::Name(name) => name.wire_len(),
        FieldValue::Servers(servers) => servers.iter().map(Name::wire_len).sum(),
        FieldValue::Inet4(_) => 4,
        FieldValue::Inet6(_) => 16,
        FieldValue::Inet(IpAddr::V4(_)) => 4,
        FieldValue::Inet(IpAddr::V6(_)) => 16,
        FieldValue::Gateway(Gateway::None) => 0,
        FieldValue::Gateway(Gateway::V4(_)) => 4,
        FieldValue::Gateway(Gateway::V6(_)) => 16,
        FieldValue::Gateway(Gateway::Name(name)) => name.wire_len(),
        FieldValue::Bytes(bytes) => bytes.len(),   // length prefixes are added below
        FieldValue::CharString(bytes) => bytes.len(),
        FieldValue::Strings(strings) => strings.iter().map(|s| s.len() + 1).sum(),
        FieldValue::Bitmap(bitmap) => bitmap.wire_len(),
        FieldValue::Keytags(tags) => tags.len() * 2,
        FieldValue::Time(_) => 4,
        FieldValue::Type(_) => 2,
        FieldValue::U8(_) => 1,
        FieldValue::U16(_) => 2,
        FieldValue::U32(_) => 4,
        FieldValue::U64(_) => 8,
        FieldValue::Locator32(_) => 4,
        FieldValue::Locator64(_) => 8,
        FieldValue::Eui48(_) => 6,
        FieldValue::Eui64(_) => 8,
        FieldValue::Apl(items) => items.iter().map(|i| 4 + i.address.len()).sum(),
        FieldValue::Atma { address, .. } => 1 + address.len(),
        FieldValue::Ports(ports) => {
            ports.iter().max().map_or(0, |top| usize::from(top / 8) + 1)
        }
    }
}


fn read_hip(c: &mut Cursor<&[u8]>, end: u64) -> Result<RData, WireError> {
    // The two length octets up front describe fields that appear after
    // the algorithm octet, so the layout cannot be read field-by-field.
    let hit_len = c.read_u8()?;
    let algorithm = c.read_u8()?;
    let pk_len = c.read_u16::<BigEndian>()?;

    let hit = read_exactly(c, end, usize::from(hit_len))?;
    let public_key = read_exactly(c, end, usize::from(pk_len))?;

    let mut servers = Vec::new();
    while c.position() < end {
        let (name, _) = Name::read(c)?;
        servers.push(name);
    }

    Ok(RData::Fields(vec![
        FieldValue::U8(algorithm),
        FieldValue::Bytes(hit),
        FieldValue::Bytes(public_key),
        FieldValue::Servers(servers),
    ]))
}

fn write_hip(fields: &[FieldValue], buf: &mut Vec<u8>) -> io::Result<()> {
    match fields {
        [FieldValue::U8(algorithm), FieldValue::Bytes(hit), FieldValue::Bytes(public_key), FieldValue::Servers(servers)] => {
            if hit.len() > 255 {
                return Err(io::Error::new(io::ErrorKind::InvalidInput, "oversized host identity tag"));
            }
            buf.write_u8(hit.len() as u8)?;
            buf.write_u8(*algorithm)?;
            buf.write_u16::<BigEndian>(public_key.len() as u16)?;
            buf.extend_from_slice(hit);
            buf.extend_from_slice(public_key);
            for server in servers {
                server.write(buf, None)?;
            }
            Ok(())
        }
        _ => Err(mismatch()),
    }
}

fn hip_wire_len(fields: &[FieldValue]) -> usize {
    match fields {
        [FieldValue::U8(_), FieldValue::Bytes(hit), FieldValue::Bytes(public_key), FieldValue::Servers(servers)] => {
            4 + hit.len() + public_key.len()
              + servers.iter().map(Name::wire_len).sum::<usize>()
        }
        _ => 0,
    }
}

/// Adds the length-prefix overhead that some field kinds carry on top of
/// their value bytes.
pub(super) fn field_len_with_kind(kind: FieldKind, value: &FieldValue) -> usize {
    let base = field_wire_len(value);
    match kind {
        FieldKind::Hex | FieldKind::Base32Hex | FieldKind::CharacterString => base + 1,
        FieldKind::Hex16 | FieldKind::Base64 => base + 2,
        _ => base,
    }
}
