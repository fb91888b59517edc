//! The JSON side of the schema interpreter. Each record becomes an
//! object keyed by its schema’s field names; binary fields keep the same
//! hex or base64 form they have in presentation text.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use data_encoding::{BASE32_DNSSEC, HEXLOWER_PERMISSIVE, HEXUPPER};
use serde_json::{json, Map, Value as JsonValue};

use crate::bitmap::TypeBitmap;
use crate::name::Name;

use super::text::{escape_bytes, unescape_bytes, format_serial_time, parse_serial_time};
use super::{FieldKind, FieldValue, Gateway, RData, RecordType, schema_of};


/// Something that can go wrong rebuilding a record from JSON.
#[derive(PartialEq, Debug, Clone)]
pub enum JsonError {

    /// The value was not an object.
    NotAnObject,

    /// A field named by the schema was absent.
    MissingField(&'static str),

    /// A field was present but held the wrong shape of value.
    BadField(&'static str),
}

impl fmt::Display for JsonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAnObject         => write!(f, "record data is not an object"),
            Self::MissingField(name)  => write!(f, "missing field {:?}", name),
            Self::BadField(name)      => write!(f, "malformed field {:?}", name),
        }
    }
}


/// Renders record data as a JSON object. Opaque data becomes
/// `{ "data": "<hex>" }`.
pub fn rdata_to_json(rtype: RecordType, data: &RData) -> JsonValue {
    let fields = match data {
        RData::Unknown(bytes) => {
            return json!({ "data": HEXUPPER.encode(bytes) });
        }
        RData::Fields(fields) => fields,
    };

    let schema = match schema_of(rtype) {
        Some(schema) => schema,
        None => return JsonValue::Null,
    };

    let mut object = Map::new();
    for (field, value) in schema.iter().zip(fields) {
        object.insert(field.name.into(), field_to_json(field.kind, value));
    }
    JsonValue::Object(object)
}

fn field_to_json(kind: FieldKind, value: &FieldValue) -> JsonValue {
    use FieldKind as K;

    match (kind, value) {
        (_, FieldValue::Name(name)) => json!(name.to_string()),
        (_, FieldValue::Servers(servers)) => {
            json!(servers.iter().map(Name::to_string).collect::<Vec<_>>())
        }
        (_, FieldValue::Inet4(addr)) => json!(addr.to_string()),
        (_, FieldValue::Inet6(addr)) => json!(addr.to_string()),
        (_, FieldValue::Inet(addr)) => json!(addr.to_string()),
        (_, FieldValue::Gateway(Gateway::None)) => json!("."),
        (_, FieldValue::Gateway(Gateway::V4(addr))) => json!(addr.to_string()),
        (_, FieldValue::Gateway(Gateway::V6(addr))) => json!(addr.to_string()),
        (_, FieldValue::Gateway(Gateway::Name(name))) => json!(name.to_string()),
        (K::Base32Hex, FieldValue::Bytes(bytes)) => {
            json!(BASE32_DNSSEC.encode(bytes).to_ascii_uppercase())
        }
        (K::Base64 | K::Base64End, FieldValue::Bytes(bytes)) => json!(base64::encode(bytes)),
        (_, FieldValue::Bytes(bytes)) => json!(HEXUPPER.encode(bytes)),
        (_, FieldValue::CharString(bytes)) => json!(escape_bytes(bytes)),
        (_, FieldValue::Strings(strings)) => {
            json!(strings.iter().map(|s| escape_bytes(s)).collect::<Vec<_>>())
        }
        (_, FieldValue::Bitmap(bitmap)) => {
            json!(bitmap.types().iter()
                  .map(|t| RecordType::from(*t).to_string())
                  .collect::<Vec<_>>())
        }
        (_, FieldValue::Keytags(tags)) => json!(tags),
        (_, FieldValue::Time(wire)) => json!(format_serial_time(*wire)),
        (_, FieldValue::Type(rtype)) => json!(rtype.to_string()),
        (_, FieldValue::U8(n)) => json!(n),
        (_, FieldValue::U16(n)) => json!(n),
        (_, FieldValue::U32(n)) => json!(n),
        (_, FieldValue::U64(n)) => json!(n),
        (_, FieldValue::Locator32(n)) => json!(Ipv4Addr::from(*n).to_string()),
        (_, FieldValue::Locator64(n)) => {
            json!(format!("{:04x}:{:04x}:{:04x}:{:04x}",
                          n >> 48 & 0xFFFF, n >> 32 & 0xFFFF, n >> 16 & 0xFFFF, n & 0xFFFF))
        }
        (_, FieldValue::Eui48(octets)) => {
            json!(octets.iter().map(|b| format!("{:02x}", b)).collect::<Vec<_>>().join("-"))
        }
        (_, FieldValue::Eui64(octets)) => {
            json!(octets.iter().map(|b| format!("{:02x}", b)).collect::<Vec<_>>().join("-"))
        }
        (_, FieldValue::Apl(items)) => {
            json!(items.iter().map(super::text::apl_item_to_string).collect::<Vec<_>>())
        }
        (_, FieldValue::Atma { format, address }) => {
            if *format == 1 {
                json!(format!("+{}", String::from_utf8_lossy(address)))
            }
            else {
                json!(HEXUPPER.encode(address))
            }
        }
        (_, FieldValue::Ports(ports)) => json!(ports),
    }
}


/// Rebuilds record data from a JSON object produced by [`rdata_to_json`].
pub fn rdata_from_json(rtype: RecordType, value: &JsonValue) -> Result<RData, JsonError> {
    let object = value.as_object().ok_or(JsonError::NotAnObject)?;

    let schema = match schema_of(rtype) {
        Some(schema) => schema,
        None => {
            let hex = object.get("data")
                .and_then(JsonValue::as_str)
                .ok_or(JsonError::MissingField("data"))?;
            let bytes = HEXLOWER_PERMISSIVE.decode(hex.as_bytes())
                .map_err(|_| JsonError::BadField("data"))?;
            return Ok(RData::Unknown(bytes));
        }
    };

    let mut fields = Vec::with_capacity(schema.len());
    for field in schema {
        let value = object.get(field.name).ok_or(JsonError::MissingField(field.name))?;
        fields.push(field_from_json(field.kind, field.name, value, &fields)?);
    }

    Ok(RData::Fields(fields))
}

fn field_from_json(kind: FieldKind, name: &'static str, value: &JsonValue, prev: &[FieldValue]) -> Result<FieldValue, JsonError> {
    use FieldKind as K;

    let bad = || JsonError::BadField(name);
    let as_str = |v: &JsonValue| v.as_str().map(str::to_owned).ok_or_else(bad);

    let value = match kind {
        K::Name => FieldValue::Name(Name::parse(&as_str(value)?).map_err(|_| bad())?),
        K::Servers => {
            let list = value.as_array().ok_or_else(bad)?;
            let mut servers = Vec::with_capacity(list.len());
            for entry in list {
                servers.push(Name::parse(entry.as_str().ok_or_else(bad)?).map_err(|_| bad())?);
            }
            FieldValue::Servers(servers)
        }
        K::Inet4 => FieldValue::Inet4(as_str(value)?.parse().map_err(|_| bad())?),
        K::Inet6 => FieldValue::Inet6(as_str(value)?.parse().map_err(|_| bad())?),
        K::Inet => FieldValue::Inet(as_str(value)?.parse().map_err(|_| bad())?),
        K::Target => {
            let text = as_str(value)?;
            let gateway = if text == "." {
                Gateway::None
            }
            else if let Ok(v4) = text.parse::<Ipv4Addr>() {
                Gateway::V4(v4)
            }
            else if let Ok(v6) = text.parse::<Ipv6Addr>() {
                Gateway::V6(v6)
            }
            else {
                Gateway::Name(Name::parse(&text).map_err(|_| bad())?)
            };

            let stated = prev.iter().rev().find_map(|f| {
                match f {
                    FieldValue::U8(n) => Some(*n),
                    _ => None,
                }
            });
            let actual = match gateway {
                Gateway::None => 0,
                Gateway::V4(_) => 1,
                Gateway::V6(_) => 2,
                Gateway::Name(_) => 3,
            };
            if stated != Some(actual) {
                return Err(bad());
            }
            FieldValue::Gateway(gateway)
        }
        K::Hex | K::Hex16 | K::HexEnd => {
            FieldValue::Bytes(HEXLOWER_PERMISSIVE.decode(as_str(value)?.as_bytes())
                .map_err(|_| bad())?)
        }
        K::Base32Hex => {
            FieldValue::Bytes(BASE32_DNSSEC.decode(as_str(value)?.to_ascii_lowercase().as_bytes())
                .map_err(|_| bad())?)
        }
        K::Base64 | K::Base64End => {
            FieldValue::Bytes(base64::decode(&as_str(value)?).map_err(|_| bad())?)
        }
        K::CharacterString | K::Raw => {
            FieldValue::CharString(unescape_bytes(&as_str(value)?).map_err(|_| bad())?)
        }
        K::Txt => {
            let list = value.as_array().ok_or_else(bad)?;
            let mut strings = Vec::with_capacity(list.len());
            for entry in list {
                strings.push(unescape_bytes(entry.as_str().ok_or_else(bad)?)
                    .map_err(|_| bad())?);
            }
            FieldValue::Strings(strings)
        }
        K::NsecBitmap => {
            let list = value.as_array().ok_or_else(bad)?;
            let mut types = Vec::with_capacity(list.len());
            for entry in list {
                let rtype = RecordType::from_name(entry.as_str().ok_or_else(bad)?)
                    .ok_or_else(bad)?;
                types.push(rtype.to_u16());
            }
            FieldValue::Bitmap(TypeBitmap::from_types(types))
        }
        K::KeytagList => {
            let list = value.as_array().ok_or_else(bad)?;
            let mut tags = Vec::with_capacity(list.len());
            for entry in list {
                let n = entry.as_u64().filter(|n| *n <= u64::from(u16::MAX)).ok_or_else(bad)?;
                tags.push(n as u16);
            }
            FieldValue::Keytags(tags)
        }
        K::SigTime => {
            FieldValue::Time(parse_serial_time(&as_str(value)?).ok_or_else(bad)?)
        }
        K::TypeNumber => {
            FieldValue::Type(RecordType::from_name(&as_str(value)?).ok_or_else(bad)?)
        }
        K::U8 | K::Protocol => {
            let n = value.as_u64().filter(|n| *n <= u64::from(u8::MAX)).ok_or_else(bad)?;
            FieldValue::U8(n as u8)
        }
        K::U16 => {
            let n = value.as_u64().filter(|n| *n <= u64::from(u16::MAX)).ok_or_else(bad)?;
            FieldValue::U16(n as u16)
        }
        K::U32 => {
            let n = value.as_u64().filter(|n| *n <= u64::from(u32::MAX)).ok_or_else(bad)?;
            FieldValue::U32(n as u32)
        }
        K::U48 => {
            let n = value.as_u64().filter(|n| *n < 1 << 48).ok_or_else(bad)?;
            FieldValue::U64(n)
        }
        K::U64 => FieldValue::U64(value.as_u64().ok_or_else(bad)?),
        K::Nid32 => {
            let addr: Ipv4Addr = as_str(value)?.parse().map_err(|_| bad())?;
            FieldValue::Locator32(u32::from(addr))
        }
        K::Nid64 => {
            let text = as_str(value)?;
            let groups: Vec<&str> = text.split(':').collect();
            if groups.len() != 4 {
                return Err(bad());
            }
            let mut locator = 0_u64;
            for group in groups {
                let part = u16::from_str_radix(group, 16).map_err(|_| bad())?;
                locator = locator << 16 | u64::from(part);
            }
            FieldValue::Locator64(locator)
        }
        K::Eui48 => {
            FieldValue::Eui48(parse_eui_json::<6>(&as_str(value)?).ok_or_else(bad)?)
        }
        K::Eui64 => {
            FieldValue::Eui64(parse_eui_json::<8>(&as_str(value)?).ok_or_else(bad)?)
        }
        K::Apl => {
            let list = value.as_array().ok_or_else(bad)?;
            let mut items = Vec::with_capacity(list.len());
            for entry in list {
                items.push(super::text::apl_item_from_str(entry.as_str().ok_or_else(bad)?)
                    .map_err(|_| bad())?);
            }
            FieldValue::Apl(items)
        }
        K::Nsap => {
            FieldValue::Bytes(HEXLOWER_PERMISSIVE.decode(as_str(value)?.as_bytes())
                .map_err(|_| bad())?)
        }
        K::Atma => {
            let text = as_str(value)?;
            if let Some(e164) = text.strip_prefix('+') {
                FieldValue::Atma { format: 1, address: e164.as_bytes().to_vec() }
            }
            else {
                FieldValue::Atma {
                    format: 0,
                    address: HEXLOWER_PERMISSIVE.decode(text.as_bytes()).map_err(|_| bad())?,
                }
            }
        }
        K::Wks => {
            let list = value.as_array().ok_or_else(bad)?;
            let mut ports = Vec::with_capacity(list.len());
            for entry in list {
                let n = entry.as_u64().filter(|n| *n <= u64::from(u16::MAX)).ok_or_else(bad)?;
                ports.push(n as u16);
            }
            FieldValue::Ports(ports)
        }
    };

    Ok(value)
}

fn parse_eui_json<const N: usize>(text: &str) -> Option<[u8; N]> {
    let parts: Vec<&str> = text.split('-').collect();
    if parts.len() != N {
        return None;
    }

    let mut octets = [0_u8; N];
    for (octet, part) in octets.iter_mut().zip(parts) {
        *octet = u8::from_str_radix(part, 16).ok()?;
    }
    Some(octets)
}
