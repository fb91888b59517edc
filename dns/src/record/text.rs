//! The presentation-format side of the schema interpreter: printing
//! record data as zone-file text and parsing it back.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use chrono::{NaiveDateTime, TimeZone, Utc};
use data_encoding::{BASE32_DNSSEC, HEXLOWER_PERMISSIVE, HEXUPPER};

use crate::name::{Name, NameError};

use super::{FieldKind, FieldValue, Gateway, AplItem, RData, RecordType, schema_of};


/// Something that can go wrong parsing presentation-format text.
#[derive(PartialEq, Debug, Clone)]
pub enum TextError {

    /// The input ran out before every field was filled.
    UnexpectedEnd,

    /// There were tokens left over after the last field.
    TrailingTokens(String),

    /// A token could not be parsed as the field it stands in for.
    BadToken(String),

    /// A number field held something other than a number in range.
    BadNumber(String),

    /// A name field failed to parse.
    BadName(NameError),

    /// A type field held an unknown mnemonic.
    BadType(String),

    /// A quoted string was left unterminated, or an escape was invalid.
    BadString,

    /// The generic `\#` form was malformed or its length did not match.
    BadGenericData,
}

impl From<NameError> for TextError {
    fn from(e: NameError) -> Self {
        Self::BadName(e)
    }
}

impl fmt::Display for TextError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedEnd       => write!(f, "unexpected end of record data"),
            Self::TrailingTokens(t)   => write!(f, "trailing data {:?}", t),
            Self::BadToken(t)         => write!(f, "unparseable field {:?}", t),
            Self::BadNumber(t)        => write!(f, "bad number {:?}", t),
            Self::BadName(e)          => write!(f, "bad name: {}", e),
            Self::BadType(t)          => write!(f, "unknown type {:?}", t),
            Self::BadString           => write!(f, "bad quoted string"),
            Self::BadGenericData      => write!(f, "bad generic record data"),
        }
    }
}


/// One token of presentation text, with its quoting preserved so that
/// names and strings can apply their own escape rules.
#[derive(PartialEq, Debug, Clone)]
pub(crate) struct Token {
    pub text: String,
    pub quoted: bool,
}

/// Splits presentation text into tokens: whitespace-separated words and
/// `"`-quoted strings, with parentheses treated as soft whitespace and a
/// `;` comment running to the end of the input.
pub(crate) fn tokenize(input: &str) -> Result<Vec<Token>, TextError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            ' ' | '\t' | '\n' | '\r' | '(' | ')' => continue,
            ';' => break,
            '"' => {
                let mut text = String::new();
                loop {
                    match chars.next() {
                        None => return Err(TextError::BadString),
                        Some('"') => break,
                        Some('\\') => {
                            text.push('\\');
                            text.push(chars.next().ok_or(TextError::BadString)?);
                        }
                        Some(other) => text.push(other),
                    }
                }
                tokens.push(Token { text, quoted: true });
            }
            _ => {
                let mut text = String::new();
                let mut current = c;
                loop {
                    text.push(current);
                    if current == '\\' {
                        if let Some(escaped) = chars.next() {
                            text.push(escaped);
                        }
                    }

                    match chars.peek() {
                        Some(&next) if ! next.is_ascii_whitespace()
                                    && next != '(' && next != ')' && next != ';' => {
                            current = next;
                            chars.next();
                        }
                        _ => break,
                    }
                }
                tokens.push(Token { text, quoted: false });
            }
        }
    }

    Ok(tokens)
}

/// Resolves the `\X` and `\DDD` escapes of a character-string.
pub(crate) fn unescape_bytes(text: &str) -> Result<Vec<u8>, TextError> {
    let mut out = Vec::new();
    let mut bytes = text.bytes();

    while let Some(b) = bytes.next() {
        if b != b'\\' {
            out.push(b);
            continue;
        }

        let next = bytes.next().ok_or(TextError::BadString)?;
        if next.is_ascii_digit() {
            let d2 = bytes.next().ok_or(TextError::BadString)?;
            let d3 = bytes.next().ok_or(TextError::BadString)?;
            if ! d2.is_ascii_digit() || ! d3.is_ascii_digit() {
                return Err(TextError::BadString);
            }
            let value = u32::from(next - b'0') * 100
                      + u32::from(d2 - b'0') * 10
                      + u32::from(d3 - b'0');
            if value > 255 {
                return Err(TextError::BadString);
            }
            out.push(value as u8);
        }
        else {
            out.push(next);
        }
    }

    Ok(out)
}

/// Escapes a character-string for output inside quotes.
pub(crate) fn escape_bytes(bytes: &[u8]) -> String {
    let mut out = String::new();
    for &b in bytes {
        if b == b'"' || b == b'\\' {
            out.push('\\');
            out.push(char::from(b));
        }
        else if b < 0x20 || b > 0x7E {
            out.push('\\');
            out.push_str(&format!("{:03}", b));
        }
        else {
            out.push(char::from(b));
        }
    }
    out
}


/// Renders record data in its presentation form, using the generic
/// `\# <len> <hex>` syntax for opaque data.
pub fn rdata_to_string(rtype: RecordType, data: &RData) -> String {
    let fields = match data {
        RData::Unknown(bytes) => {
            return if bytes.is_empty() {
                String::from("\\# 0")
            }
            else {
                format!("\\# {} {}", bytes.len(), HEXUPPER.encode(bytes))
            };
        }
        RData::Fields(fields) => fields,
    };

    let schema = match schema_of(rtype) {
        Some(schema) => schema,
        None => return String::new(),
    };

    let mut parts = Vec::with_capacity(fields.len());
    for (field, value) in schema.iter().zip(fields) {
        let part = field_to_string(field.kind, value);
        if ! part.is_empty() {
            parts.push(part);
        }
    }
    parts.join(" ")
}

fn field_to_string(kind: FieldKind, value: &FieldValue) -> String {
    use FieldKind as K;

    match (kind, value) {
        (_, FieldValue::Name(name)) => name.to_string(),
        (_, FieldValue::Servers(servers)) => {
            servers.iter().map(Name::to_string).collect::<Vec<_>>().join(" ")
        }
        (_, FieldValue::Inet4(addr)) => addr.to_string(),
        (_, FieldValue::Inet6(addr)) => addr.to_string(),
        (_, FieldValue::Inet(addr)) => addr.to_string(),
        (_, FieldValue::Gateway(Gateway::None)) => String::from("."),
        (_, FieldValue::Gateway(Gateway::V4(addr))) => addr.to_string(),
        (_, FieldValue::Gateway(Gateway::V6(addr))) => addr.to_string(),
        (_, FieldValue::Gateway(Gateway::Name(name))) => name.to_string(),
        (K::Base32Hex, FieldValue::Bytes(bytes)) => {
            BASE32_DNSSEC.encode(bytes).to_ascii_uppercase()
        }
        (K::Base64 | K::Base64End, FieldValue::Bytes(bytes)) => base64::encode(bytes),
        (K::Nsap, FieldValue::Bytes(bytes)) => format!("0x{}", HEXLOWER_PERMISSIVE.encode(bytes)),
        (_, FieldValue::Bytes(bytes)) => {
            if bytes.is_empty() {
                String::from("-")
            }
            else {
                HEXUPPER.encode(bytes)
            }
        }
        (_, FieldValue::CharString(bytes)) => format!("\"{}\"", escape_bytes(bytes)),
        (_, FieldValue::Strings(strings)) => {
            strings.iter().map(|s| format!("\"{}\"", escape_bytes(s)))
                   .collect::<Vec<_>>().join(" ")
        }
        (_, FieldValue::Bitmap(bitmap)) => bitmap.to_string(),
        (_, FieldValue::Keytags(tags)) => {
            tags.iter().map(u16::to_string).collect::<Vec<_>>().join(" ")
        }
        (_, FieldValue::Time(wire)) => format_serial_time(*wire),
        (_, FieldValue::Type(rtype)) => rtype.to_string(),
        (_, FieldValue::U8(n)) => n.to_string(),
        (_, FieldValue::U16(n)) => n.to_string(),
        (_, FieldValue::U32(n)) => n.to_string(),
        (_, FieldValue::U64(n)) => n.to_string(),
        (_, FieldValue::Locator32(n)) => Ipv4Addr::from(*n).to_string(),
        (_, FieldValue::Locator64(n)) => {
            format!("{:04x}:{:04x}:{:04x}:{:04x}",
                    n >> 48 & 0xFFFF, n >> 32 & 0xFFFF, n >> 16 & 0xFFFF, n & 0xFFFF)
        }
        (_, FieldValue::Eui48(octets)) => {
            octets.iter().map(|b| format!("{:02x}", b)).collect::<Vec<_>>().join("-")
        }
        (_, FieldValue::Eui64(octets)) => {
            octets.iter().map(|b| format!("{:02x}", b)).collect::<Vec<_>>().join("-")
        }
        (_, FieldValue::Apl(items)) => {
            items.iter().map(apl_item_to_string).collect::<Vec<_>>().join(" ")
        }
        (_, FieldValue::Atma { format, address }) => {
            if *format == 1 {
                format!("+{}", String::from_utf8_lossy(address))
            }
            else {
                HEXUPPER.encode(address)
            }
        }
        (_, FieldValue::Ports(ports)) => {
            ports.iter().map(u16::to_string).collect::<Vec<_>>().join(" ")
        }
    }
}

pub(crate) fn apl_item_to_string(item: &AplItem) -> String {
    let negation = if item.negation { "!" } else { "" };
    let address = match item.family {
        1 => {
            let mut octets = [0_u8; 4];
            octets[.. item.address.len().min(4)]
                .copy_from_slice(&item.address[.. item.address.len().min(4)]);
            Ipv4Addr::from(octets).to_string()
        }
        2 => {
            let mut octets = [0_u8; 16];
            octets[.. item.address.len().min(16)]
                .copy_from_slice(&item.address[.. item.address.len().min(16)]);
            Ipv6Addr::from(octets).to_string()
        }
        _ => HEXUPPER.encode(&item.address),
    };
    format!("{}{}:{}/{}", negation, item.family, address, item.prefix)
}


/// Parses record data from its presentation form. The generic
/// `\# <len> <hex>` syntax is accepted for every type and is required
/// for types without a schema.
pub fn rdata_from_str(rtype: RecordType, input: &str) -> Result<RData, TextError> {
    let tokens = tokenize(input)?;
    rdata_from_tokens(rtype, &tokens)
}

/// Parses record data from already-tokenized presentation text.
pub(crate) fn rdata_from_tokens(rtype: RecordType, tokens: &[Token]) -> Result<RData, TextError> {
    if tokens.first().map_or(false, |t| ! t.quoted && t.text == "\\#") {
        return generic_from_tokens(&tokens[1..]);
    }

    let schema = match schema_of(rtype) {
        Some(schema) => schema,
        None => return Err(TextError::BadGenericData),
    };

    let mut fields = Vec::with_capacity(schema.len());
    let mut position = 0;
    for field in schema {
        let value = field_from_tokens(field.kind, &tokens, &mut position, &fields)?;
        fields.push(value);
    }

    if position < tokens.len() {
        return Err(TextError::TrailingTokens(tokens[position].text.clone()));
    }

    Ok(RData::Fields(fields))
}

fn generic_from_tokens(tokens: &[Token]) -> Result<RData, TextError> {
    let len: usize = tokens.first()
        .ok_or(TextError::UnexpectedEnd)?
        .text.parse().map_err(|_| TextError::BadGenericData)?;

    let hex: String = tokens[1..].iter().map(|t| t.text.as_str()).collect();
    let bytes = HEXLOWER_PERMISSIVE.decode(hex.as_bytes())
        .map_err(|_| TextError::BadGenericData)?;

    if bytes.len() != len {
        return Err(TextError::BadGenericData);
    }
    Ok(RData::Unknown(bytes))
}

fn next_token<'t>(tokens: &'t [Token], position: &mut usize) -> Result<&'t Token, TextError> {
    let token = tokens.get(*position).ok_or(TextError::UnexpectedEnd)?;
    *position += 1;
    Ok(token)
}

fn parse_number<T: std::str::FromStr>(token: &Token) -> Result<T, TextError> {
    token.text.parse().map_err(|_| TextError::BadNumber(token.text.clone()))
}

fn field_from_tokens(kind: FieldKind, tokens: &[Token], position: &mut usize, prev: &[FieldValue]) -> Result<FieldValue, TextError> {
    use FieldKind as K;

    let value = match kind {
        K::Name => {
            let token = next_token(tokens, position)?;
            FieldValue::Name(Name::parse(&token.text)?)
        }
        K::Servers => {
            let mut servers = Vec::new();
            while *position < tokens.len() {
                let token = next_token(tokens, position)?;
                servers.push(Name::parse(&token.text)?);
            }
            FieldValue::Servers(servers)
        }
        K::Inet4 => {
            let token = next_token(tokens, position)?;
            FieldValue::Inet4(token.text.parse().map_err(|_| TextError::BadToken(token.text.clone()))?)
        }
        K::Inet6 => {
            let token = next_token(tokens, position)?;
            FieldValue::Inet6(token.text.parse().map_err(|_| TextError::BadToken(token.text.clone()))?)
        }
        K::Inet => {
            let token = next_token(tokens, position)?;
            FieldValue::Inet(token.text.parse().map_err(|_| TextError::BadToken(token.text.clone()))?)
        }
        K::Target => {
            let token = next_token(tokens, position)?;
            let gateway = if token.text == "." {
                Gateway::None
            }
            else if let Ok(v4) = token.text.parse::<Ipv4Addr>() {
                Gateway::V4(v4)
            }
            else if let Ok(v6) = token.text.parse::<Ipv6Addr>() {
                Gateway::V6(v6)
            }
            else {
                Gateway::Name(Name::parse(&token.text)?)
            };

            // The gateway shape must agree with the type field before it.
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
                return Err(TextError::BadToken(token.text.clone()));
            }

            FieldValue::Gateway(gateway)
        }
        K::Hex | K::Hex16 | K::HexEnd => {
            let text = collect_unquoted(tokens, position, matches!(kind, K::HexEnd))?;
            if text == "-" {
                FieldValue::Bytes(Vec::new())
            }
            else {
                FieldValue::Bytes(HEXLOWER_PERMISSIVE.decode(text.as_bytes())
                    .map_err(|_| TextError::BadToken(text))?)
            }
        }
        K::Base32Hex => {
            let token = next_token(tokens, position)?;
            let lowered = token.text.to_ascii_lowercase();
            FieldValue::Bytes(BASE32_DNSSEC.decode(lowered.as_bytes())
                .map_err(|_| TextError::BadToken(token.text.clone()))?)
        }
        K::Base64 => {
            let token = next_token(tokens, position)?;
            FieldValue::Bytes(base64::decode(&token.text)
                .map_err(|_| TextError::BadToken(token.text.clone()))?)
        }
        K::Base64End => {
            let text = collect_unquoted(tokens, position, true)?;
            FieldValue::Bytes(base64::decode(&text)
                .map_err(|_| TextError::BadToken(text))?)
        }
        K::CharacterString => {
            let token = next_token(tokens, position)?;
            FieldValue::CharString(unescape_bytes(&token.text)?)
        }
        K::Raw => {
            let mut parts = Vec::new();
            while *position < tokens.len() {
                let token = next_token(tokens, position)?;
                parts.push(unescape_bytes(&token.text)?);
            }
            FieldValue::CharString(parts.join(&b' '))
        }
        K::Txt => {
            let mut strings = Vec::new();
            while *position < tokens.len() {
                let token = next_token(tokens, position)?;
                strings.push(unescape_bytes(&token.text)?);
            }
            FieldValue::Strings(strings)
        }
        K::NsecBitmap => {
            let mut types = Vec::new();
            while *position < tokens.len() {
                let token = next_token(tokens, position)?;
                let rtype = RecordType::from_name(&token.text)
                    .ok_or_else(|| TextError::BadType(token.text.clone()))?;
                types.push(rtype.to_u16());
            }
            FieldValue::Bitmap(crate::bitmap::TypeBitmap::from_types(types))
        }
        K::KeytagList => {
            let mut tags = Vec::new();
            while *position < tokens.len() {
                tags.push(parse_number(next_token(tokens, position)?)?);
            }
            FieldValue::Keytags(tags)
        }
        K::SigTime => {
            let token = next_token(tokens, position)?;
            FieldValue::Time(parse_serial_time(&token.text)
                .ok_or_else(|| TextError::BadToken(token.text.clone()))?)
        }
        K::TypeNumber => {
            let token = next_token(tokens, position)?;
            let rtype = RecordType::from_name(&token.text)
                .ok_or_else(|| TextError::BadType(token.text.clone()))?;
            FieldValue::Type(rtype)
        }
        K::U8 | K::Protocol => FieldValue::U8(parse_number(next_token(tokens, position)?)?),
        K::U16 => FieldValue::U16(parse_number(next_token(tokens, position)?)?),
        K::U32 => FieldValue::U32(parse_number(next_token(tokens, position)?)?),
        K::U48 => {
            let token = next_token(tokens, position)?;
            let n: u64 = parse_number(token)?;
            if n >= 1 << 48 {
                return Err(TextError::BadNumber(token.text.clone()));
            }
            FieldValue::U64(n)
        }
        K::U64 => FieldValue::U64(parse_number(next_token(tokens, position)?)?),
        K::Nid32 => {
            let token = next_token(tokens, position)?;
            let addr: Ipv4Addr = token.text.parse()
                .map_err(|_| TextError::BadToken(token.text.clone()))?;
            FieldValue::Locator32(u32::from(addr))
        }
        K::Nid64 => {
            let token = next_token(tokens, position)?;
            let groups: Vec<&str> = token.text.split(':').collect();
            if groups.len() != 4 {
                return Err(TextError::BadToken(token.text.clone()));
            }
            let mut value = 0_u64;
            for group in groups {
                let part = u16::from_str_radix(group, 16)
                    .map_err(|_| TextError::BadToken(token.text.clone()))?;
                value = value << 16 | u64::from(part);
            }
            FieldValue::Locator64(value)
        }
        K::Eui48 => {
            let token = next_token(tokens, position)?;
            FieldValue::Eui48(parse_eui::<6>(&token.text)?)
        }
        K::Eui64 => {
            let token = next_token(tokens, position)?;
            FieldValue::Eui64(parse_eui::<8>(&token.text)?)
        }
        K::Apl => {
            let mut items = Vec::new();
            while *position < tokens.len() {
                let token = next_token(tokens, position)?;
                items.push(apl_item_from_str(&token.text)?);
            }
            FieldValue::Apl(items)
        }
        K::Nsap => {
            let token = next_token(tokens, position)?;
            let stripped = token.text.strip_prefix("0x")
                .ok_or_else(|| TextError::BadToken(token.text.clone()))?
                .replace('.', "");
            FieldValue::Bytes(HEXLOWER_PERMISSIVE.decode(stripped.as_bytes())
                .map_err(|_| TextError::BadToken(token.text.clone()))?)
        }
        K::Atma => {
            let token = next_token(tokens, position)?;
            if let Some(e164) = token.text.strip_prefix('+') {
                FieldValue::Atma { format: 1, address: e164.as_bytes().to_vec() }
            }
            else {
                FieldValue::Atma {
                    format: 0,
                    address: HEXLOWER_PERMISSIVE.decode(token.text.as_bytes())
                        .map_err(|_| TextError::BadToken(token.text.clone()))?,
                }
            }
        }
        K::Wks => {
            let mut ports = Vec::new();
            while *position < tokens.len() {
                ports.push(parse_number(next_token(tokens, position)?)?);
            }
            FieldValue::Ports(ports)
        }
    };

    Ok(value)
}

/// Collects one token, or every remaining token glued together for the
/// fill-to-end kinds, which zone files habitually wrap across lines.
fn collect_unquoted(tokens: &[Token], position: &mut usize, to_end: bool) -> Result<String, TextError> {
    if ! to_end {
        return Ok(next_token(tokens, position)?.text.clone());
    }

    let mut text = String::new();
    while *position < tokens.len() {
        text.push_str(&next_token(tokens, position)?.text);
    }
    if text.is_empty() {
        return Err(TextError::UnexpectedEnd);
    }
    Ok(text)
}

fn parse_eui<const N: usize>(text: &str) -> Result<[u8; N], TextError> {
    let parts: Vec<&str> = text.split('-').collect();
    if parts.len() != N {
        return Err(TextError::BadToken(text.into()));
    }

    let mut octets = [0_u8; N];
    for (octet, part) in octets.iter_mut().zip(parts) {
        *octet = u8::from_str_radix(part, 16)
            .map_err(|_| TextError::BadToken(text.into()))?;
    }
    Ok(octets)
}

pub(crate) fn apl_item_from_str(text: &str) -> Result<AplItem, TextError> {
    let bad = || TextError::BadToken(text.into());

    let (negation, rest) = match text.strip_prefix('!') {
        Some(rest) => (true, rest),
        None => (false, text),
    };

    let (family_text, rest) = rest.split_once(':').ok_or_else(bad)?;
    let (address_text, prefix_text) = rest.split_once('/').ok_or_else(bad)?;

    let family: u16 = family_text.parse().map_err(|_| bad())?;
    let prefix: u8 = prefix_text.parse().map_err(|_| bad())?;

    let mut address = match family {
        1 => {
            let addr: Ipv4Addr = address_text.parse().map_err(|_| bad())?;
            addr.octets().to_vec()
        }
        2 => {
            let addr: Ipv6Addr = address_text.parse().map_err(|_| bad())?;
            addr.octets().to_vec()
        }
        _ => HEXLOWER_PERMISSIVE.decode(address_text.as_bytes()).map_err(|_| bad())?,
    };

    while address.last() == Some(&0) {
        address.pop();
    }

    Ok(AplItem { family, prefix, negation, address })
}


/// Renders a thirty-two-bit serial-arithmetic timestamp as civil time,
/// picking the representative of its value closest to now.
pub(crate) fn format_serial_time(wire: u32) -> String {
    let now = Utc::now().timestamp();
    format_serial_time_at(wire, now)
}

fn format_serial_time_at(wire: u32, now: i64) -> String {
    let span = 1_i64 << 32;
    let distance = (now - i64::from(wire)).rem_euclid(span);
    let timestamp = if distance < span / 2 {
        now - distance
    }
    else {
        now + (span - distance)
    };

    match Utc.timestamp_opt(timestamp, 0).single() {
        Some(datetime) => datetime.format("%Y%m%d%H%M%S").to_string(),
        None => wire.to_string(),
    }
}

/// Parses either the fourteen-digit civil form or a plain integer of
/// seconds, reducing both into the thirty-two-bit wire value.
pub(crate) fn parse_serial_time(text: &str) -> Option<u32> {
    if text.len() == 14 && text.bytes().all(|b| b.is_ascii_digit()) {
        let naive = NaiveDateTime::parse_from_str(text, "%Y%m%d%H%M%S").ok()?;
        let timestamp = naive.timestamp();
        return Some(timestamp.rem_euclid(1_i64 << 32) as u32);
    }

    let seconds: u64 = text.parse().ok()?;
    Some((seconds % (1 << 32)) as u32)
}
