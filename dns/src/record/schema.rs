//! The registry of per-type record schemas.
//!
//! Every record type with a known structure is described as an ordered
//! list of named fields, and one interpreter reads and writes the wire,
//! presentation, and JSON forms of all of them from the description.
//! Types that share a layout share a schema: the newer DNSSEC types are
//! re-badged copies of the older ones.

use super::RecordType;


/// How one field of a record is encoded.
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub enum FieldKind {

    /// A domain name, possibly compressed on the wire.
    Name,

    /// Space-separated names filling the rest of the record.
    Servers,

    /// A four-byte IPv4 address.
    Inet4,

    /// A sixteen-byte IPv6 address.
    Inet6,

    /// An address of either family, sized by the remaining data.
    Inet,

    /// An IPsec gateway: none, an address, or a name, selected by the
    /// preceding gateway-type field.
    Target,

    /// Length-prefixed bytes (one-byte length), presented as hex.
    Hex,

    /// Length-prefixed bytes (two-byte length), presented as hex.
    Hex16,

    /// The rest of the record, presented as hex.
    HexEnd,

    /// Length-prefixed bytes (one-byte length), presented as base32hex.
    Base32Hex,

    /// Length-prefixed bytes (two-byte length), presented as base64.
    Base64,

    /// The rest of the record, presented as base64.
    Base64End,

    /// One length-prefixed character-string, presented quoted.
    CharacterString,

    /// The rest of the record as opaque octets, presented quoted.
    Raw,

    /// One or more character-strings filling the rest of the record.
    Txt,

    /// A window-format type bitmap filling the rest of the record.
    NsecBitmap,

    /// Sixteen-bit key tags filling the rest of the record.
    KeytagList,

    /// A thirty-two-bit timestamp in serial-number arithmetic,
    /// presented as `YYYYMMDDHHMMSS`.
    SigTime,

    /// A record type number, presented by its mnemonic.
    TypeNumber,

    /// Unsigned integers of various widths.
    U8,
    U16,
    U32,
    U48,
    U64,

    /// A thirty-two-bit locator presented in dotted-quad form.
    Nid32,

    /// A sixty-four-bit locator presented as four hex groups.
    Nid64,

    /// A six-byte EUI, presented as dash-separated hex pairs.
    Eui48,

    /// An eight-byte EUI, presented as dash-separated hex pairs.
    Eui64,

    /// An address-prefix list filling the rest of the record.
    Apl,

    /// An NSAP address: the rest of the record, presented as `0x`-hex.
    Nsap,

    /// An ATM address: a format octet, then the rest of the record.
    Atma,

    /// An IP protocol number.
    Protocol,

    /// A well-known-services port bitmap filling the rest of the record.
    Wks,
}


/// One named field of a record schema.
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub struct Field {

    /// The field’s name, used as its JSON key.
    pub name: &'static str,

    /// How the field is encoded.
    pub kind: FieldKind,
}

impl Field {
    const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self { name, kind }
    }
}

use FieldKind as K;

const A: &[Field] = &[
    Field::new("address", K::Inet4),
];

const AAAA: &[Field] = &[
    Field::new("address", K::Inet6),
];

const SINGLE_NAME: &[Field] = &[
    Field::new("target", K::Name),
];

const SOA: &[Field] = &[
    Field::new("mname", K::Name),
    Field::new("rname", K::Name),
    Field::new("serial", K::U32),
    Field::new("refresh", K::U32),
    Field::new("retry", K::U32),
    Field::new("expire", K::U32),
    Field::new("minimum", K::U32),
];

const WKS: &[Field] = &[
    Field::new("address", K::Inet4),
    Field::new("protocol", K::Protocol),
    Field::new("ports", K::Wks),
];

const HINFO: &[Field] = &[
    Field::new("cpu", K::CharacterString),
    Field::new("os", K::CharacterString),
];

const MINFO: &[Field] = &[
    Field::new("rmailbx", K::Name),
    Field::new("emailbx", K::Name),
];

const MX: &[Field] = &[
    Field::new("preference", K::U16),
    Field::new("exchange", K::Name),
];

const TXT: &[Field] = &[
    Field::new("strings", K::Txt),
];

const RP: &[Field] = &[
    Field::new("mbox", K::Name),
    Field::new("txt", K::Name),
];

const PREFERENCE_NAME: &[Field] = &[
    Field::new("preference", K::U16),
    Field::new("target", K::Name),
];

const X25: &[Field] = &[
    Field::new("psdn_address", K::CharacterString),
];

const NSAP: &[Field] = &[
    Field::new("address", K::Nsap),
];

const RRSIG: &[Field] = &[
    Field::new("type_covered", K::TypeNumber),
    Field::new("algorithm", K::U8),
    Field::new("labels", K::U8),
    Field::new("orig_ttl", K::U32),
    Field::new("expiration", K::SigTime),
    Field::new("inception", K::SigTime),
    Field::new("key_tag", K::U16),
    Field::new("signer", K::Name),
    Field::new("signature", K::Base64End),
];

const DNSKEY: &[Field] = &[
    Field::new("flags", K::U16),
    Field::new("protocol", K::U8),
    Field::new("algorithm", K::U8),
    Field::new("public_key", K::Base64End),
];

const PX: &[Field] = &[
    Field::new("preference", K::U16),
    Field::new("map822", K::Name),
    Field::new("mapx400", K::Name),
];

const GPOS: &[Field] = &[
    Field::new("longitude", K::CharacterString),
    Field::new("latitude", K::CharacterString),
    Field::new("altitude", K::CharacterString),
];

const LOC: &[Field] = &[
    Field::new("version", K::U8),
    Field::new("size", K::U8),
    Field::new("horiz_pre", K::U8),
    Field::new("vert_pre", K::U8),
    Field::new("latitude", K::U32),
    Field::new("longitude", K::U32),
    Field::new("altitude", K::U32),
];

const NXT: &[Field] = &[
    Field::new("next_domain", K::Name),
    Field::new("bitmap", K::HexEnd),
];

const OPAQUE: &[Field] = &[
    Field::new("data", K::HexEnd),
];

const SRV: &[Field] = &[
    Field::new("priority", K::U16),
    Field::new("weight", K::U16),
    Field::new("port", K::U16),
    Field::new("target", K::Name),
];

const ATMA: &[Field] = &[
    Field::new("address", K::Atma),
];

const NAPTR: &[Field] = &[
    Field::new("order", K::U16),
    Field::new("preference", K::U16),
    Field::new("flags", K::CharacterString),
    Field::new("service", K::CharacterString),
    Field::new("regexp", K::CharacterString),
    Field::new("replacement", K::Name),
];

const CERT: &[Field] = &[
    Field::new("cert_type", K::U16),
    Field::new("key_tag", K::U16),
    Field::new("algorithm", K::U8),
    Field::new("certificate", K::Base64End),
];

const A6: &[Field] = &[
    Field::new("prefix_len", K::U8),
    Field::new("data", K::HexEnd),
];

const APL: &[Field] = &[
    Field::new("prefixes", K::Apl),
];

const DS: &[Field] = &[
    Field::new("key_tag", K::U16),
    Field::new("algorithm", K::U8),
    Field::new("digest_type", K::U8),
    Field::new("digest", K::HexEnd),
];

const SSHFP: &[Field] = &[
    Field::new("algorithm", K::U8),
    Field::new("fp_type", K::U8),
    Field::new("fingerprint", K::HexEnd),
];

const IPSECKEY: &[Field] = &[
    Field::new("precedence", K::U8),
    Field::new("gateway_type", K::U8),
    Field::new("algorithm", K::U8),
    Field::new("gateway", K::Target),
    Field::new("public_key", K::Base64End),
];

const NSEC: &[Field] = &[
    Field::new("next_domain", K::Name),
    Field::new("types", K::NsecBitmap),
];

const DHCID: &[Field] = &[
    Field::new("data", K::Base64End),
];

const NSEC3: &[Field] = &[
    Field::new("hash_alg", K::U8),
    Field::new("flags", K::U8),
    Field::new("iterations", K::U16),
    Field::new("salt", K::Hex),
    Field::new("next_hashed", K::Base32Hex),
    Field::new("types", K::NsecBitmap),
];

const NSEC3PARAM: &[Field] = &[
    Field::new("hash_alg", K::U8),
    Field::new("flags", K::U8),
    Field::new("iterations", K::U16),
    Field::new("salt", K::Hex),
];

const TLSA: &[Field] = &[
    Field::new("usage", K::U8),
    Field::new("selector", K::U8),
    Field::new("matching_type", K::U8),
    Field::new("certificate", K::HexEnd),
];

const HIP: &[Field] = &[
    Field::new("algorithm", K::U8),
    Field::new("hit", K::Hex),
    Field::new("public_key", K::Base64),
    Field::new("servers", K::Servers),
];

const TALINK: &[Field] = &[
    Field::new("previous", K::Name),
    Field::new("next", K::Name),
];

const OPENPGPKEY: &[Field] = &[
    Field::new("public_key", K::Base64End),
];

const CSYNC: &[Field] = &[
    Field::new("serial", K::U32),
    Field::new("flags", K::U16),
    Field::new("types", K::NsecBitmap),
];

const NID: &[Field] = &[
    Field::new("preference", K::U16),
    Field::new("node_id", K::Nid64),
];

const L32: &[Field] = &[
    Field::new("preference", K::U16),
    Field::new("locator", K::Nid32),
];

const L64: &[Field] = &[
    Field::new("preference", K::U16),
    Field::new("locator", K::Nid64),
];

const LP: &[Field] = &[
    Field::new("preference", K::U16),
    Field::new("fqdn", K::Name),
];

const EUI48: &[Field] = &[
    Field::new("address", K::Eui48),
];

const EUI64: &[Field] = &[
    Field::new("address", K::Eui64),
];

const TKEY: &[Field] = &[
    Field::new("algorithm", K::Name),
    Field::new("inception", K::U32),
    Field::new("expiration", K::U32),
    Field::new("mode", K::U16),
    Field::new("error", K::U16),
    Field::new("key", K::Hex16),
    Field::new("other", K::Hex16),
];

const TSIG: &[Field] = &[
    Field::new("algorithm", K::Name),
    Field::new("time_signed", K::U48),
    Field::new("fudge", K::U16),
    Field::new("mac", K::Hex16),
    Field::new("original_id", K::U16),
    Field::new("error", K::U16),
    Field::new("other", K::Hex16),
];

const URI: &[Field] = &[
    Field::new("priority", K::U16),
    Field::new("weight", K::U16),
    Field::new("target", K::Raw),
];

const CAA: &[Field] = &[
    Field::new("flags", K::U8),
    Field::new("tag", K::CharacterString),
    Field::new("value", K::Raw),
];

const DOA: &[Field] = &[
    Field::new("enterprise", K::U32),
    Field::new("doa_type", K::U32),
    Field::new("location", K::U8),
    Field::new("media_type", K::CharacterString),
    Field::new("data", K::Base64End),
];


/// The schema for the given record type, or `None` for types that are
/// carried opaquely.
pub fn schema_of(rtype: RecordType) -> Option<&'static [Field]> {
    use RecordType as T;

    let schema: &'static [Field] = match rtype {
        T::A            => A,
        T::AAAA         => AAAA,
        T::NS | T::MD | T::MF | T::CNAME | T::MB | T::MG | T::MR
        | T::PTR | T::NSAPPTR | T::DNAME => SINGLE_NAME,
        T::SOA          => SOA,
        T::NULL         => OPAQUE,
        T::WKS          => WKS,
        T::HINFO        => HINFO,
        T::MINFO        => MINFO,
        T::MX           => MX,
        T::TXT | T::SPF | T::AVC | T::NINFO | T::ISDN | T::UINFO => TXT,
        T::RP           => RP,
        T::AFSDB | T::RT | T::KX => PREFERENCE_NAME,
        T::X25          => X25,
        T::NSAP         => NSAP,
        T::SIG | T::RRSIG => RRSIG,
        T::KEY | T::DNSKEY | T::CDNSKEY | T::RKEY => DNSKEY,
        T::PX           => PX,
        T::GPOS         => GPOS,
        T::LOC          => LOC,
        T::NXT          => NXT,
        T::EID | T::NIMLOC | T::UID | T::GID | T::UNSPEC => OPAQUE,
        T::SRV          => SRV,
        T::ATMA         => ATMA,
        T::NAPTR        => NAPTR,
        T::CERT         => CERT,
        T::A6           => A6,
        T::APL          => APL,
        T::DS | T::CDS | T::TA | T::DLV => DS,
        T::SSHFP        => SSHFP,
        T::IPSECKEY     => IPSECKEY,
        T::NSEC         => NSEC,
        T::DHCID        => DHCID,
        T::NSEC3        => NSEC3,
        T::NSEC3PARAM   => NSEC3PARAM,
        T::TLSA | T::SMIMEA => TLSA,
        T::HIP          => HIP,
        T::TALINK       => TALINK,
        T::OPENPGPKEY   => OPENPGPKEY,
        T::CSYNC        => CSYNC,
        T::NID          => NID,
        T::L32          => L32,
        T::L64          => L64,
        T::LP           => LP,
        T::EUI48        => EUI48,
        T::EUI64        => EUI64,
        T::TKEY         => TKEY,
        T::TSIG         => TSIG,
        T::URI          => URI,
        T::CAA          => CAA,
        T::DOA          => DOA,
        T::OPT | T::ANY | T::Other(_) => return None,
    };

    Some(schema)
}
