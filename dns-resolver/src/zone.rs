//! The zone index: a name-keyed table of RRsets that doubles as the
//! resolver’s cache and as a store for locally authoritative data.

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use log::*;

use dns::{Name, QClass, TranscriptError};
use dns::record::{Record, RecordType};


/// A two-level mapping from lowercased owner name, then record type and
/// class, to the records of that RRset.
#[derive(Debug, Default)]
pub struct ZoneIndex {
    entries: HashMap<String, HashMap<(RecordType, QClass), Entry>>,
}

/// One stored RRset, or a stored negative disposition.
#[derive(Debug, Clone)]
pub struct Entry {

    /// The records of the RRset, with their TTLs normalised to the
    /// set’s minimum. Empty for a negative entry.
    pub records: Vec<Record>,

    /// The negative disposition, when this entry records an absence.
    pub negative: Option<Negative>,

    /// When the entry stops being served. `None` for seeded
    /// authoritative data, which does not age out.
    expires_at: Option<Instant>,
}

/// What a negative entry knows about the absence it records.
#[derive(Debug, Clone)]
pub struct Negative {

    /// Whether the whole name is absent, as opposed to just the type.
    pub nxdomain: bool,

    /// The SOA record that authorised the negative answer.
    pub soa: Option<Record>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map_or(false, |at| at <= now)
    }
}

impl ZoneIndex {

    /// An empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Files the given records into their RRsets, with an expiry set
    /// from each set’s minimum TTL. Records joining a live RRset clamp
    /// its expiry downward; records for a dead one replace it.
    pub fn insert(&mut self, records: &[Record]) {
        self.insert_with_expiry(records, true);
    }

    /// Files records that never age out, for locally authoritative data.
    pub fn insert_permanent(&mut self, records: &[Record]) {
        self.insert_with_expiry(records, false);
    }

    fn insert_with_expiry(&mut self, records: &[Record], aging: bool) {
        let now = Instant::now();

        let mut sets: HashMap<(String, RecordType, QClass), Vec<Record>> = HashMap::new();
        for record in records {
            sets.entry((record.name.lookup_key(), record.rtype, record.qclass))
                .or_default()
                .push(record.clone());
        }

        for ((key, rtype, qclass), mut set) in sets {
            let min_ttl = set.iter().map(|r| r.ttl).min().unwrap_or(0);
            for record in &mut set {
                record.ttl = min_ttl;
            }

            let expires_at = if aging {
                Some(now + Duration::from_secs(u64::from(min_ttl)))
            }
            else {
                None
            };

            trace!("Caching {} {} records for {:?} (ttl {})", set.len(), rtype, key, min_ttl);
            let slot = self.entries.entry(key).or_default().entry((rtype, qclass));

            use std::collections::hash_map::Entry as Slot;
            match slot {
                Slot::Occupied(mut occupied) if ! occupied.get().is_expired(now)
                                             && occupied.get().negative.is_none() => {
                    // Join the live set: append what is new, and let the
                    // earlier of the two expiries win.
                    let entry = occupied.get_mut();
                    for record in set {
                        if ! entry.records.contains(&record) {
                            entry.records.push(record);
                        }
                    }
                    entry.expires_at = match (entry.expires_at, expires_at) {
                        (Some(a), Some(b)) => Some(a.min(b)),
                        (None, _) | (_, None) => None,
                    };
                }
                Slot::Occupied(mut occupied) => {
                    occupied.insert(Entry { records: set, negative: None, expires_at });
                }
                Slot::Vacant(vacant) => {
                    vacant.insert(Entry { records: set, negative: None, expires_at });
                }
            }
        }
    }

    /// Records that a name or type does not exist, for the TTL the SOA
    /// permits: the smaller of the SOA record’s own TTL and its MINIMUM
    /// field.
    pub fn insert_negative(&mut self, name: &Name, rtype: RecordType, qclass: QClass,
                           nxdomain: bool, soa: Option<Record>) {
        let ttl = soa.as_ref().map_or(0, |record| {
            record.soa_minimum().unwrap_or(0).min(record.ttl)
        });

        trace!("Caching negative entry for {} {} (ttl {})", name, rtype, ttl);
        self.entries.entry(name.lookup_key()).or_default().insert(
            (rtype, qclass),
            Entry {
                records: Vec::new(),
                negative: Some(Negative { nxdomain, soa }),
                expires_at: Some(Instant::now() + Duration::from_secs(u64::from(ttl))),
            });
    }

    /// Looks up the RRset for the given name, type, and class, if one is
    /// stored and still fresh.
    pub fn lookup(&self, name: &Name, rtype: RecordType, qclass: QClass) -> Option<&Entry> {
        let entry = self.entries.get(&name.lookup_key())?.get(&(rtype, qclass))?;
        if entry.is_expired(Instant::now()) {
            None
        }
        else {
            Some(entry)
        }
    }

    /// The glue for a set of nameserver targets: every fresh A and AAAA
    /// address stored under them.
    pub fn glue(&self, targets: &[Name]) -> Vec<(Name, IpAddr)> {
        let mut glue = Vec::new();
        for target in targets {
            for rtype in &[ RecordType::A, RecordType::AAAA ] {
                if let Some(entry) = self.lookup(target, *rtype, QClass::IN) {
                    for record in &entry.records {
                        if let Some(address) = record.address() {
                            glue.push((target.clone(), address));
                        }
                    }
                }
            }
        }
        glue
    }

    /// Drops every entry whose TTL has elapsed.
    pub fn remove_expired(&mut self) {
        let now = Instant::now();
        for sets in self.entries.values_mut() {
            sets.retain(|_, entry| ! entry.is_expired(now));
        }
        self.entries.retain(|_, sets| ! sets.is_empty());
    }

    /// Seeds the index from presentation-format zone text. The records
    /// are stored as authoritative: they do not age out.
    pub fn load(&mut self, zone_text: &str) -> Result<usize, TranscriptError> {
        let records = dns::zone_records(zone_text)?;
        debug!("Seeding zone index with {} records", records.len());
        self.insert_permanent(&records);
        Ok(records.len())
    }
}
