//! The recursive resolver: a state machine that starts at the root
//! hints and follows referrals and CNAME chains until it has an answer,
//! a denial, or a reason to give up.

use std::collections::HashMap;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, RwLock};
use std::time::Duration;

use log::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use dns::record::{Edns, Record, RecordType};
use dns::{Message, Name, Question, Rcode, WireError, DNS_PORT};

use crate::hints::{default_hints, RootHint};
use crate::transport::{Protocol, Transport, TransportError};
use crate::txid::TxidGenerator;
use crate::zone::ZoneIndex;


/// How many referrals one query may follow before giving up.
pub const MAX_REFERRALS: usize = 10;

/// How many CNAME links one query may follow before giving up.
pub const MAX_CNAME_CHAIN: usize = 10;

/// How long to wait for a UDP response before trying elsewhere.
pub const UDP_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(2);

/// How long to wait for a TCP response before trying elsewhere.
pub const TCP_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(5);

/// How many failures a server may accumulate before it is set aside.
pub const SERVER_FAILURE_LIMIT: u32 = 3;


/// A cooperative cancellation signal. Cloning shares the flag; setting
/// it makes every resolution holding it surface
/// [`ResolveError::Cancelled`] at its next step.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {

    /// A fresh, uncancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the signal.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether the signal has been raised.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}


/// Why a resolution failed. Nonexistence is not in here: NXDOMAIN and
/// empty answers are carried in the result message.
#[derive(PartialEq, Debug, Clone)]
pub enum ResolveError {

    /// A server’s response could not be decoded, and no other server
    /// did better.
    Encoding(WireError),

    /// Every usable server answered with a failure code. Carries the
    /// last one seen.
    Protocol(Rcode),

    /// The query hit a safety limit.
    Policy(PolicyLimit),

    /// No response arrived from any server within the attempt budgets.
    Timeout,

    /// The query’s cancel token was raised.
    Cancelled,

    /// The network itself failed, and no other server did better.
    Network(String),

    /// There were no servers left to ask.
    NoServers,
}

/// The safety limit a query ran into.
#[derive(PartialEq, Debug, Copy, Clone)]
pub enum PolicyLimit {

    /// Too many referrals.
    ReferralDepth,

    /// Too many CNAME links.
    CnameChain,
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Encoding(e)  => write!(f, "malformed response: {}", e),
            Self::Protocol(r)  => write!(f, "servers answered {}", r),
            Self::Policy(PolicyLimit::ReferralDepth) => write!(f, "too many referrals"),
            Self::Policy(PolicyLimit::CnameChain)    => write!(f, "CNAME chain too long"),
            Self::Timeout      => write!(f, "no server answered in time"),
            Self::Cancelled    => write!(f, "query was cancelled"),
            Self::Network(e)   => write!(f, "network error: {}", e),
            Self::NoServers    => write!(f, "no servers to ask"),
        }
    }
}


/// One nameserver the resolver may ask: its name, and its address when
/// glue or the cache supplied one.
#[derive(Debug, Clone)]
struct NameServer {
    name: Name,
    address: Option<IpAddr>,
}

/// What happened during one wait on the network, as the state machine
/// sees it.
enum Event {
    Response(Message),
    Timeout,
    Garbage(WireError),
    Cancel,
}

/// What a classified response tells the state machine to do next.
enum Action {

    /// The response answers the question; emit it.
    Answer(Message),

    /// The response is a denial; emit it and cache the absence.
    Negative(Message),

    /// The response delegates to a closer zone; descend.
    Referral(Vec<NameServer>),

    /// The response renames the question; restart from the root.
    Cname(Record, Name),

    /// The server is not going to be useful for this query at all.
    ServerFailed(Rcode),

    /// The response was structurally fine but made no sense; treat it
    /// like silence.
    Unusable,
}

/// One in-flight resolution that concurrent askers can share.
#[derive(Default)]
struct Flight {
    result: Mutex<Option<Result<Message, ResolveError>>>,
    ready: Condvar,
}

type FlightKey = (String, u16, u16);


/// The resolver. All state a query needs flows through here: the root
/// hints, the zone index that doubles as the cache, the transport, and
/// the single-flight table.
pub struct Resolver {
    transport: Box<dyn Transport + Send + Sync>,
    hints: Vec<RootHint>,
    zone: RwLock<ZoneIndex>,
    txid: Mutex<TxidGenerator>,
    flights: Mutex<HashMap<FlightKey, Arc<Flight>>>,
}

impl Resolver {

    /// A resolver over the given transport, starting from the built-in
    /// root hints.
    pub fn new(transport: Box<dyn Transport + Send + Sync>) -> Self {
        Self::with_hints(transport, default_hints())
    }

    /// A resolver with a caller-supplied root hint set.
    pub fn with_hints(transport: Box<dyn Transport + Send + Sync>, hints: Vec<RootHint>) -> Self {
        Self {
            transport,
            hints,
            zone: RwLock::new(ZoneIndex::new()),
            txid: Mutex::new(TxidGenerator::Random),
            flights: Mutex::new(HashMap::new()),
        }
    }

    /// Replaces the transaction-id generator, for reproducing captures.
    pub fn with_txid_generator(mut self, txid: TxidGenerator) -> Self {
        self.txid = Mutex::new(txid);
        self
    }

    /// Seeds the zone index from presentation-format zone text. Seeded
    /// records answer authoritatively and do not age out.
    pub fn load_zone(&self, zone_text: &str) -> Result<usize, dns::TranscriptError> {
        self.zone.write().unwrap().load(zone_text)
    }

    /// Drops every cache entry whose TTL has elapsed.
    pub fn expire_cache(&self) {
        self.zone.write().unwrap().remove_expired();
    }

    /// Resolves a question, consulting the cache first and sharing the
    /// network work with any concurrent query for the same name, type,
    /// and class.
    pub fn resolve(&self, question: &Question, cancel: &CancelToken) -> Result<Message, ResolveError> {
        loop {
            if cancel.is_cancelled() {
                return Err(ResolveError::Cancelled);
            }

            if let Some(message) = self.answer_from_cache(question) {
                debug!("Cache answers {} {}", question.name, question.qtype);
                return Ok(message);
            }

            let key: FlightKey = (question.name.lookup_key(),
                                  question.qtype.to_u16(),
                                  question.qclass.to_u16());

            let (flight, owner) = {
                use std::collections::hash_map::Entry;
                let mut flights = self.flights.lock().unwrap();
                match flights.entry(key.clone()) {
                    Entry::Occupied(entry) => (Arc::clone(entry.get()), false),
                    Entry::Vacant(entry) => {
                        let flight = Arc::new(Flight::default());
                        entry.insert(Arc::clone(&flight));
                        (flight, true)
                    }
                }
            };

            if owner {
                let result = self.resolve_uncached(question, cancel, 0);
                *flight.result.lock().unwrap() = Some(result.clone());
                flight.ready.notify_all();
                self.flights.lock().unwrap().remove(&key);
                return result;
            }

            trace!("Joining in-flight query for {} {}", question.name, question.qtype);
            match self.await_flight(&flight, cancel) {
                // The owner was cancelled but this asker was not: take
                // over the work by looping back around.
                Some(Err(ResolveError::Cancelled)) if ! cancel.is_cancelled() => {
                    let mut flights = self.flights.lock().unwrap();
                    if let Some(existing) = flights.get(&key) {
                        if Arc::ptr_eq(existing, &flight) {
                            flights.remove(&key);
                        }
                    }
                }
                Some(result) => return result,
                None => return Err(ResolveError::Cancelled),
            }
        }
    }

    /// Waits until the flight publishes a result or this asker’s token
    /// is raised, whichever happens first.
    fn await_flight(&self, flight: &Flight, cancel: &CancelToken)
        -> Option<Result<Message, ResolveError>>
    {
        let mut slot = flight.result.lock().unwrap();
        loop {
            if let Some(result) = slot.as_ref() {
                return Some(result.clone());
            }
            if cancel.is_cancelled() {
                return None;
            }
            let (guard, _) = flight.ready
                .wait_timeout(slot, Duration::from_millis(20)).unwrap();
            slot = guard;
        }
    }

    /// Builds a response out of the cache, when it can answer.
    fn answer_from_cache(&self, question: &Question) -> Option<Message> {
        let zone = self.zone.read().unwrap();
        let entry = zone.lookup(&question.name, question.qtype, question.qclass)?;

        let mut message = Message::query(0, question.clone(), None);
        message.flags.response = true;
        message.flags.recursion_available = true;

        match &entry.negative {
            Some(negative) => {
                if negative.nxdomain {
                    message.set_rcode(Rcode::NxDomain);
                }
                message.authorities.extend(negative.soa.iter().cloned());
            }
            None => {
                message.answers = entry.records.clone();
            }
        }

        Some(message)
    }

    /// The state machine itself: pick servers, query, classify, and
    /// either descend, restart, or finish.
    fn resolve_uncached(&self, question: &Question, cancel: &CancelToken, recursion: usize)
        -> Result<Message, ResolveError>
    {
        if recursion > MAX_REFERRALS {
            return Err(ResolveError::Policy(PolicyLimit::ReferralDepth));
        }

        let mut current = question.clone();
        let mut chain: Vec<Record> = Vec::new();
        let mut chain_len = 0;
        let mut servers = self.root_servers();
        let mut depth = 0;

        // Selection is pseudo-random but stable for a given fingerprint,
        // so retries of the same query walk servers in the same order.
        let mut rng = StdRng::seed_from_u64(fingerprint_seed(question));

        'descend: loop {
            if cancel.is_cancelled() {
                return Err(ResolveError::Cancelled);
            }

            let candidates = order_servers(&servers, &mut rng);
            if candidates.is_empty() {
                return Err(ResolveError::NoServers);
            }

            let mut failures = vec![ 0_u32; candidates.len() ];
            let mut last_failure = ResolveError::NoServers;

            'attempts: loop {
                let index = match pick_server(&failures) {
                    Some(index) => index,
                    None => return Err(last_failure),
                };

                let address = match candidates[index].address {
                    Some(address) => address,
                    None => {
                        match self.resolve_glueless(&candidates[index].name, &current, cancel, recursion) {
                            Some(address) => address,
                            None => {
                                failures[index] = SERVER_FAILURE_LIMIT;
                                continue 'attempts;
                            }
                        }
                    }
                };

                let event = self.exchange(address, &current, cancel);
                let message = match event {
                    Event::Cancel => return Err(ResolveError::Cancelled),
                    Event::Timeout => {
                        info!("No answer from {} in time", address);
                        failures[index] += 1;
                        last_failure = ResolveError::Timeout;
                        continue 'attempts;
                    }
                    Event::Garbage(error) => {
                        failures[index] += 1;
                        last_failure = ResolveError::Encoding(error);
                        continue 'attempts;
                    }
                    Event::Response(message) => message,
                };

                match self.classify(&current, message) {
                    Action::Answer(response) => {
                        return Ok(self.finish(question, &current, chain, response, false));
                    }
                    Action::Negative(response) => {
                        return Ok(self.finish(question, &current, chain, response, true));
                    }
                    Action::Referral(next_servers) => {
                        depth += 1;
                        if depth > MAX_REFERRALS {
                            return Err(ResolveError::Policy(PolicyLimit::ReferralDepth));
                        }
                        debug!("Referred to {} servers (depth {})", next_servers.len(), depth);
                        servers = next_servers;
                        continue 'descend;
                    }
                    Action::Cname(link, target) => {
                        chain_len += 1;
                        if chain_len > MAX_CNAME_CHAIN {
                            return Err(ResolveError::Policy(PolicyLimit::CnameChain));
                        }
                        debug!("Following CNAME {} -> {}", current.name, target);
                        chain.push(link);
                        current.name = target;
                        servers = self.root_servers();
                        depth = 0;
                        continue 'descend;
                    }
                    Action::ServerFailed(rcode) => {
                        info!("Server {} answered {}", address, rcode);
                        failures[index] = SERVER_FAILURE_LIMIT;
                        last_failure = ResolveError::Protocol(rcode);
                        continue 'attempts;
                    }
                    Action::Unusable => {
                        failures[index] += 1;
                        continue 'attempts;
                    }
                }
            }
        }
    }

    /// The list of servers resolution starts from.
    fn root_servers(&self) -> Vec<NameServer> {
        self.hints.iter()
            .map(|hint| NameServer { name: hint.name.clone(), address: Some(hint.ip) })
            .collect()
    }

    /// Finds an address for a nameserver that came without glue, first
    /// from the cache, then with a bounded sub-resolution.
    fn resolve_glueless(&self, server: &Name, current: &Question,
                        cancel: &CancelToken, recursion: usize) -> Option<IpAddr> {
        if let Some((_, address)) = self.zone.read().unwrap()
                .glue(std::slice::from_ref(server)).into_iter().next() {
            return Some(address);
        }

        // A delegation whose server sits at the queried name itself
        // cannot be chased without looping.
        if *server == current.name {
            debug!("Not chasing glue for {}, which is the query itself", server);
            return None;
        }

        debug!("Resolving address for glueless server {}", server);
        let sub = Question::new(server.clone(), RecordType::A);
        let response = self.resolve_uncached(&sub, cancel, recursion + 1).ok()?;
        response.answers.iter().find_map(Record::address)
    }

    /// One request-response exchange, retried over TCP if the response
    /// arrives truncated. Responses whose id or question do not match
    /// are treated like silence.
    fn exchange(&self, address: IpAddr, question: &Question, cancel: &CancelToken) -> Event {
        let server = SocketAddr::new(address, DNS_PORT);
        let id = self.txid.lock().unwrap().generate();
        let query = Message::query(id, question.clone(), Some(Edns::default()));

        let payload = match query.to_bytes() {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to serialise query: {}", e);
                return Event::Timeout;
            }
        };

        let message = match self.exchange_once(server, Protocol::Udp, &payload,
                                               UDP_ATTEMPT_TIMEOUT, id, question, cancel) {
            Ok(message) => message,
            Err(event) => return event,
        };

        if message.flags.truncated {
            debug!("Truncated response from {}, retrying over TCP", server);
            match self.exchange_once(server, Protocol::Tcp, &payload,
                                     TCP_ATTEMPT_TIMEOUT, id, question, cancel) {
                Ok(message) => Event::Response(message),
                Err(event) => event,
            }
        }
        else {
            Event::Response(message)
        }
    }

    fn exchange_once(&self, server: SocketAddr, protocol: Protocol, payload: &[u8],
                     timeout: Duration, id: u16, question: &Question, cancel: &CancelToken)
        -> Result<Message, Event>
    {
        if cancel.is_cancelled() {
            return Err(Event::Cancel);
        }

        let bytes = match self.transport.exchange(server, protocol, payload, timeout) {
            Ok(bytes) => bytes,
            Err(TransportError::Timeout) => return Err(Event::Timeout),
            Err(TransportError::Network(e)) => {
                warn!("Network error talking to {}: {}", server, e);
                return Err(Event::Timeout);
            }
        };

        if cancel.is_cancelled() {
            return Err(Event::Cancel);
        }

        let message = match Message::from_bytes(&bytes) {
            Ok(message) => message,
            Err(e) => {
                warn!("Undecodable response from {}: {}", server, e);
                return Err(Event::Garbage(e));
            }
        };

        // Forged responses have to guess the id and echo the question;
        // anything that does not match is ignored outright.
        if message.id != id || message.questions.first() != Some(question) {
            warn!("Mismatched response from {}, ignoring", server);
            return Err(Event::Timeout);
        }

        Ok(message)
    }

    /// Decides what a response means for the current question.
    fn classify(&self, question: &Question, message: Message) -> Action {
        match message.rcode() {
            Rcode::NoError => {}
            Rcode::NxDomain => return Action::Negative(message),
            rcode => return Action::ServerFailed(rcode),
        }

        let has_direct = message.answers.iter()
            .any(|r| r.name == question.name
                  && r.rtype == question.qtype
                  && r.qclass == question.qclass);
        if has_direct {
            return Action::Answer(message);
        }

        if question.qtype != RecordType::CNAME {
            let link = message.answers.iter()
                .find(|r| r.name == question.name && r.rtype == RecordType::CNAME)
                .cloned();
            if let Some(link) = link {
                match link.target_name() {
                    Some(target) => {
                        let target = target.clone();
                        return Action::Cname(link, target);
                    }
                    None => return Action::Unusable,
                }
            }
        }

        let delegation = {
            let mut ns_records = message.authorities.iter()
                .filter(|r| r.rtype == RecordType::NS)
                .peekable();
            match ns_records.peek() {
                Some(first) if ! message.flags.authoritative => {
                    let cut = first.name.clone();
                    let targets: Vec<Name> = ns_records
                        .filter_map(|r| r.target_name().cloned())
                        .collect();
                    Some((cut, targets))
                }
                _ => None,
            }
        };

        if let Some((cut, targets)) = delegation {
            // A delegation for exactly the queried name answers an NS
            // question; anything else is a referral to descend into.
            if question.qtype == RecordType::NS && cut == question.name {
                return Action::Answer(message);
            }

            let zone = self.zone.read().unwrap();
            let servers: Vec<NameServer> = targets.iter().map(|target| {
                let packet_glue = message.additionals.iter()
                    .filter(|r| r.name == *target)
                    .find_map(Record::address);
                let cached_glue = || {
                    zone.glue(std::slice::from_ref(target)).into_iter()
                        .map(|(_, address)| address).next()
                };
                NameServer {
                    name: target.clone(),
                    address: packet_glue.or_else(cached_glue),
                }
            }).collect();

            return Action::Referral(servers);
        }

        // NOERROR with nothing for us and no delegation: a NODATA reply.
        Action::Negative(message)
    }

    /// Builds the final response, caches what was learned, and hands the
    /// message back with the original question restored.
    fn finish(&self, original: &Question, current: &Question, chain: Vec<Record>,
              response: Message, negative: bool) -> Message {
        let mut result = response;
        result.questions = vec![ original.clone() ];

        if ! chain.is_empty() {
            let mut answers = chain;
            answers.append(&mut result.answers);
            result.answers = answers;
        }

        let mut zone = self.zone.write().unwrap();
        let observed: Vec<Record> = result.answers.iter()
            .chain(&result.authorities)
            .chain(&result.additionals)
            .cloned()
            .collect();
        zone.insert(&observed);

        if negative {
            let soa = result.authorities.iter()
                .find(|r| r.rtype == RecordType::SOA)
                .cloned();
            zone.insert_negative(&current.name, current.qtype, current.qclass,
                                 result.rcode() == Rcode::NxDomain, soa);
        }

        result
    }
}


/// Collects the records that answer a question from an answer section,
/// following CNAME links inside it. The links come first in the result,
/// and the terminal records last.
pub fn collect_answers(question: &Question, records: &[Record]) -> Vec<Record> {
    let mut target = question.name.clone();
    let mut collected = Vec::new();

    for _ in 0 ..= MAX_CNAME_CHAIN {
        let direct: Vec<Record> = records.iter()
            .filter(|r| r.name == target
                     && r.rtype == question.qtype
                     && r.qclass == question.qclass)
            .cloned()
            .collect();
        if ! direct.is_empty() {
            collected.extend(direct);
            return collected;
        }

        if question.qtype == RecordType::CNAME {
            return collected;
        }

        let link = records.iter()
            .find(|r| r.name == target && r.rtype == RecordType::CNAME);
        match link.and_then(|l| l.target_name().cloned()) {
            Some(next) => {
                collected.push(link.unwrap().clone());
                target = next;
            }
            None => return collected,
        }
    }

    collected
}

/// Shuffles the candidate set with the query’s stable generator, then
/// floats the servers that already have addresses to the front.
fn order_servers(servers: &[NameServer], rng: &mut StdRng) -> Vec<NameServer> {
    let mut ordered = servers.to_vec();
    ordered.shuffle(rng);
    ordered.sort_by_key(|ns| ns.address.is_none());
    ordered
}

/// The next server that has not yet hit the failure limit.
fn pick_server(failures: &[u32]) -> Option<usize> {
    failures.iter().position(|f| *f < SERVER_FAILURE_LIMIT)
}

/// A stable seed for server selection, derived from the question.
fn fingerprint_seed(question: &Question) -> u64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    question.name.hash(&mut hasher);
    question.qtype.to_u16().hash(&mut hasher);
    question.qclass.to_u16().hash(&mut hasher);
    hasher.finish()
}
