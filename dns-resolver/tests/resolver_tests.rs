use std::collections::VecDeque;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dns::record::{Record, RecordType};
use dns::{record_from_line, Message, Name, Question, Rcode};

use dns_resolver::{CancelToken, PolicyLimit, Protocol, ResolveError, Resolver, RootHint,
                   Transport, TransportError};

use pretty_assertions::assert_eq;


type Responder = Box<dyn Fn(&Message, Protocol) -> Message + Send>;

enum Step {
    Reply(Responder),
    Silence,
    Forged,
}

/// A transport that replays a script instead of touching the network,
/// and logs where each exchange went.
struct ScriptedTransport {
    steps: Mutex<VecDeque<Step>>,
    exchanges: Arc<AtomicUsize>,
    log: Arc<Mutex<Vec<(SocketAddr, Protocol)>>>,
    delay: Duration,
}

impl ScriptedTransport {
    fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            exchanges: Arc::new(AtomicUsize::new(0)),
            log: Arc::new(Mutex::new(Vec::new())),
            delay: Duration::from_millis(0),
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn counters(&self) -> (Arc<AtomicUsize>, Arc<Mutex<Vec<(SocketAddr, Protocol)>>>) {
        (Arc::clone(&self.exchanges), Arc::clone(&self.log))
    }
}

impl Transport for ScriptedTransport {
    fn exchange(&self, server: SocketAddr, protocol: Protocol, payload: &[u8], _timeout: Duration)
        -> Result<Vec<u8>, TransportError>
    {
        self.exchanges.fetch_add(1, Ordering::SeqCst);
        self.log.lock().unwrap().push((server, protocol));

        if ! self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }

        let step = self.steps.lock().unwrap().pop_front().expect("script ran dry");
        let query = Message::from_bytes(payload).expect("resolver sent malformed query");

        match step {
            Step::Silence => Err(TransportError::Timeout),
            Step::Forged => {
                let mut response = respond_to(&query);
                response.id = query.id.wrapping_add(1);
                Ok(response.to_bytes().unwrap())
            }
            Step::Reply(build) => Ok(build(&query, protocol).to_bytes().unwrap()),
        }
    }
}

/// A skeleton response to the given query: same id, same question,
/// response flag set.
fn respond_to(query: &Message) -> Message {
    let mut response = query.clone();
    response.flags.response = true;
    response
}

fn reply(build: impl Fn(&Message, Protocol) -> Message + Send + 'static) -> Step {
    Step::Reply(Box::new(build))
}

fn answer_with(lines: &[&str]) -> Step {
    let records: Vec<Record> = lines.iter().map(|l| record_from_line(l).unwrap()).collect();
    reply(move |query, _| {
        let mut response = respond_to(query);
        response.flags.authoritative = true;
        response.answers = records.clone();
        response
    })
}

fn referral_with(authority: &[&str], glue: &[&str]) -> Step {
    let authority: Vec<Record> = authority.iter().map(|l| record_from_line(l).unwrap()).collect();
    let glue: Vec<Record> = glue.iter().map(|l| record_from_line(l).unwrap()).collect();
    reply(move |query, _| {
        let mut response = respond_to(query);
        response.authorities = authority.clone();
        response.additionals = glue.clone();
        response
    })
}

fn one_root() -> Vec<RootHint> {
    vec![ RootHint {
        name: Name::parse("a.root-servers.net.").unwrap(),
        ip: IpAddr::V4(Ipv4Addr::new(198, 41, 0, 4)),
    } ]
}

fn question(name: &str, rtype: RecordType) -> Question {
    Question::new(Name::parse(name).unwrap(), rtype)
}

fn resolver_with(steps: Vec<Step>) -> (Resolver, Arc<AtomicUsize>, Arc<Mutex<Vec<(SocketAddr, Protocol)>>>) {
    let transport = ScriptedTransport::new(steps);
    let (exchanges, log) = transport.counters();
    (Resolver::with_hints(Box::new(transport), one_root()), exchanges, log)
}


#[test]
fn root_delegation_answers_an_ns_query() {
    let gtld_lines: Vec<String> = (b'a' ..= b'm')
        .map(|l| format!("com. 172800 IN NS {}.gtld-servers.net.", char::from(l)))
        .collect();
    let authority: Vec<&str> = gtld_lines.iter().map(String::as_str).collect();

    let (resolver, exchanges, _) = resolver_with(vec![
        referral_with(&authority, &[ "a.gtld-servers.net. 172800 IN A 192.5.6.30" ]),
    ]);

    let message = resolver.resolve(&question("com.", RecordType::NS), &CancelToken::new()).unwrap();

    assert_eq!(message.authorities.len(), 13);
    assert!(message.authorities.iter().all(|r| r.ttl == 172_800));
    assert!(message.authorities.iter().all(|r| r.rtype == RecordType::NS));
    assert_eq!(message.authorities[0].name, Name::parse("com.").unwrap());
    assert_eq!(exchanges.load(Ordering::SeqCst), 1);
}


#[test]
fn nxdomain_carries_the_soa_and_nsec() {
    let soa_line = ". 86400 IN SOA a.root-servers.net. nstld.verisign-grs.com. \
                    2018080200 1800 900 604800 86400";
    let nsec_line = "id. 86400 IN NSEC ie. NS DS RRSIG NSEC";

    let soa = record_from_line(soa_line).unwrap();
    let nsec = record_from_line(nsec_line).unwrap();
    let authority = vec![ soa.clone(), nsec.clone() ];

    let (resolver, exchanges, _) = resolver_with(vec![
        reply(move |query, _| {
            let mut response = respond_to(query);
            response.set_rcode(Rcode::NxDomain);
            response.authorities = authority.clone();
            response
        }),
    ]);

    let message = resolver.resolve(&question("idontexist.", RecordType::A), &CancelToken::new()).unwrap();

    assert_eq!(message.rcode(), Rcode::NxDomain);
    assert!(message.answers.is_empty());
    assert_eq!(message.authorities, vec![ soa, nsec ]);

    // the denial is cached: asking again does not touch the network
    let again = resolver.resolve(&question("idontexist.", RecordType::A), &CancelToken::new()).unwrap();
    assert_eq!(again.rcode(), Rcode::NxDomain);
    assert_eq!(exchanges.load(Ordering::SeqCst), 1);
}


#[test]
fn referrals_descend_to_the_delegated_server() {
    let (resolver, exchanges, log) = resolver_with(vec![
        referral_with(
            &[ "example.com. 172800 IN NS ns1.example.com." ],
            &[ "ns1.example.com. 172800 IN A 192.0.2.53" ]),
        answer_with(&[ "www.example.com. 300 IN A 93.184.216.34" ]),
    ]);

    let message = resolver.resolve(&question("www.example.com.", RecordType::A), &CancelToken::new()).unwrap();

    assert_eq!(message.answers.len(), 1);
    assert_eq!(exchanges.load(Ordering::SeqCst), 2);

    let log = log.lock().unwrap();
    assert_eq!(log[0].0.ip(), IpAddr::V4(Ipv4Addr::new(198, 41, 0, 4)));
    assert_eq!(log[1].0.ip(), IpAddr::V4(Ipv4Addr::new(192, 0, 2, 53)));
}


#[test]
fn cname_chains_unroll() {
    let (resolver, exchanges, _) = resolver_with(vec![
        answer_with(&[ "example.com. 300 IN CNAME www.example.com." ]),
        answer_with(&[ "www.example.com. 300 IN A 93.184.216.34" ]),
    ]);

    let message = resolver.resolve(&question("example.com.", RecordType::A), &CancelToken::new()).unwrap();

    assert_eq!(message.answers.len(), 2);
    assert_eq!(message.answers[0].rtype, RecordType::CNAME);
    assert_eq!(message.answers[1].rtype, RecordType::A);
    assert_eq!(message.questions[0].name, Name::parse("example.com.").unwrap());
    assert_eq!(exchanges.load(Ordering::SeqCst), 2);
}


#[test]
fn truncation_retries_over_tcp() {
    let (resolver, exchanges, log) = resolver_with(vec![
        reply(|query, protocol| {
            assert_eq!(protocol, Protocol::Udp);
            let mut response = respond_to(query);
            response.flags.truncated = true;
            response
        }),
        reply(|query, protocol| {
            assert_eq!(protocol, Protocol::Tcp);
            let mut response = respond_to(query);
            response.flags.authoritative = true;
            response.answers = vec![
                record_from_line("example.com. 300 IN A 93.184.216.34").unwrap(),
            ];
            response
        }),
    ]);

    let message = resolver.resolve(&question("example.com.", RecordType::A), &CancelToken::new()).unwrap();

    assert_eq!(message.answers.len(), 1);
    assert_eq!(exchanges.load(Ordering::SeqCst), 2);

    let log = log.lock().unwrap();
    assert_eq!(log[0].0, log[1].0);  // same server both times
    assert_eq!(log[0].1, Protocol::Udp);
    assert_eq!(log[1].1, Protocol::Tcp);
}


#[test]
fn server_failures_rotate_to_a_peer() {
    let hints = vec![
        RootHint { name: Name::parse("a.root-servers.net.").unwrap(),
                   ip: IpAddr::V4(Ipv4Addr::new(198, 41, 0, 4)) },
        RootHint { name: Name::parse("b.root-servers.net.").unwrap(),
                   ip: IpAddr::V4(Ipv4Addr::new(199, 9, 14, 201)) },
    ];

    let transport = ScriptedTransport::new(vec![
        reply(|query, _| {
            let mut response = respond_to(query);
            response.set_rcode(Rcode::ServFail);
            response
        }),
        answer_with(&[ "example.com. 300 IN A 93.184.216.34" ]),
    ]);
    let (exchanges, log) = transport.counters();
    let resolver = Resolver::with_hints(Box::new(transport), hints);

    let message = resolver.resolve(&question("example.com.", RecordType::A), &CancelToken::new()).unwrap();

    assert_eq!(message.answers.len(), 1);
    assert_eq!(exchanges.load(Ordering::SeqCst), 2);

    let log = log.lock().unwrap();
    assert_ne!(log[0].0, log[1].0);  // a different server the second time
}


#[test]
fn timeouts_are_retried() {
    let (resolver, exchanges, _) = resolver_with(vec![
        Step::Silence,
        answer_with(&[ "example.com. 300 IN A 93.184.216.34" ]),
    ]);

    let message = resolver.resolve(&question("example.com.", RecordType::A), &CancelToken::new()).unwrap();
    assert_eq!(message.answers.len(), 1);
    assert_eq!(exchanges.load(Ordering::SeqCst), 2);
}


#[test]
fn all_timeouts_surface_after_the_budget() {
    let (resolver, exchanges, _) = resolver_with(vec![
        Step::Silence, Step::Silence, Step::Silence,
    ]);

    let result = resolver.resolve(&question("example.com.", RecordType::A), &CancelToken::new());
    assert_eq!(result, Err(ResolveError::Timeout));
    assert_eq!(exchanges.load(Ordering::SeqCst), 3);
}


#[test]
fn forged_responses_are_ignored() {
    let (resolver, exchanges, _) = resolver_with(vec![
        Step::Forged,
        answer_with(&[ "example.com. 300 IN A 93.184.216.34" ]),
    ]);

    let message = resolver.resolve(&question("example.com.", RecordType::A), &CancelToken::new()).unwrap();
    assert_eq!(message.answers.len(), 1);
    assert_eq!(exchanges.load(Ordering::SeqCst), 2);
}


#[test]
fn positive_answers_are_cached() {
    let (resolver, exchanges, _) = resolver_with(vec![
        answer_with(&[ "example.com. 300 IN A 93.184.216.34" ]),
    ]);

    let first = resolver.resolve(&question("example.com.", RecordType::A), &CancelToken::new()).unwrap();
    let second = resolver.resolve(&question("example.com.", RecordType::A), &CancelToken::new()).unwrap();

    assert_eq!(first.answers, second.answers);
    assert_eq!(exchanges.load(Ordering::SeqCst), 1);
}


#[test]
fn seeded_zones_answer_without_the_network() {
    let (resolver, exchanges, _) = resolver_with(vec![]);
    resolver.load_zone("local.test. 3600 IN A 10.0.0.1\n").unwrap();

    let message = resolver.resolve(&question("local.test.", RecordType::A), &CancelToken::new()).unwrap();
    assert_eq!(message.answers.len(), 1);
    assert_eq!(exchanges.load(Ordering::SeqCst), 0);
}


#[test]
fn cancellation_wins_before_the_network() {
    let (resolver, exchanges, _) = resolver_with(vec![]);

    let cancel = CancelToken::new();
    cancel.cancel();

    let result = resolver.resolve(&question("example.com.", RecordType::A), &cancel);
    assert_eq!(result, Err(ResolveError::Cancelled));
    assert_eq!(exchanges.load(Ordering::SeqCst), 0);
}


#[test]
fn referral_depth_is_bounded() {
    let mut steps = Vec::new();
    for depth in 0 .. 11 {
        let cut = format!("{}.example.com.", "x.".repeat(depth + 1));
        let ns = format!("ns.{}", cut);
        let authority = format!("{} 300 IN NS {}", cut, ns);
        let glue = format!("{} 300 IN A 192.0.2.{}", ns, depth + 1);
        steps.push(referral_with(&[ &authority ], &[ &glue ]));
    }

    let (resolver, exchanges, _) = resolver_with(steps);

    let result = resolver.resolve(
        &question("www.x.x.x.x.x.x.x.x.x.x.x.example.com.", RecordType::A),
        &CancelToken::new());
    assert_eq!(result, Err(ResolveError::Policy(PolicyLimit::ReferralDepth)));
    assert_eq!(exchanges.load(Ordering::SeqCst), 11);
}


#[test]
fn cname_chain_length_is_bounded() {
    let mut steps = Vec::new();
    for hop in 0 .. 11 {
        let from = if hop == 0 {
            String::from("example.com.")
        }
        else {
            format!("hop{}.example.com.", hop)
        };
        let to = format!("hop{}.example.com.", hop + 1);
        let line = format!("{} 300 IN CNAME {}", from, to);
        steps.push(answer_with(&[ &line ]));
    }

    let (resolver, _, _) = resolver_with(steps);

    let result = resolver.resolve(&question("example.com.", RecordType::A), &CancelToken::new());
    assert_eq!(result, Err(ResolveError::Policy(PolicyLimit::CnameChain)));
}


#[test]
fn concurrent_askers_share_one_flight() {
    let transport = ScriptedTransport::new(vec![
        answer_with(&[ "example.com. 300 IN A 93.184.216.34" ]),
    ]).with_delay(Duration::from_millis(150));
    let (exchanges, _) = transport.counters();
    let resolver = Arc::new(Resolver::with_hints(Box::new(transport), one_root()));

    let mut handles = Vec::new();
    for _ in 0 .. 4 {
        let resolver = Arc::clone(&resolver);
        handles.push(std::thread::spawn(move || {
            resolver.resolve(&question("example.com.", RecordType::A), &CancelToken::new())
        }));
    }

    for handle in handles {
        let message = handle.join().unwrap().unwrap();
        assert_eq!(message.answers.len(), 1);
    }

    assert_eq!(exchanges.load(Ordering::SeqCst), 1);
}
