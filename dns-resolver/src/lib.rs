#![warn(deprecated_in_future)]
#![warn(future_incompatible)]
#![warn(missing_copy_implementations)]
#![warn(missing_docs)]
#![warn(nonstandard_style)]
#![warn(rust_2018_compatibility)]
#![warn(rust_2018_idioms)]
#![warn(trivial_casts, trivial_numeric_casts)]
#![warn(unused)]

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::redundant_else)]
#![allow(clippy::wildcard_imports)]

#![deny(unsafe_code)]


//! The resolver crate drives the `dns` codec over an injected transport:
//! recursive descent from the root hints, referral chasing, CNAME
//! unrolling, retries, and a zone index that doubles as the cache.
//! Sockets stay outside; implement [`Transport`] to plug the network in.


mod hints;
pub use self::hints::{RootHint, default_hints};

mod transport;
pub use self::transport::{Protocol, Transport, TransportError};

mod txid;
pub use self::txid::TxidGenerator;

mod zone;
pub use self::zone::{Entry, Negative, ZoneIndex};

mod resolver;
pub use self::resolver::{CancelToken, PolicyLimit, ResolveError, Resolver, collect_answers,
                         MAX_CNAME_CHAIN, MAX_REFERRALS,
                         SERVER_FAILURE_LIMIT, TCP_ATTEMPT_TIMEOUT, UDP_ATTEMPT_TIMEOUT};
