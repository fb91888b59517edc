//! The seam between the resolver and the network.
//!
//! The resolver never opens a socket itself. It hands a serialised query
//! to a [`Transport`] and gets response bytes back; binding, sending,
//! and source-address checking belong to the implementation. This keeps
//! the state machine testable with a scripted transport, and lets the
//! embedding application pick its own I/O.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use derive_more::From;


/// Which transport protocol an exchange should use.
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub enum Protocol {

    /// A single datagram exchange. Responses may arrive truncated.
    Udp,

    /// A length-prefixed stream exchange, used after truncation.
    Tcp,
}

/// One request-response network exchange.
///
/// Implementations must drop datagrams whose source address differs from
/// the server the query was sent to; the resolver checks the transaction
/// id and question itself.
pub trait Transport {

    /// Sends the payload to the server and waits up to the timeout for
    /// a response.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Timeout`] when nothing arrives in time,
    /// or a network error for everything else that can go wrong on the
    /// way.
    fn exchange(&self, server: SocketAddr, protocol: Protocol, payload: &[u8], timeout: Duration)
        -> Result<Vec<u8>, TransportError>;
}

/// Something that can go wrong exchanging bytes with a server.
#[derive(Debug, From)]  // not PartialEq, because io::Error is not
pub enum TransportError {

    /// There was a problem with the network sending the request or
    /// receiving a response.
    Network(io::Error),

    /// No response arrived within the attempt’s budget.
    #[from(ignore)]
    Timeout,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network(e)  => write!(f, "network error: {}", e),
            Self::Timeout     => write!(f, "timed out waiting for a response"),
        }
    }
}
