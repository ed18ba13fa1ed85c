use serde::{Deserialize, Serialize};
use std::fmt;

/// A cluster member's address: hostname bytes plus port.
///
/// Equality is bitwise over `(hostname, port)` — two endpoints naming the same
/// host via different literal bytes (e.g. a trailing dot) are distinct.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    hostname: Box<[u8]>,
    port: u16,
}

impl Endpoint {
    pub fn new(hostname: impl Into<Vec<u8>>, port: u16) -> Self {
        Self {
            hostname: hostname.into().into_boxed_slice(),
            port,
        }
    }

    pub fn hostname(&self) -> &[u8] {
        &self.hostname
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Renders `hostname:port` for logging and for parsing into a socket address
    /// by the transport layer. Not used for equality or hashing.
    pub fn display(&self) -> String {
        format!("{}:{}", String::from_utf8_lossy(&self.hostname), self.port)
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Endpoint({})", self.display())
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display())
    }
}

impl From<(&str, u16)> for Endpoint {
    fn from((host, port): (&str, u16)) -> Self {
        Self::new(host.as_bytes().to_vec(), port)
    }
}
