//! Parsing of application entity addresses in the `AET@host:port` form.

use snafu::{ensure, Snafu};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Snafu, PartialEq)]
#[non_exhaustive]
pub enum ParseAeAddrError {
    #[snafu(display("missing socket address after `@`"))]
    MissingSocketAddr,

    #[snafu(display("AE title must be between 1 and 16 characters"))]
    BadAeTitleLength,
}

/// A network address with an optional application entity title,
/// written as `AET@host:port` or plain `host:port`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AeAddr {
    /// The AE title part, when given.
    pub ae_title: Option<String>,
    /// The socket address part (`host:port`).
    pub socket_addr: String,
}

impl AeAddr {
    /// Create an address with an explicit AE title.
    pub fn new(ae_title: impl Into<String>, socket_addr: impl Into<String>) -> Self {
        AeAddr {
            ae_title: Some(ae_title.into()),
            socket_addr: socket_addr.into(),
        }
    }

    /// The socket address to connect to.
    pub fn socket_addr(&self) -> &str {
        &self.socket_addr
    }
}

impl FromStr for AeAddr {
    type Err = ParseAeAddrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('@') {
            Some((ae_title, socket_addr)) => {
                ensure!(!socket_addr.is_empty(), MissingSocketAddrSnafu);
                ensure!(
                    (1..=16).contains(&ae_title.len()),
                    BadAeTitleLengthSnafu
                );
                Ok(AeAddr {
                    ae_title: Some(ae_title.to_string()),
                    socket_addr: socket_addr.to_string(),
                })
            }
            None => Ok(AeAddr {
                ae_title: None,
                socket_addr: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for AeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.ae_title {
            Some(aet) => write!(f, "{}@{}", aet, self.socket_addr),
            None => f.write_str(&self.socket_addr),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_with_ae_title() {
        let addr: AeAddr = "TEAMPACS@10.0.0.5:104".parse().unwrap();
        assert_eq!(addr.ae_title.as_deref(), Some("TEAMPACS"));
        assert_eq!(addr.socket_addr(), "10.0.0.5:104");
    }

    #[test]
    fn parse_without_ae_title() {
        let addr: AeAddr = "localhost:11112".parse().unwrap();
        assert_eq!(addr.ae_title, None);
        assert_eq!(addr.socket_addr(), "localhost:11112");
    }

    #[test]
    fn rejects_oversized_ae_title() {
        let e = "THIS_AE_TITLE_IS_TOO_LONG@host:104".parse::<AeAddr>();
        assert_eq!(e, Err(ParseAeAddrError::BadAeTitleLength));
    }
}
