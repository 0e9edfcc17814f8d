use std::{fmt::Display, net::Ipv6Addr, str::FromStr};

use serde::Serialize;
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 25565;

/// A host and port to probe. The host may be a name or an IP literal.
///
/// ```
/// use mcstat::Target;
///
/// let target: Target = "play.example.org:25570".parse().unwrap();
/// assert_eq!(target.hostname, "play.example.org");
/// assert_eq!(target.port, 25570);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Target {
    pub hostname: String,
    pub port: u16,
}

impl Target {
    pub fn new(hostname: impl Into<String>, port: u16) -> Self {
        Target {
            hostname: hostname.into(),
            port,
        }
    }

    /// A target on the default Minecraft port.
    pub fn with_default_port(hostname: impl Into<String>) -> Self {
        Self::new(hostname, DEFAULT_PORT)
    }
}

impl FromStr for Target {
    type Err = TargetParseError;

    /// Parses `host`, `host:port`, `[v6]` or `[v6]:port`. A bare IPv6
    /// literal is taken as a host on the default port.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.parse::<Ipv6Addr>().is_ok() {
            return Ok(Target::with_default_port(s));
        }

        let (host, port) = match s.strip_prefix('[') {
            Some(rest) => {
                let (host, after) = rest
                    .split_once(']')
                    .ok_or_else(|| TargetParseError::InvalidHost(s.to_string()))?;
                if host.parse::<Ipv6Addr>().is_err() {
                    return Err(TargetParseError::InvalidHost(s.to_string()));
                }
                let port = match after {
                    "" => None,
                    after => Some(
                        after
                            .strip_prefix(':')
                            .ok_or_else(|| TargetParseError::InvalidHost(s.to_string()))?,
                    ),
                };
                (host, port)
            }
            None => {
                let mut parts = s.split(':');
                let host = parts.next().unwrap_or_default();
                let port = parts.next();
                if parts.next().is_some() {
                    return Err(TargetParseError::InvalidHost(s.to_string()));
                }
                (host, port)
            }
        };

        if host.is_empty() {
            return Err(TargetParseError::EmptyHost);
        }
        let port = match port {
            Some(port) => port
                .parse::<u16>()
                .map_err(|_| TargetParseError::InvalidPort(port.to_string()))?,
            None => DEFAULT_PORT,
        };
        Ok(Target::new(host, port))
    }
}

impl Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.hostname.contains(':') && !self.hostname.starts_with('[') {
            write!(f, "[{}]:{}", self.hostname, self.port)
        } else {
            write!(f, "{}:{}", self.hostname, self.port)
        }
    }
}

/// Which exchange a probe performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ProbeMethod {
    ServerListPing,
    BasicQuery,
    FullQuery,
}

impl FromStr for ProbeMethod {
    type Err = TargetParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ping" | "slp" => Ok(ProbeMethod::ServerListPing),
            "basic" => Ok(ProbeMethod::BasicQuery),
            "full" | "query" => Ok(ProbeMethod::FullQuery),
            _ => Err(TargetParseError::UnknownMethod(s.to_string())),
        }
    }
}

impl Display for ProbeMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ProbeMethod::ServerListPing => "Server List Ping",
            ProbeMethod::BasicQuery => "Basic Query",
            ProbeMethod::FullQuery => "Full Query",
        })
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TargetParseError {
    #[error("no host specified")]
    EmptyHost,

    #[error("invalid host {0}")]
    InvalidHost(String),

    #[error("invalid port {0}")]
    InvalidPort(String),

    #[error("unknown probe method {0}, expected ping, basic or full")]
    UnknownMethod(String),
}
