//! Probes Minecraft servers without joining them.
//!
//! Two legacy exchanges are supported: the 1.6 "Server List Ping" over TCP and
//! the UT3 style query protocol over UDP, in its basic and full flavours.
//!
//! ```no_run
//! use mcstat::{ProbeConfig, ProbeMethod, StatusProbe, Target};
//!
//! let probe = StatusProbe::new(Target::with_default_port("localhost"), ProbeConfig::default());
//! match probe.probe(ProbeMethod::ServerListPing) {
//!     Ok(status) => println!("{} ({}/{})", status.motd(), status.player_count(), status.player_max()),
//!     Err(e) => eprintln!("{}", e),
//! }
//! ```

pub mod codec;
pub mod config;
pub mod pinging;
pub mod resolution;
pub mod status;
pub mod target;
pub mod transport;

pub use config::ProbeConfig;
pub use pinging::{
    mc_legacy::PingResult,
    mc_query::{BasicQueryResult, FullQueryResult},
    ProbeError, ProbeErrorKind,
};
pub use status::{HistoryEntry, ProbeOutcome, ProbeResult, StatusProbe};
pub use target::{ProbeMethod, Target, TargetParseError};
