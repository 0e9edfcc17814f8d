//! The probing facade: one instance per target, keeping a history of every
//! probe made through it.

use std::time::SystemTime;

use log::debug;
use parking_lot::Mutex;
use serde::Serialize;

use crate::{
    config::ProbeConfig,
    pinging::{
        mc_legacy::{LegacyPinger, PingResult},
        mc_query::{BasicQueryPinger, BasicQueryResult, FullQueryPinger, FullQueryResult, QueryClient},
        Pinger, ProbeError,
    },
    target::{ProbeMethod, Target},
    transport::{NetTransportProvider, TransportProvider},
};

/// A successful probe of any kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProbeResult {
    Ping(PingResult),
    Basic(BasicQueryResult),
    Full(FullQueryResult),
}

impl ProbeResult {
    pub fn motd(&self) -> &str {
        match self {
            ProbeResult::Ping(r) => &r.motd,
            ProbeResult::Basic(r) => &r.motd,
            ProbeResult::Full(r) => &r.motd,
        }
    }

    pub fn player_count(&self) -> &str {
        match self {
            ProbeResult::Ping(r) => &r.player_count,
            ProbeResult::Basic(r) => &r.player_count,
            ProbeResult::Full(r) => &r.player_count,
        }
    }

    pub fn player_max(&self) -> &str {
        match self {
            ProbeResult::Ping(r) => &r.player_max,
            ProbeResult::Basic(r) => &r.player_max,
            ProbeResult::Full(r) => &r.player_max,
        }
    }

    pub fn latency_ms(&self) -> u64 {
        match self {
            ProbeResult::Ping(r) => r.latency_ms,
            ProbeResult::Basic(r) => r.latency_ms,
            ProbeResult::Full(r) => r.latency_ms,
        }
    }
}

pub type ProbeOutcome = Result<ProbeResult, ProbeError>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    /// Strictly increasing per probe instance; the lookup key.
    pub sequence: u64,
    pub timestamp: SystemTime,
    pub method: ProbeMethod,
    pub target: Target,
    pub outcome: ProbeOutcome,
}

#[derive(Debug, Default)]
struct ProbeLog {
    history: Vec<HistoryEntry>,
    last_error: Option<ProbeError>,
    next_sequence: u64,
}

/// Probes one server and remembers the outcome of every attempt.
///
/// Probes through one instance run one at a time even when the instance is
/// shared between threads; separate instances never wait for each other.
pub struct StatusProbe {
    target: Target,
    config: ProbeConfig,
    provider: Box<dyn TransportProvider>,
    exchange: Mutex<()>,
    log: Mutex<ProbeLog>,
}

impl StatusProbe {
    /// A probe using real network sockets.
    pub fn new(target: Target, config: ProbeConfig) -> Self {
        Self::with_provider(target, config, Box::new(NetTransportProvider))
    }

    pub fn with_provider(
        target: Target,
        config: ProbeConfig,
        provider: Box<dyn TransportProvider>,
    ) -> Self {
        StatusProbe {
            target,
            config,
            provider,
            exchange: Mutex::new(()),
            log: Mutex::new(ProbeLog::default()),
        }
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Runs one fresh exchange with the server and records it. Never retries.
    pub fn probe(&self, method: ProbeMethod) -> ProbeOutcome {
        let _exchange = self.exchange.lock();
        debug!("{} against {}", method, self.target);

        let provider = self.provider.as_ref();
        let outcome = match method {
            ProbeMethod::ServerListPing => LegacyPinger::new(provider, &self.config)
                .ping(&self.target)
                .map(ProbeResult::Ping),
            ProbeMethod::BasicQuery => BasicQueryPinger(QueryClient::new(provider, &self.config))
                .ping(&self.target)
                .map(ProbeResult::Basic),
            ProbeMethod::FullQuery => FullQueryPinger(QueryClient::new(provider, &self.config))
                .ping(&self.target)
                .map(ProbeResult::Full),
        };

        match &outcome {
            Ok(result) => debug!("{} against {} took {}ms", method, self.target, result.latency_ms()),
            Err(e) => debug!("{} against {} failed: {}", method, self.target, e),
        }

        let mut log = self.log.lock();
        if let Err(e) = &outcome {
            log.last_error = Some(e.clone());
        }
        let sequence = log.next_sequence;
        log.next_sequence += 1;
        log.history.push(HistoryEntry {
            sequence,
            timestamp: SystemTime::now(),
            method,
            target: self.target.clone(),
            outcome: outcome.clone(),
        });

        outcome
    }

    /// Every probe so far, oldest first.
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.log.lock().history.clone()
    }

    pub fn entry(&self, sequence: u64) -> Option<HistoryEntry> {
        self.log
            .lock()
            .history
            .iter()
            .find(|entry| entry.sequence == sequence)
            .cloned()
    }

    /// The error of the most recent failed probe, if any probe has failed.
    pub fn last_error(&self) -> Option<ProbeError> {
        self.log.lock().last_error.clone()
    }
}
