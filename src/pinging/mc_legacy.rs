use std::time::{Duration, Instant};

use byteorder::BigEndian;
use log::{debug, warn};
use serde::Serialize;

use crate::{
    codec::{decode_wide_string, encode_length_prefixed_wide_string, pack, split_wide_nul, unpack},
    config::ProbeConfig,
    target::Target,
    transport::{Connection, TransportKind, TransportProvider},
};

use super::{Pinger, ProbeError};

/// Packet id of the kick the server answers a legacy ping with.
pub const KICK_PACKET_ID: u8 = 0xFF;

const PING_HOST_CHANNEL: &str = "MC|PingHost";

/// Sent in the protocol version slot; servers answer regardless of its value.
const PROTOCOL_VERSION_PLACEHOLDER: u8 = 73;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PingResult {
    pub protocol_version: String,
    pub server_version: String,
    pub motd: String,
    pub player_count: String,
    pub player_max: String,
    pub latency_ms: u64,
}

pub struct LegacyPinger<'a> {
    pub provider: &'a dyn TransportProvider,
    pub timeout: Duration,
    pub read_buffer: usize,
}

impl<'a> LegacyPinger<'a> {
    pub fn new(provider: &'a dyn TransportProvider, config: &ProbeConfig) -> Self {
        LegacyPinger {
            provider,
            timeout: config.timeout,
            read_buffer: config.read_buffer,
        }
    }
}

/// Builds the 1.6 style `FE 01 FA` ping with the `MC|PingHost` plugin message.
///
/// Fails when the hostname is too long for the request's u16 length fields.
pub fn build_request(hostname: &str, port: u16) -> Result<Vec<u8>, ProbeError> {
    let too_long = || {
        ProbeError::ConnectionFailed(format!(
            "hostname of {} bytes is too long for a ping request",
            hostname.len()
        ))
    };

    let mut request = vec![0xFE, 0x01, 0xFA]; // opening bytes
    request.extend(encode_length_prefixed_wide_string(PING_HOST_CHANNEL)?);

    let hostname_units = hostname.encode_utf16().count();
    // 7 for the rest of the data
    let payload_len = u16::try_from(7 + 2 * hostname_units).map_err(|_| too_long())?;
    pack::<BigEndian, u16>(&mut request, payload_len);
    request.push(PROTOCOL_VERSION_PLACEHOLDER);
    request.extend(encode_length_prefixed_wide_string(hostname).map_err(|_| too_long())?);
    pack::<BigEndian, u32>(&mut request, port as u32);
    Ok(request)
}

/// Total reply length announced by a kick packet header, if there is one.
fn announced_len(reply: &[u8]) -> Option<usize> {
    if reply.len() < 3 || reply[0] != KICK_PACKET_ID {
        return None;
    }
    let chars = unpack::<BigEndian, u16>(&reply[1..3]).ok()? as usize;
    Some(3 + chars * 2)
}

/// Parses a kick packet carrying `§1`, protocol version, server version, motd,
/// player count and player max, separated by wide NULs.
pub fn parse_response(reply: &[u8], latency_ms: u64) -> Result<PingResult, ProbeError> {
    match reply.first() {
        Some(&KICK_PACKET_ID) => {}
        Some(id) => {
            warn!("legacy ping answered with packet id {:#04x}", id);
            return Err(ProbeError::MalformedResponse(format!(
                "received packet id {:#04x}, expected 0xff",
                id
            )));
        }
        None => {
            return Err(ProbeError::MalformedResponse(
                "server closed the connection without replying".to_string(),
            ))
        }
    }

    let body = reply.get(3..).unwrap_or_default();
    let fields = split_wide_nul(body);
    if fields.len() < 6 {
        warn!("legacy ping reply has {} fields", fields.len());
        return Err(ProbeError::MalformedResponse(format!(
            "expected at least 6 fields, got {}",
            fields.len()
        )));
    }

    // fields[0] is the §1 marker
    Ok(PingResult {
        protocol_version: decode_wide_string(fields[1]),
        server_version: decode_wide_string(fields[2]),
        motd: decode_wide_string(fields[3]),
        player_count: decode_wide_string(fields[4]),
        player_max: decode_wide_string(fields[5]),
        latency_ms,
    })
}

impl Pinger for LegacyPinger<'_> {
    type Data = PingResult;

    type Error = ProbeError;

    fn ping(&self, target: &Target) -> std::result::Result<Self::Data, Self::Error> {
        let request = build_request(&target.hostname, target.port)?;

        let start = Instant::now();
        let mut connection =
            Connection::open(self.provider, target, TransportKind::Stream, self.timeout)?;
        connection.send(&request)?;

        let mut reply = connection.receive_at_least(3, self.read_buffer)?;
        if let Some(expected) = announced_len(&reply) {
            if reply.len() < expected && reply.len() < self.read_buffer {
                let rest = connection
                    .receive_at_least(expected - reply.len(), self.read_buffer - reply.len())?;
                reply.extend(rest);
            }
        }
        let latency_ms = start.elapsed().as_millis() as u64;
        drop(connection);

        debug!("legacy ping to {} answered {} bytes in {}ms", target, reply.len(), latency_ms);
        parse_response(&reply, latency_ms)
    }
}
