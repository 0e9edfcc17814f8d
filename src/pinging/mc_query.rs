use std::{
    fmt,
    io::Read,
    time::{Duration, Instant},
};

use byteorder::{BigEndian, LittleEndian};
use log::{debug, warn};
use rand::Rng;
use serde::{ser::SerializeMap, Serialize, Serializer};

use crate::{
    codec::{pack, read_null_terminated_strings, split_sections, unpack, ResponseFramer},
    config::ProbeConfig,
    target::Target,
    transport::{Connection, TransportKind, TransportProvider},
};

use super::{Pinger, ProbeError};

pub const QUERY_MAGIC: [u8; 2] = [0xFE, 0xFD];
pub const HANDSHAKE_TYPE: u8 = 9;
pub const STAT_TYPE: u8 = 0;

/// Keeps every byte of a session id at or below 0x0F.
pub const SESSION_ID_MASK: u32 = 0x0F0F_0F0F;

/// `splitnum\0\x80\0` ahead of the full stat key/value section.
const FULL_STAT_PADDING_LEN: usize = 11;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BasicQueryResult {
    pub motd: String,
    pub gametype: String,
    pub map: String,
    pub player_count: String,
    pub player_max: String,
    pub host_port: String,
    pub host_ip: String,
    pub latency_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FullQueryResult {
    pub motd: String,
    pub gametype: String,
    pub map: String,
    pub player_count: String,
    pub player_max: String,
    pub host_ip: String,
    pub host_port: String,
    /// Every other pair the server sent (`version`, `plugins`, `game_id`, ...)
    /// under its original key, in the order received.
    #[serde(serialize_with = "serialize_pairs")]
    pub extra: Vec<(String, String)>,
    pub players: Vec<String>,
    pub latency_ms: u64,
}

fn serialize_pairs<S: Serializer>(pairs: &[(String, String)], serializer: S) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(pairs.len()))?;
    for (key, value) in pairs {
        map.serialize_entry(key, value)?;
    }
    map.end()
}

impl FullQueryResult {
    /// Looks a value up by its remapped name (`motd`, `player_count`, `ip`,
    /// ...) or, for anything else, by the key the server used.
    pub fn get(&self, key: &str) -> Option<&str> {
        let value = match key {
            "motd" => &self.motd,
            "gametype" => &self.gametype,
            "map" => &self.map,
            "player_count" => &self.player_count,
            "player_max" => &self.player_max,
            "ip" => &self.host_ip,
            "port" => &self.host_port,
            _ => {
                return self
                    .extra
                    .iter()
                    .find(|(k, _)| k == key)
                    .map(|(_, v)| v.as_str())
            }
        };
        Some(value.as_str())
    }

    pub fn version(&self) -> Option<&str> {
        self.get("version")
    }

    pub fn plugins(&self) -> Option<&str> {
        self.get("plugins")
    }

    fn insert(&mut self, key: &str, value: String) {
        match remap_key(key) {
            "motd" => self.motd = value,
            "gametype" => self.gametype = value,
            "map" => self.map = value,
            "player_count" => self.player_count = value,
            "player_max" => self.player_max = value,
            "ip" => self.host_ip = value,
            "port" => self.host_port = value,
            other => match self.extra.iter_mut().find(|(k, _)| k == other) {
                Some(entry) => entry.1 = value,
                None => self.extra.push((other.to_string(), value)),
            },
        }
    }
}

/// Renames the full stat keys that have a friendlier name; everything else
/// passes through untouched.
pub fn remap_key(key: &str) -> &str {
    match key {
        "numplayers" => "player_count",
        "maxplayers" => "player_max",
        "hostname" => "motd",
        "hostip" => "ip",
        "hostport" => "port",
        other => other,
    }
}

/// A fresh random session id with the framing-safe mask applied.
pub fn make_session_id() -> u32 {
    rand::thread_rng().gen_range(1..=u32::MAX) & SESSION_ID_MASK
}

/// Magic, packet type, session id, then each field as a big-endian u32.
pub fn write_packet(packet_type: u8, session_id: u32, fields: &[u32]) -> Vec<u8> {
    let mut packet = QUERY_MAGIC.to_vec();
    packet.push(packet_type);
    pack::<BigEndian, u32>(&mut packet, session_id);
    for field in fields {
        pack::<BigEndian, u32>(&mut packet, *field);
    }
    packet
}

/// Checks that a response starts with the expected type and echoes our
/// session id.
pub fn validate_header(response: &[u8], packet_type: u8, session_id: u32) -> Result<(), ProbeError> {
    if response.len() < 5 {
        return Err(ProbeError::MalformedResponse(format!(
            "response header is {} bytes long",
            response.len()
        )));
    }
    if response[0] != packet_type {
        warn!("query response has type {}, expected {}", response[0], packet_type);
        return Err(ProbeError::MalformedResponse(format!(
            "received packet type {}, expected {}",
            response[0], packet_type
        )));
    }
    let echoed = unpack::<BigEndian, u32>(&response[1..5])?;
    if echoed != session_id {
        warn!("query response for session {:#010x}, expected {:#010x}", echoed, session_id);
        return Err(ProbeError::MalformedResponse(format!(
            "session id {:#010x} does not match {:#010x}",
            echoed, session_id
        )));
    }
    Ok(())
}

/// Reads the decimal challenge token that follows a handshake header. The last
/// byte of the response is its terminator.
///
/// Servers print the token as a signed integer; it is sent back as the same
/// 32 bits.
pub fn parse_challenge_token(response: &[u8]) -> Result<u32, ProbeError> {
    let digits = response
        .get(5..response.len().saturating_sub(1))
        .ok_or_else(|| ProbeError::BadChallengeToken("missing".to_string()))?;
    let text = std::str::from_utf8(digits)
        .map_err(|_| ProbeError::BadChallengeToken(format!("{:02x?}", digits)))?
        .trim();

    text.parse::<i32>()
        .map(|token| token as u32)
        .or_else(|_| text.parse::<u32>())
        .map_err(|_| ProbeError::BadChallengeToken(format!("{:?}", text)))
}

/// Parses a basic stat body: five strings, the port as little-endian u16, and
/// the host ip.
pub fn parse_basic_stat(reader: &mut impl Read, latency_ms: u64) -> Result<BasicQueryResult, ProbeError> {
    let mut strings = read_null_terminated_strings(reader, 5)?.into_iter();
    let mut next = || strings.next().unwrap_or_default();
    let (motd, gametype, map, player_count, player_max) = (next(), next(), next(), next(), next());

    let mut port = [0; 2];
    reader.read_exact(&mut port)?;
    let host_port = unpack::<LittleEndian, u16>(&port)?;

    let host_ip = read_null_terminated_strings(reader, 1)?.pop().unwrap_or_default();

    Ok(BasicQueryResult {
        motd,
        gametype,
        map,
        player_count,
        player_max,
        host_port: host_port.to_string(),
        host_ip,
        latency_ms,
    })
}

/// Parses a framed full stat body (see [`ResponseFramer`]) into its key/value
/// pairs and player list.
pub fn parse_full_stat(raw: &[u8], latency_ms: u64) -> Result<FullQueryResult, ProbeError> {
    let (pairs, players) = split_sections(raw).ok_or_else(|| {
        ProbeError::MalformedResponse("full stat has no player section".to_string())
    })?;

    let mut result = FullQueryResult {
        latency_ms,
        ..Default::default()
    };

    let tokens = pairs.split(|b| *b == 0).collect::<Vec<_>>();
    for pair in tokens.chunks(2) {
        if let [key, value] = pair {
            let key = String::from_utf8_lossy(key);
            result.insert(&key, String::from_utf8_lossy(value).into_owned());
        }
    }

    let players = players.strip_suffix(&[0]).unwrap_or(players);
    let mut names = players
        .split(|b| *b == 0)
        .map(|name| String::from_utf8_lossy(name).into_owned())
        .collect::<Vec<_>>();
    if names.last().map_or(false, |name| name.is_empty()) {
        names.pop();
    }
    result.players = names;

    Ok(result)
}

/// An answered handshake, still holding the socket the stat request must use.
pub struct Handshake {
    pub connection: Connection,
    pub session_id: u32,
    pub challenge_token: u32,
    pub latency_ms: u64,
}

impl fmt::Debug for Handshake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handshake")
            .field("session_id", &format_args!("{:#010x}", self.session_id))
            .field("challenge_token", &self.challenge_token)
            .field("latency_ms", &self.latency_ms)
            .finish_non_exhaustive()
    }
}

pub struct QueryClient<'a> {
    pub provider: &'a dyn TransportProvider,
    pub timeout: Duration,
    pub read_buffer: usize,
}

impl<'a> QueryClient<'a> {
    pub fn new(provider: &'a dyn TransportProvider, config: &ProbeConfig) -> Self {
        QueryClient {
            provider,
            timeout: config.timeout,
            read_buffer: config.read_buffer,
        }
    }

    /// Opens a socket, sends a handshake under a new session id and reads the
    /// challenge token. The round trip is the latency reported for the stat.
    pub fn perform_handshake(&self, target: &Target) -> Result<Handshake, ProbeError> {
        let session_id = make_session_id();
        let mut connection =
            Connection::open(self.provider, target, TransportKind::Datagram, self.timeout)?;

        let start = Instant::now();
        connection.send(&write_packet(HANDSHAKE_TYPE, session_id, &[]))?;
        let response = connection.receive(self.read_buffer)?;
        let latency_ms = start.elapsed().as_millis() as u64;

        validate_header(&response, HANDSHAKE_TYPE, session_id)?;
        let challenge_token = parse_challenge_token(&response)?;
        debug!(
            "query handshake with {} took {}ms, session {:#010x}",
            target, latency_ms, session_id
        );

        Ok(Handshake {
            connection,
            session_id,
            challenge_token,
            latency_ms,
        })
    }

    pub fn basic_query(&self, target: &Target) -> Result<BasicQueryResult, ProbeError> {
        let mut handshake = self.perform_handshake(target)?;
        let request = write_packet(STAT_TYPE, handshake.session_id, &[handshake.challenge_token]);
        handshake.connection.send(&request)?;

        // the basic stat always fits one datagram
        let datagram = handshake.connection.receive(self.read_buffer)?;
        let mut body = datagram.as_slice();
        read_stat_header(&mut body, handshake.session_id)?;
        parse_basic_stat(&mut body, handshake.latency_ms)
    }

    pub fn full_query(&self, target: &Target) -> Result<FullQueryResult, ProbeError> {
        let mut handshake = self.perform_handshake(target)?;
        // the trailing zero asks for the full stat
        let request = write_packet(
            STAT_TYPE,
            handshake.session_id,
            &[handshake.challenge_token, 0],
        );
        handshake.connection.send(&request)?;

        let mut reader = handshake.connection.datagrams();
        read_stat_header(&mut reader, handshake.session_id)?;
        let mut padding = [0; FULL_STAT_PADDING_LEN];
        reader.read_exact(&mut padding)?;

        let framed = ResponseFramer::new().read_from(&mut reader)?;
        debug!("full stat from {} is {} bytes", target, framed.as_bytes().len());
        parse_full_stat(framed.as_bytes(), handshake.latency_ms)
    }
}

fn read_stat_header(reader: &mut impl Read, session_id: u32) -> Result<(), ProbeError> {
    let mut header = [0; 5];
    reader.read_exact(&mut header)?;
    validate_header(&header, STAT_TYPE, session_id)
}

pub struct BasicQueryPinger<'a>(pub QueryClient<'a>);

impl Pinger for BasicQueryPinger<'_> {
    type Data = BasicQueryResult;

    type Error = ProbeError;

    fn ping(&self, target: &Target) -> std::result::Result<Self::Data, Self::Error> {
        self.0.basic_query(target)
    }
}

pub struct FullQueryPinger<'a>(pub QueryClient<'a>);

impl Pinger for FullQueryPinger<'_> {
    type Data = FullQueryResult;

    type Error = ProbeError;

    fn ping(&self, target: &Target) -> std::result::Result<Self::Data, Self::Error> {
        self.0.full_query(target)
    }
}
