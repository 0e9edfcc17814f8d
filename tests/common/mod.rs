//! In-memory transports that replay scripted server replies.

#![allow(dead_code)]

use std::{collections::VecDeque, io, sync::Arc, time::Duration};

use parking_lot::Mutex;

use mcstat::{
    pinging::ProbeError,
    target::Target,
    transport::{Transport, TransportKind, TransportProvider},
};

/// Builds a reply from the last packet the client sent.
pub type Responder = Box<dyn Fn(&[u8]) -> Vec<u8> + Send>;

pub enum Reply {
    Respond(Responder),
    Timeout,
}

#[derive(Default)]
pub struct Recorded {
    /// One reply script per connection, consumed in order.
    pending: VecDeque<Vec<Reply>>,
    pub opened: Vec<TransportKind>,
    pub sent: Vec<Vec<u8>>,
    pub closed: usize,
}

#[derive(Clone, Default)]
pub struct ScriptedProvider {
    pub state: Arc<Mutex<Recorded>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the replies for the next connection to be opened.
    pub fn connection(self, replies: Vec<Reply>) -> Self {
        self.state.lock().pending.push_back(replies);
        self
    }

    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.state.lock().sent.clone()
    }

    pub fn opened(&self) -> Vec<TransportKind> {
        self.state.lock().opened.clone()
    }

    pub fn closed(&self) -> usize {
        self.state.lock().closed
    }
}

impl TransportProvider for ScriptedProvider {
    fn open(
        &self,
        _target: &Target,
        kind: TransportKind,
        _timeout: Duration,
    ) -> Result<Box<dyn Transport>, ProbeError> {
        let mut state = self.state.lock();
        let replies = state
            .pending
            .pop_front()
            .ok_or_else(|| ProbeError::ConnectionFailed("connection refused".to_string()))?;
        state.opened.push(kind);
        Ok(Box::new(ScriptedTransport {
            replies: replies.into(),
            last_sent: vec![],
            state: self.state.clone(),
        }))
    }
}

struct ScriptedTransport {
    replies: VecDeque<Reply>,
    last_sent: Vec<u8>,
    state: Arc<Mutex<Recorded>>,
}

impl Transport for ScriptedTransport {
    fn send(&mut self, data: &[u8]) -> io::Result<()> {
        self.last_sent = data.to_vec();
        self.state.lock().sent.push(data.to_vec());
        Ok(())
    }

    fn receive(&mut self, max: usize) -> io::Result<Vec<u8>> {
        match self.replies.pop_front() {
            Some(Reply::Respond(respond)) => {
                let mut data = respond(&self.last_sent);
                data.truncate(max);
                Ok(data)
            }
            Some(Reply::Timeout) | None => {
                Err(io::Error::new(io::ErrorKind::TimedOut, "scripted timeout"))
            }
        }
    }

    fn close(&mut self) -> io::Result<()> {
        self.state.lock().closed += 1;
        Ok(())
    }
}

pub fn fixed(bytes: Vec<u8>) -> Reply {
    Reply::Respond(Box::new(move |_: &[u8]| bytes.clone()))
}

/// Session id bytes of a query request.
pub fn session_of(request: &[u8]) -> [u8; 4] {
    let mut session = [0; 4];
    session.copy_from_slice(&request[3..7]);
    session
}

/// A well-formed handshake answer echoing the client's session id.
pub fn handshake_reply(token: &str) -> Reply {
    let token = token.to_string();
    Reply::Respond(Box::new(move |request: &[u8]| {
        let mut reply = vec![9];
        reply.extend_from_slice(&session_of(request));
        reply.extend_from_slice(token.as_bytes());
        reply.push(0);
        reply
    }))
}

/// A stat answer echoing the client's session id.
pub fn stat_reply(body: Vec<u8>) -> Reply {
    Reply::Respond(Box::new(move |request: &[u8]| {
        let mut reply = vec![0];
        reply.extend_from_slice(&session_of(request));
        reply.extend_from_slice(&body);
        reply
    }))
}

/// A legacy ping kick packet carrying `fields` separated by wide NULs.
pub fn ping_reply(fields: &[&str]) -> Vec<u8> {
    let units = fields.join("\0").encode_utf16().collect::<Vec<_>>();
    let mut reply = vec![0xFF];
    reply.extend_from_slice(&(units.len() as u16).to_be_bytes());
    for unit in units {
        reply.extend_from_slice(&unit.to_be_bytes());
    }
    reply
}

pub fn basic_stat_body(strings: &[&str], port: u16, ip: &str) -> Vec<u8> {
    let mut body = vec![];
    for s in strings {
        body.extend_from_slice(s.as_bytes());
        body.push(0);
    }
    body.extend_from_slice(&port.to_le_bytes());
    body.extend_from_slice(ip.as_bytes());
    body.push(0);
    body
}

/// A full stat body as vanilla servers lay it out, padding included.
pub fn full_stat_body(pairs: &[(&str, &str)], players: &[&str]) -> Vec<u8> {
    let mut body = b"splitnum\0\x80\0".to_vec();
    for (key, value) in pairs {
        body.extend_from_slice(key.as_bytes());
        body.push(0);
        body.extend_from_slice(value.as_bytes());
        body.push(0);
    }
    body.push(0);
    body.extend_from_slice(b"\x01player_\0\0");
    for player in players {
        body.extend_from_slice(player.as_bytes());
        body.push(0);
    }
    body.push(0);
    body
}

pub const VANILLA_PAIRS: [(&str, &str); 10] = [
    ("hostname", "A Server"),
    ("gametype", "SMP"),
    ("game_id", "MINECRAFT"),
    ("version", "1.8.9"),
    ("plugins", ""),
    ("map", "world"),
    ("numplayers", "2"),
    ("maxplayers", "20"),
    ("hostport", "25565"),
    ("hostip", "203.0.113.5"),
];
