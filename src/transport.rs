//! Pluggable connections for the protocol clients.
//!
//! The clients never touch sockets directly: they ask a [`TransportProvider`]
//! for a connected [`Transport`] and drive it through a [`Connection`], which
//! closes the transport on every exit path.

use std::{
    io::{self, Read, Write},
    net::{Ipv4Addr, Ipv6Addr, SocketAddr, TcpStream, UdpSocket},
    time::Duration,
};

use log::{debug, trace};

use crate::{pinging::ProbeError, resolution::resolve_target, target::Target};

/// Largest payload a single UDP datagram can carry.
pub const MAX_DATAGRAM: usize = 65_507;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Stream,
    Datagram,
}

/// A connected handle to the server.
///
/// Read timeouts must surface as `io::ErrorKind::TimedOut` or `WouldBlock`.
/// For a stream an empty `receive` means the peer closed the connection; for a
/// datagram transport each `receive` returns one datagram.
pub trait Transport: Send {
    fn send(&mut self, data: &[u8]) -> io::Result<()>;

    fn receive(&mut self, max: usize) -> io::Result<Vec<u8>>;

    fn close(&mut self) -> io::Result<()>;
}

pub trait TransportProvider: Send + Sync {
    fn open(
        &self,
        target: &Target,
        kind: TransportKind,
        timeout: Duration,
    ) -> Result<Box<dyn Transport>, ProbeError>;
}

/// Owns an open transport for the length of one exchange.
pub struct Connection {
    inner: Box<dyn Transport>,
}

impl Connection {
    pub fn open(
        provider: &dyn TransportProvider,
        target: &Target,
        kind: TransportKind,
        timeout: Duration,
    ) -> Result<Self, ProbeError> {
        let inner = provider.open(target, kind, timeout)?;
        Ok(Connection { inner })
    }

    pub fn send(&mut self, data: &[u8]) -> Result<(), ProbeError> {
        trace!("sending {:02x?}", data);
        self.inner.send(data).map_err(ProbeError::from_io)
    }

    pub fn receive(&mut self, max: usize) -> Result<Vec<u8>, ProbeError> {
        let data = self.inner.receive(max).map_err(ProbeError::from_io)?;
        trace!("received {:02x?}", data);
        Ok(data)
    }

    /// Keeps receiving until `len` bytes arrived, `max` is reached or the peer
    /// closes the stream.
    pub fn receive_at_least(&mut self, len: usize, max: usize) -> Result<Vec<u8>, ProbeError> {
        let mut data = vec![];
        while data.len() < len.min(max) {
            let chunk = self.receive(max - data.len())?;
            if chunk.is_empty() {
                break;
            }
            data.extend_from_slice(&chunk);
        }
        Ok(data)
    }

    /// Reads the connection as a byte stream made of successive datagrams.
    pub fn datagrams(&mut self) -> DatagramReader<'_> {
        DatagramReader {
            connection: self,
            pending: vec![],
            position: 0,
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Err(e) = self.inner.close() {
            debug!("error closing transport: {}", e);
        }
    }
}

/// `Read` over a datagram transport. Once the current datagram is used up the
/// next one is received, so a read blocks for at most the transport timeout.
/// An empty datagram reads as end of stream.
pub struct DatagramReader<'c> {
    connection: &'c mut Connection,
    pending: Vec<u8>,
    position: usize,
}

impl Read for DatagramReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.position >= self.pending.len() {
            self.pending = self.connection.inner.receive(MAX_DATAGRAM)?;
            self.position = 0;
            trace!("received {:02x?}", self.pending);
            if self.pending.is_empty() {
                return Ok(0);
            }
        }
        let n = buf.len().min(self.pending.len() - self.position);
        buf[..n].copy_from_slice(&self.pending[self.position..self.position + n]);
        self.position += n;
        Ok(n)
    }
}

/// Real sockets from `std::net`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NetTransportProvider;

impl TransportProvider for NetTransportProvider {
    fn open(
        &self,
        target: &Target,
        kind: TransportKind,
        timeout: Duration,
    ) -> Result<Box<dyn Transport>, ProbeError> {
        let addr = resolve_target(target, timeout)?;
        debug!("opening {:?} transport to {} ({})", kind, target, addr);

        let transport: Box<dyn Transport> = match kind {
            TransportKind::Stream => Box::new(TcpTransport::connect(addr, timeout)?),
            TransportKind::Datagram => Box::new(UdpTransport::connect(addr, timeout)?),
        };
        Ok(transport)
    }
}

fn connect_error(err: io::Error) -> ProbeError {
    match err.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => ProbeError::Timeout,
        _ => ProbeError::ConnectionFailed(err.to_string()),
    }
}

pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    pub fn connect(addr: SocketAddr, timeout: Duration) -> Result<Self, ProbeError> {
        let stream = TcpStream::connect_timeout(&addr, timeout).map_err(connect_error)?;
        stream.set_read_timeout(Some(timeout)).map_err(connect_error)?;
        stream.set_write_timeout(Some(timeout)).map_err(connect_error)?;
        Ok(TcpTransport { stream })
    }
}

impl Transport for TcpTransport {
    fn send(&mut self, data: &[u8]) -> io::Result<()> {
        self.stream.write_all(data)?;
        self.stream.flush()
    }

    fn receive(&mut self, max: usize) -> io::Result<Vec<u8>> {
        let mut buf = vec![0; max];
        let read = self.stream.read(&mut buf)?;
        buf.truncate(read);
        Ok(buf)
    }

    fn close(&mut self) -> io::Result<()> {
        match self.stream.shutdown(std::net::Shutdown::Both) {
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }
}

pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    pub fn connect(addr: SocketAddr, timeout: Duration) -> Result<Self, ProbeError> {
        let local = match addr {
            SocketAddr::V4(_) => SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            SocketAddr::V6(_) => SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)),
        };
        let socket = UdpSocket::bind(local).map_err(connect_error)?;
        socket.connect(addr).map_err(connect_error)?;
        socket.set_read_timeout(Some(timeout)).map_err(connect_error)?;
        socket.set_write_timeout(Some(timeout)).map_err(connect_error)?;
        Ok(UdpTransport { socket })
    }
}

impl Transport for UdpTransport {
    fn send(&mut self, data: &[u8]) -> io::Result<()> {
        self.socket.send(data)?;
        Ok(())
    }

    fn receive(&mut self, max: usize) -> io::Result<Vec<u8>> {
        let mut buf = vec![0; max];
        let read = self.socket.recv(&mut buf)?;
        buf.truncate(read);
        Ok(buf)
    }

    fn close(&mut self) -> io::Result<()> {
        // dropping the socket releases it
        Ok(())
    }
}
