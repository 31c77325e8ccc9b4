//! TCP transport
//!
//! The listener is non-blocking so the driver can poll it every tick. Accepted
//! streams are blocking: a send waits for the transport, or for the optional
//! write timeout.

use socket2::{Domain, Protocol, Socket, Type};
use std::io::{self, ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::time::Duration;

use crate::error::NetworkError;
use crate::network::slot::{Link, Listener};

/// Pending connection backlog; only one client is served at a time
const LISTEN_BACKLOG: i32 = 1;

/// Non-blocking TCP listener
pub struct TcpStreamListener {
    listener: TcpListener,
    local_addr: SocketAddr,
    send_timeout: Option<Duration>,
}

impl TcpStreamListener {
    /// Bind and listen on `addr`
    pub fn bind(addr: SocketAddr, send_timeout: Option<Duration>) -> Result<Self, NetworkError> {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
            .map_err(|e| NetworkError::BindFailed(e.to_string()))?;

        socket
            .set_reuse_address(true)
            .map_err(|e| NetworkError::BindFailed(e.to_string()))?;
        socket
            .bind(&addr.into())
            .map_err(|e| NetworkError::BindFailed(format!("{}: {}", addr, e)))?;
        socket
            .listen(LISTEN_BACKLOG)
            .map_err(|e| NetworkError::BindFailed(e.to_string()))?;
        socket
            .set_nonblocking(true)
            .map_err(|e| NetworkError::BindFailed(e.to_string()))?;

        let listener: TcpListener = socket.into();
        let local_addr = listener
            .local_addr()
            .map_err(|e| NetworkError::BindFailed(e.to_string()))?;

        tracing::info!("Listening on {}", local_addr);

        Ok(Self {
            listener,
            local_addr,
            send_timeout,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Listener for TcpStreamListener {
    type Link = TcpLink;

    fn poll_incoming(&mut self) -> Result<Option<TcpLink>, NetworkError> {
        match self.listener.accept() {
            Ok((stream, peer)) => TcpLink::new(stream, peer, self.send_timeout)
                .map(Some)
                .map_err(|e| NetworkError::AcceptFailed(e.to_string())),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(NetworkError::AcceptFailed(e.to_string())),
        }
    }
}

/// Upper bound on reads per liveness check, so a chatty peer cannot stall a tick
const MAX_DRAIN_READS: usize = 64;

/// Write all of `message`. On failure, also reports how many bytes had
/// already been handed to the writer.
fn write_frame<W: Write>(writer: &mut W, message: &[u8]) -> Result<(), (usize, io::Error)> {
    let mut written = 0;

    while written < message.len() {
        match writer.write(&message[written..]) {
            Ok(0) => return Err((written, io::Error::from(ErrorKind::WriteZero))),
            Ok(n) => written += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err((written, e)),
        }
    }

    writer.flush().map_err(|e| (written, e))
}

/// Accepted client stream
pub struct TcpLink {
    stream: TcpStream,
    peer: SocketAddr,
    /// A frame was cut off mid-line; the framing on this stream is lost
    torn: bool,
}

impl TcpLink {
    fn new(stream: TcpStream, peer: SocketAddr, send_timeout: Option<Duration>) -> io::Result<Self> {
        // Accepted sockets may inherit the listener's non-blocking flag
        stream.set_nonblocking(false)?;
        stream.set_nodelay(true)?;
        stream.set_write_timeout(send_timeout)?;

        Ok(Self {
            stream,
            peer,
            torn: false,
        })
    }

    /// Non-blocking check of the read side: EOF means the peer closed
    fn poll_alive(&self) -> io::Result<bool> {
        self.stream.set_nonblocking(true)?;
        let result = self.drain_input();
        self.stream.set_nonblocking(false)?;
        result
    }

    /// Discard anything the client sent; clients never talk back, and unread
    /// input would hide the EOF behind it
    fn drain_input(&self) -> io::Result<bool> {
        let mut scratch = [0u8; 512];

        for _ in 0..MAX_DRAIN_READS {
            match (&self.stream).read(&mut scratch) {
                Ok(0) => return Ok(false),
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(true),
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }

        Ok(true)
    }

    fn record_write_failure(&mut self, written: usize) {
        if written > 0 {
            self.torn = true;
            tracing::warn!(
                "Partial frame ({} bytes) left on the stream to {}; releasing link",
                written,
                self.peer
            );
        }
    }
}

impl Link for TcpLink {
    fn is_connected(&self) -> bool {
        if self.torn {
            return false;
        }

        match self.poll_alive() {
            Ok(connected) => connected,
            Err(e) => {
                tracing::debug!("Liveness check of {} failed: {}", self.peer, e);
                false
            }
        }
    }

    fn send(&mut self, message: &[u8]) -> Result<(), NetworkError> {
        write_frame(&mut self.stream, message).map_err(|(written, e)| {
            self.record_write_failure(written);
            NetworkError::WriteError(e.to_string())
        })
    }

    fn peer(&self) -> String {
        self.peer.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader};
    use std::thread;
    use std::time::Instant;

    fn loopback() -> TcpStreamListener {
        TcpStreamListener::bind("127.0.0.1:0".parse().unwrap(), None).unwrap()
    }

    fn accept_within(listener: &mut TcpStreamListener, limit: Duration) -> Option<TcpLink> {
        let start = Instant::now();
        while start.elapsed() < limit {
            if let Some(link) = listener.poll_incoming().unwrap() {
                return Some(link);
            }
            thread::sleep(Duration::from_millis(5));
        }
        None
    }

    #[test]
    fn test_poll_without_client() {
        let mut listener = loopback();
        assert!(listener.poll_incoming().unwrap().is_none());
    }

    #[test]
    fn test_send_line_to_client() {
        let mut listener = loopback();
        let client = TcpStream::connect(listener.local_addr()).unwrap();

        let mut link = accept_within(&mut listener, Duration::from_secs(2)).unwrap();
        assert!(link.is_connected());
        link.send(b"{\"audio_data\":[1,2,3]}\n").unwrap();

        let mut line = String::new();
        BufReader::new(client).read_line(&mut line).unwrap();
        assert_eq!(line, "{\"audio_data\":[1,2,3]}\n");
    }

    #[test]
    fn test_detects_closed_peer() {
        let mut listener = loopback();
        let client = TcpStream::connect(listener.local_addr()).unwrap();
        let link = accept_within(&mut listener, Duration::from_secs(2)).unwrap();

        drop(client);

        let start = Instant::now();
        while link.is_connected() && start.elapsed() < Duration::from_secs(2) {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(!link.is_connected());
    }

    #[test]
    fn test_detects_closed_peer_with_unread_input() {
        let mut listener = loopback();
        let mut client = TcpStream::connect(listener.local_addr()).unwrap();
        let mut link = accept_within(&mut listener, Duration::from_secs(2)).unwrap();

        client.write_all(b"hello\n").unwrap();
        drop(client);

        let start = Instant::now();
        while link.is_connected() && start.elapsed() < Duration::from_secs(2) {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(!link.is_connected());

        // Sends to the dead peer fail; the link keeps reporting disconnected
        let frame = vec![b'0'; 4096];
        for _ in 0..20 {
            let _ = link.send(&frame);
            thread::sleep(Duration::from_millis(5));
        }
        assert!(!link.is_connected());
    }

    #[test]
    fn test_client_input_does_not_end_link() {
        let mut listener = loopback();
        let mut client = TcpStream::connect(listener.local_addr()).unwrap();
        let link = accept_within(&mut listener, Duration::from_secs(2)).unwrap();

        client.write_all(b"ping\n").unwrap();
        thread::sleep(Duration::from_millis(20));

        assert!(link.is_connected());
        assert!(link.is_connected());
    }

    #[test]
    fn test_partial_write_releases_link() {
        let mut listener = loopback();
        let _client = TcpStream::connect(listener.local_addr()).unwrap();
        let mut link = accept_within(&mut listener, Duration::from_secs(2)).unwrap();

        link.record_write_failure(0);
        assert!(link.is_connected());

        link.record_write_failure(100);
        assert!(!link.is_connected());
    }

    /// Accepts `limit` bytes, then times out
    struct StallingWriter {
        accepted: Vec<u8>,
        limit: usize,
    }

    impl Write for StallingWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let room = self.limit - self.accepted.len();
            if room == 0 {
                return Err(io::Error::from(ErrorKind::WouldBlock));
            }
            let n = room.min(buf.len()).min(3);
            self.accepted.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_write_frame_reports_bytes_written() {
        let mut writer = StallingWriter {
            accepted: Vec::new(),
            limit: 7,
        };
        let (written, e) = write_frame(&mut writer, b"1,2,3,4,5\n").unwrap_err();
        assert_eq!(written, 7);
        assert_eq!(e.kind(), ErrorKind::WouldBlock);
        assert_eq!(writer.accepted, b"1,2,3,4");

        let mut writer = StallingWriter {
            accepted: Vec::new(),
            limit: 64,
        };
        write_frame(&mut writer, b"1,2,3,4,5\n").unwrap();
        assert_eq!(writer.accepted, b"1,2,3,4,5\n");
    }
}
