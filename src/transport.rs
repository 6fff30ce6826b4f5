/// Blocking TCP transport used by every provider.
///
/// All reads share one deadline, fixed when the connection is opened from the
/// timeout given to `connect`. Nothing in
/// here retries; retry policy belongs to the updater. Sockets are closed when
/// the `Connection` is dropped, so every exit path releases them.
use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Upper bound on how much of a response is kept. Anything past this is dropped.
pub const BUFFER_SIZE: usize = 8192;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("unable to resolve {host}")]
    Resolve { host: String },

    #[error("error connecting to {host}:{port}: {reason}")]
    Connect { host: String, port: u16, reason: String },

    #[error("timed out talking to server")]
    Timeout,

    #[error("i/o error: {0}")]
    Io(String),
}

impl From<io::Error> for TransportError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TransportError::Timeout,
            _ => TransportError::Io(e.to_string()),
        }
    }
}

/// Opens connections to a provider's server.
pub trait Transport {
    fn connect(&self, host: &str, port: u16, timeout: Duration) -> Result<Box<dyn Connection>, TransportError>;
}

/// An open, timeout-bounded connection.
pub trait Connection {
    /// Write the whole buffer, returning the number of bytes written.
    fn send(&mut self, data: &[u8]) -> Result<usize, TransportError>;

    /// Read a single `\n`-terminated line (terminator stripped). Used by the
    /// line-oriented protocols which need one reply per command.
    fn receive_line(&mut self) -> Result<String, TransportError>;

    /// Read until the peer closes the connection or the timeout elapses.
    ///
    /// Returns whatever arrived, truncated to [`BUFFER_SIZE`]. A timeout is only
    /// an error when nothing at all was received.
    fn receive_all(&mut self) -> Result<Vec<u8>, TransportError>;
}

/// The real thing: `std::net::TcpStream` with read/write timeouts.
pub struct TcpTransport;

impl Transport for TcpTransport {
    fn connect(&self, host: &str, port: u16, timeout: Duration) -> Result<Box<dyn Connection>, TransportError> {
        let addrs: Vec<_> = (host, port)
            .to_socket_addrs()
            .map_err(|_| TransportError::Resolve { host: host.to_string() })?
            .filter(|addr| addr.is_ipv4())
            .collect();

        if addrs.is_empty() {
            return Err(TransportError::Resolve { host: host.to_string() });
        }

        let mut last_error = None;
        for addr in &addrs {
            match TcpStream::connect_timeout(addr, timeout) {
                Ok(stream) => {
                    stream.set_read_timeout(Some(timeout))?;
                    stream.set_write_timeout(Some(timeout))?;
                    log::debug!("connected to {} ({}) on port {}", host, addr.ip(), port);
                    return Ok(Box::new(TcpConnection {
                        reader: BufReader::new(stream),
                        deadline: Instant::now() + timeout,
                    }));
                }
                Err(e) => {
                    log::debug!("connect to {} failed: {}", addr, e);
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {
                Err(TransportError::Timeout)
            }
            Some(e) => Err(TransportError::Connect {
                host: host.to_string(),
                port,
                reason: e.to_string(),
            }),
            None => Err(TransportError::Resolve { host: host.to_string() }),
        }
    }
}

struct TcpConnection {
    reader: BufReader<TcpStream>,
    deadline: Instant,
}

impl TcpConnection {
    /// Shrink the socket read timeout to whatever is left before the deadline.
    fn arm(&self) -> io::Result<()> {
        let remaining = self.deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "deadline passed"));
        }
        self.reader.get_ref().set_read_timeout(Some(remaining))
    }
}

impl Read for TcpConnection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.reader.buffer().is_empty() {
            self.arm()?;
        }
        self.reader.read(buf)
    }
}

impl Connection for TcpConnection {
    fn send(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        let stream = self.reader.get_mut();
        stream.write_all(data)?;
        stream.flush()?;
        Ok(data.len())
    }

    fn receive_line(&mut self) -> Result<String, TransportError> {
        let mut line = Vec::new();
        while line.len() < BUFFER_SIZE {
            if self.reader.buffer().is_empty() {
                self.arm()?;
            }
            let available = match self.reader.fill_buf() {
                Ok(available) => available,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            if available.is_empty() {
                if line.is_empty() {
                    return Err(TransportError::Io("connection closed by server".to_string()));
                }
                break;
            }

            let room = BUFFER_SIZE - line.len();
            let (used, done) = match available.iter().position(|&b| b == b'\n') {
                Some(end) => ((end + 1).min(room), end < room),
                None => (available.len().min(room), false),
            };
            line.extend_from_slice(&available[..used]);
            self.reader.consume(used);
            if done {
                break;
            }
        }
        let line = String::from_utf8_lossy(&line);
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    fn receive_all(&mut self) -> Result<Vec<u8>, TransportError> {
        read_bounded(self)
    }
}

/// Accumulate everything `source` yields into a buffer of at most
/// [`BUFFER_SIZE`] bytes.
fn read_bounded<R: Read>(source: &mut R) -> Result<Vec<u8>, TransportError> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];

    loop {
        match source.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                let room = BUFFER_SIZE - buf.len();
                buf.extend_from_slice(&chunk[..n.min(room)]);
                if buf.len() >= BUFFER_SIZE {
                    log::debug!("response exceeds {} bytes, truncating", BUFFER_SIZE);
                    break;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                let err = TransportError::from(e);
                if err == TransportError::Timeout && !buf.is_empty() {
                    break;
                }
                return Err(err);
            }
        }
    }

    log::debug!("received {} bytes", buf.len());
    Ok(buf)
}

#[cfg(test)]
pub mod mock {
    //! Scripted transport for provider and updater tests.
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::rc::Rc;

    enum Script {
        Reply(Vec<u8>),
        Fail(TransportError),
    }

    /// Each `connect` consumes the next scripted entry. Once the script is
    /// exhausted further connects are refused.
    pub struct MockTransport {
        script: RefCell<VecDeque<Script>>,
        repeat_failure: Option<TransportError>,
        connects: Cell<usize>,
        sent: Rc<RefCell<Vec<u8>>>,
    }

    impl MockTransport {
        /// One connection per element, each replying with the given bytes.
        pub fn replying(replies: &[&str]) -> Self {
            Self {
                script: RefCell::new(replies.iter().map(|r| Script::Reply(r.as_bytes().to_vec())).collect()),
                repeat_failure: None,
                connects: Cell::new(0),
                sent: Rc::new(RefCell::new(Vec::new())),
            }
        }

        /// Every connect attempt fails with `error`.
        pub fn failing(error: TransportError) -> Self {
            Self {
                script: RefCell::new(VecDeque::new()),
                repeat_failure: Some(error),
                connects: Cell::new(0),
                sent: Rc::new(RefCell::new(Vec::new())),
            }
        }

        /// Queue a failure ahead of whatever is scripted next.
        pub fn then_fail(self, error: TransportError) -> Self {
            self.script.borrow_mut().push_back(Script::Fail(error));
            self
        }

        pub fn then_reply(self, reply: &str) -> Self {
            self.script.borrow_mut().push_back(Script::Reply(reply.as_bytes().to_vec()));
            self
        }

        pub fn connects(&self) -> usize {
            self.connects.get()
        }

        /// Everything written over all connections.
        pub fn sent(&self) -> String {
            String::from_utf8_lossy(&self.sent.borrow()).into_owned()
        }
    }

    impl Transport for MockTransport {
        fn connect(&self, host: &str, port: u16, _timeout: Duration) -> Result<Box<dyn Connection>, TransportError> {
            self.connects.set(self.connects.get() + 1);
            if let Some(err) = &self.repeat_failure {
                return Err(err.clone());
            }
            match self.script.borrow_mut().pop_front() {
                Some(Script::Reply(inbound)) => Ok(Box::new(MockConnection {
                    inbound: VecDeque::from(inbound),
                    sent: Rc::clone(&self.sent),
                })),
                Some(Script::Fail(err)) => Err(err),
                None => Err(TransportError::Connect {
                    host: host.to_string(),
                    port,
                    reason: "no scripted reply".to_string(),
                }),
            }
        }
    }

    struct MockConnection {
        inbound: VecDeque<u8>,
        sent: Rc<RefCell<Vec<u8>>>,
    }

    impl Connection for MockConnection {
        fn send(&mut self, data: &[u8]) -> Result<usize, TransportError> {
            self.sent.borrow_mut().extend_from_slice(data);
            Ok(data.len())
        }

        fn receive_line(&mut self) -> Result<String, TransportError> {
            if self.inbound.is_empty() {
                return Err(TransportError::Timeout);
            }
            let mut line = Vec::new();
            while let Some(b) = self.inbound.pop_front() {
                if b == b'\n' {
                    break;
                }
                line.push(b);
            }
            Ok(String::from_utf8_lossy(&line).trim_end_matches('\r').to_string())
        }

        fn receive_all(&mut self) -> Result<Vec<u8>, TransportError> {
            let joined: Vec<u8> = self.inbound.drain(..).collect();
            read_bounded(&mut joined.as_slice())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn test_read_bounded_truncates_large_response() {
        let big = vec![b'x'; BUFFER_SIZE * 2];
        let data = read_bounded(&mut big.as_slice()).unwrap();
        assert_eq!(data.len(), BUFFER_SIZE);
    }

    #[test]
    fn test_read_bounded_small_response() {
        let data = read_bounded(&mut &b"HTTP/1.0 200 OK\r\n\r\n"[..]).unwrap();
        assert_eq!(data, b"HTTP/1.0 200 OK\r\n\r\n");
    }

    #[test]
    fn test_io_error_mapping() {
        let timeout: TransportError = io::Error::new(io::ErrorKind::TimedOut, "t").into();
        assert_eq!(timeout, TransportError::Timeout);
        let would_block: TransportError = io::Error::new(io::ErrorKind::WouldBlock, "w").into();
        assert_eq!(would_block, TransportError::Timeout);
        let reset: TransportError = io::Error::new(io::ErrorKind::ConnectionReset, "r").into();
        assert!(matches!(reset, TransportError::Io(_)));
    }

    #[test]
    fn test_resolve_failure() {
        let result = TcpTransport.connect("does-not-exist.invalid", 80, Duration::from_secs(2));
        assert!(matches!(result, Err(TransportError::Resolve { .. })));
    }

    #[test]
    fn test_tcp_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            assert_eq!(line, "VER 1.0\n");
            stream.write_all(b"OK ready\nHTTP/1.0 200 OK\r\n\r\nbody").unwrap();
        });

        let mut conn = TcpTransport.connect("127.0.0.1", port, Duration::from_secs(5)).unwrap();
        assert_eq!(conn.send(b"VER 1.0\n").unwrap(), 8);
        assert_eq!(conn.receive_line().unwrap(), "OK ready");
        let rest = conn.receive_all().unwrap();
        assert_eq!(rest, b"HTTP/1.0 200 OK\r\n\r\nbody");
        server.join().unwrap();
    }

    /// Server that dribbles one byte every 200 ms for three seconds.
    fn trickle_server() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            for _ in 0..15 {
                if stream.write_all(b"x").is_err() {
                    break;
                }
                thread::sleep(Duration::from_millis(200));
            }
        });
        port
    }

    #[test]
    fn test_receive_all_stops_at_deadline() {
        let port = trickle_server();
        let started = Instant::now();
        let mut conn = TcpTransport.connect("127.0.0.1", port, Duration::from_secs(1)).unwrap();
        let data = conn.receive_all().unwrap();
        let elapsed = started.elapsed();

        assert!(!data.is_empty());
        assert!(data.len() < 15);
        assert!(elapsed < Duration::from_millis(1800), "took {:?}", elapsed);
    }

    #[test]
    fn test_receive_line_stops_at_deadline() {
        let port = trickle_server();
        let started = Instant::now();
        let mut conn = TcpTransport.connect("127.0.0.1", port, Duration::from_secs(1)).unwrap();
        assert_eq!(conn.receive_line(), Err(TransportError::Timeout));
        assert!(started.elapsed() < Duration::from_millis(1800));
    }

    #[test]
    fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = TcpTransport.connect("127.0.0.1", port, Duration::from_secs(2));
        assert!(matches!(result, Err(TransportError::Connect { .. })));
    }
}
