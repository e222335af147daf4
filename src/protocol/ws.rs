//! Websocket transport
//!
//! A worker thread owns the socket. Outbound text goes to it through a channel
//! and everything it observes comes back as [`TransportEvent`]s, so the tick
//! loop only ever does non-blocking channel operations.

use std::io;
use std::net::{TcpStream, ToSocketAddrs};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use tracing::debug;
use tungstenite::client::IntoClientRequest;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};

use super::transport::{Transport, TransportEvent};
use crate::error::BridgeError;

/// How long the worker blocks on a read before checking for outbound messages
const READ_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Upper bound on the TCP connect and on each handshake read or write
const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

enum Outbound {
    Text(String),
    Close,
}

struct Link {
    outbound: Sender<Outbound>,
    events: Receiver<TransportEvent>,
}

/// Websocket client transport, e.g. `ws://localhost:8001`
pub struct WsTransport {
    url: String,
    link: Option<Link>,
}

impl WsTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            link: None,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Transport for WsTransport {
    fn open(&mut self) -> Result<(), BridgeError> {
        self.close();

        let (out_tx, out_rx) = unbounded();
        let (event_tx, event_rx) = unbounded();
        let url = self.url.clone();
        thread::Builder::new()
            .name("vts-socket".to_string())
            .spawn(move || run_socket(&url, event_tx, out_rx))?;

        debug!(url = %self.url, "socket worker started");
        self.link = Some(Link {
            outbound: out_tx,
            events: event_rx,
        });
        Ok(())
    }

    fn send(&mut self, text: String) -> Result<(), BridgeError> {
        let link = self
            .link
            .as_ref()
            .ok_or_else(|| BridgeError::Transport("connection is not open".to_string()))?;
        link.outbound
            .send(Outbound::Text(text))
            .map_err(|_| BridgeError::Transport("socket worker stopped".to_string()))
    }

    fn poll_events(&mut self) -> Vec<TransportEvent> {
        match &self.link {
            Some(link) => link.events.try_iter().collect(),
            None => Vec::new(),
        }
    }

    /// Ask the worker to close the socket and detach from it without waiting.
    /// A worker still connecting exits once it sees both channels dropped.
    fn close(&mut self) {
        if let Some(link) = self.link.take() {
            let _ = link.outbound.send(Outbound::Close);
            debug!(url = %self.url, "socket worker detached");
        }
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.close();
    }
}

fn run_socket(url: &str, events: Sender<TransportEvent>, outbound: Receiver<Outbound>) {
    let mut socket = match connect(url) {
        Ok(socket) => socket,
        Err(e) => {
            let _ = events.send(TransportEvent::Error(e));
            return;
        }
    };

    if events.send(TransportEvent::Opened).is_err() {
        let _ = socket.close(None);
        return;
    }

    loop {
        loop {
            match outbound.try_recv() {
                Ok(Outbound::Text(text)) => {
                    if let Err(e) = socket.send(Message::Text(text)) {
                        let _ = events.send(TransportEvent::Error(e.to_string()));
                        return;
                    }
                }
                Ok(Outbound::Close) | Err(TryRecvError::Disconnected) => {
                    let _ = socket.close(None);
                    let _ = socket.flush();
                    return;
                }
                Err(TryRecvError::Empty) => break,
            }
        }

        let event = match socket.read() {
            Ok(Message::Text(text)) => TransportEvent::Message(text),
            Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                Ok(text) => TransportEvent::Message(text),
                Err(_) => {
                    debug!("dropping non-UTF-8 binary frame");
                    continue;
                }
            },
            Ok(Message::Close(_)) => {
                let _ = events.send(TransportEvent::Closed);
                return;
            }
            Ok(_) => continue,
            Err(tungstenite::Error::Io(e))
                if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) =>
            {
                continue
            }
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                let _ = events.send(TransportEvent::Closed);
                return;
            }
            Err(e) => {
                let _ = events.send(TransportEvent::Error(e.to_string()));
                return;
            }
        };

        if events.send(event).is_err() {
            let _ = socket.close(None);
            return;
        }
    }
}

/// Plain `ws://` handshake with the TCP connect and the handshake bounded by
/// [`CONNECT_TIMEOUT`]
fn connect(url: &str) -> Result<Socket, String> {
    let request = url.into_client_request().map_err(|e| e.to_string())?;
    let uri = request.uri();
    if uri.scheme_str() != Some("ws") {
        return Err(format!("unsupported websocket url: {url}"));
    }
    let host = uri
        .host()
        .ok_or_else(|| format!("missing host in {url}"))?
        .trim_start_matches('[')
        .trim_end_matches(']');
    let port = uri.port_u16().unwrap_or(80);

    let addrs = (host, port).to_socket_addrs().map_err(|e| e.to_string())?;
    let mut last_error = format!("no address for {host}:{port}");
    let mut stream = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT) {
            Ok(s) => {
                stream = Some(s);
                break;
            }
            Err(e) => last_error = e.to_string(),
        }
    }
    let stream = stream.ok_or(last_error)?;
    stream
        .set_read_timeout(Some(CONNECT_TIMEOUT))
        .and_then(|_| stream.set_write_timeout(Some(CONNECT_TIMEOUT)))
        .and_then(|_| stream.set_nodelay(true))
        .map_err(|e| e.to_string())?;

    let (socket, _response) = tungstenite::client(request, MaybeTlsStream::Plain(stream))
        .map_err(|e| format!("websocket handshake failed: {e}"))?;

    set_read_timeout(&socket).map_err(|e| e.to_string())?;
    Ok(socket)
}

fn set_read_timeout(socket: &Socket) -> io::Result<()> {
    match socket.get_ref() {
        MaybeTlsStream::Plain(stream) => stream.set_read_timeout(Some(READ_POLL_INTERVAL)),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_before_open_fails() {
        let mut transport = WsTransport::new("ws://127.0.0.1:1");
        assert!(matches!(
            transport.send("x".to_string()),
            Err(BridgeError::Transport(_))
        ));
        assert!(transport.poll_events().is_empty());
    }

    #[test]
    fn test_close_does_not_wait_for_stalled_handshake() {
        use std::net::TcpListener;
        use std::time::Instant;

        // Accepts the TCP connection but never answers the upgrade
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let mut transport = WsTransport::new(format!("ws://127.0.0.1:{port}"));
        transport.open().unwrap();
        let (_peer, _) = listener.accept().unwrap();

        let started = Instant::now();
        transport.close();
        assert!(started.elapsed() < Duration::from_millis(500));
        assert!(transport.poll_events().is_empty());
        assert!(matches!(
            transport.send("x".to_string()),
            Err(BridgeError::Transport(_))
        ));
    }

    #[test]
    fn test_stalled_handshake_reports_error() {
        use std::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let mut transport = WsTransport::new(format!("ws://127.0.0.1:{port}"));
        transport.open().unwrap();
        let (_peer, _) = listener.accept().unwrap();

        let link = transport.link.as_ref().unwrap();
        let event = link
            .events
            .recv_timeout(CONNECT_TIMEOUT + Duration::from_secs(2))
            .unwrap();
        assert!(matches!(event, TransportEvent::Error(_)));
    }

    #[test]
    fn test_rejects_secure_url() {
        assert!(connect("wss://127.0.0.1:8001").is_err());
    }
}
