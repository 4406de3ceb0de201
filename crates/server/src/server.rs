//! TCP server for the crosswalk wire protocol.
//!
//! Binds the configured address and handles JSONL messages, one thread per
//! connection. The first message on every connection must be `hello`
//! carrying the shared-secret token.

use std::io::{self, BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crosswalk_protocol::*;
use crosswalk_store::StoreError;

use crate::service::LinkingService;

/// Maximum concurrent connections. Prevents resource exhaustion from runaway
/// sync jobs.
pub const MAX_CONNECTIONS: usize = 8;

/// Maximum consecutive parse failures before disconnecting a client.
const MAX_PARSE_FAILURES: u32 = 3;

/// Wire-level failures mapped to stable error codes.
#[derive(Debug)]
pub enum ProtocolError {
    /// Invalid or missing token.
    AuthFailed,
    /// Unsupported protocol version.
    ProtocolMismatch,
    /// Message too large.
    MessageTooLarge,
    /// Malformed JSON.
    MalformedMessage,
    /// Hello after the handshake completed.
    AlreadyAuthenticated,
    /// Store failure, surfaced verbatim.
    Internal(StoreError),
}

impl ProtocolError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::AuthFailed => "auth_failed",
            Self::ProtocolMismatch => "protocol_mismatch",
            Self::MessageTooLarge => "message_too_large",
            Self::MalformedMessage => "malformed_message",
            Self::AlreadyAuthenticated => "already_authenticated",
            Self::Internal(_) => "internal_error",
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::AuthFailed => "Invalid or missing authentication token".to_string(),
            Self::ProtocolMismatch => "Unsupported protocol version".to_string(),
            Self::MessageTooLarge => "Message exceeds maximum size".to_string(),
            Self::MalformedMessage => "Malformed JSON message".to_string(),
            Self::AlreadyAuthenticated => "Already authenticated".to_string(),
            Self::Internal(e) => e.to_string(),
        }
    }

    pub fn to_error_response(&self, id: Option<String>) -> ErrorResponse {
        ErrorResponse {
            id,
            code: self.code().to_string(),
            message: self.message(),
        }
    }
}

/// The link server - manages the TCP listener and client connections.
pub struct LinkServer {
    listener_handle: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    bound_addr: Option<SocketAddr>,
    connections: Arc<AtomicUsize>,
}

impl LinkServer {
    /// Create a new server (not started).
    pub fn new() -> Self {
        Self {
            listener_handle: None,
            shutdown: Arc::new(AtomicBool::new(false)),
            bound_addr: None,
            connections: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Bind `listen` and start serving. Pass port 0 to bind an ephemeral
    /// port (tests); the bound address is available from `bound_addr`.
    pub fn start(
        &mut self,
        listen: &str,
        token: String,
        service: Arc<LinkingService>,
    ) -> io::Result<()> {
        if self.is_running() {
            return Ok(());
        }

        self.shutdown.store(false, Ordering::SeqCst);

        let listener = TcpListener::bind(listen)?;
        let addr = listener.local_addr()?;
        self.bound_addr = Some(addr);

        // Non-blocking so the accept loop can check the shutdown flag.
        listener.set_nonblocking(true)?;

        let shutdown = Arc::clone(&self.shutdown);
        let connections = Arc::clone(&self.connections);
        self.listener_handle = Some(thread::spawn(move || {
            run_listener(listener, shutdown, token, service, connections);
        }));

        log::info!("link server started on {addr}");
        Ok(())
    }

    /// Stop the server. Connection threads drain on their next read timeout.
    pub fn stop(&mut self) {
        if !self.is_running() {
            return;
        }

        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.listener_handle.take() {
            let _ = handle.join();
        }
        self.bound_addr = None;

        log::info!("link server stopped");
    }

    pub fn is_running(&self) -> bool {
        self.listener_handle.is_some() && !self.shutdown.load(Ordering::SeqCst)
    }

    /// Bound address (if running).
    pub fn bound_addr(&self) -> Option<SocketAddr> {
        self.bound_addr
    }

    /// Number of connected clients.
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

impl Default for LinkServer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for LinkServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Accept loop, run on its own thread.
fn run_listener(
    listener: TcpListener,
    shutdown: Arc<AtomicBool>,
    token: String,
    service: Arc<LinkingService>,
    connections: Arc<AtomicUsize>,
) {
    while !shutdown.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, addr)) => {
                if connections.load(Ordering::SeqCst) >= MAX_CONNECTIONS {
                    log::warn!("connection refused from {addr}: limit of {MAX_CONNECTIONS} reached");
                    drop(stream);
                    continue;
                }

                log::debug!("accepted connection from {addr}");
                connections.fetch_add(1, Ordering::SeqCst);
                let token = token.clone();
                let service = Arc::clone(&service);
                let shutdown = Arc::clone(&shutdown);
                let connections = Arc::clone(&connections);

                thread::spawn(move || {
                    let result = handle_connection(stream, &shutdown, &token, &service);
                    connections.fetch_sub(1, Ordering::SeqCst);
                    if let Err(e) = result {
                        log::warn!("connection error from {addr}: {e}");
                    }
                });
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(50));
            }
            Err(e) => {
                log::error!("accept error: {e}");
                break;
            }
        }
    }
}

/// Handle a single client connection.
fn handle_connection(
    mut stream: TcpStream,
    shutdown: &AtomicBool,
    expected_token: &str,
    service: &LinkingService,
) -> io::Result<()> {
    // Short read timeout so the thread notices a shutdown while idle.
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(Duration::from_millis(200)))?;
    stream.set_write_timeout(Some(Duration::from_secs(10)))?;

    let reader = BufReader::new(stream.try_clone()?);
    let mut lines = reader.lines();
    let mut authenticated = false;
    let mut parse_failures: u32 = 0;

    loop {
        if shutdown.load(Ordering::SeqCst) {
            return Ok(());
        }

        let line = match lines.next() {
            Some(Ok(line)) => line,
            Some(Err(ref e)) if e.kind() == io::ErrorKind::WouldBlock => continue,
            Some(Err(ref e)) if e.kind() == io::ErrorKind::TimedOut => continue,
            Some(Err(e)) => return Err(e),
            None => return Ok(()), // Connection closed
        };

        if line.len() > MAX_MESSAGE_SIZE {
            send_error(&mut stream, None, &ProtocolError::MessageTooLarge)?;
            log::warn!("client sent oversized message ({} bytes), disconnecting", line.len());
            return Ok(());
        }

        let msg: ClientRequest = match serde_json::from_str(&line) {
            Ok(m) => {
                parse_failures = 0;
                m
            }
            Err(e) => {
                parse_failures += 1;
                log::debug!("malformed message ({parse_failures}/{MAX_PARSE_FAILURES}): {e}");
                send_error(&mut stream, None, &ProtocolError::MalformedMessage)?;
                if parse_failures >= MAX_PARSE_FAILURES {
                    log::warn!("parse failure limit exceeded, disconnecting");
                    return Ok(());
                }
                continue;
            }
        };

        // First message must be hello; the token is compared for equality
        // against the configured value.
        if !authenticated {
            match msg {
                ClientRequest::Hello(hello) => {
                    if hello.token != expected_token {
                        send_error(&mut stream, Some(hello.id), &ProtocolError::AuthFailed)?;
                        return Ok(());
                    }
                    if hello.protocol_version > PROTOCOL_VERSION {
                        send_error(&mut stream, Some(hello.id), &ProtocolError::ProtocolMismatch)?;
                        return Ok(());
                    }

                    authenticated = true;
                    log::debug!("client '{}' v{} authenticated", hello.client, hello.version);

                    let response = ServerResponse::Welcome(WelcomeResponse {
                        id: hello.id,
                        protocol_version: hello.protocol_version.min(PROTOCOL_VERSION),
                        capabilities: vec![
                            "link".to_string(),
                            "suggest_links".to_string(),
                            "explicit_links".to_string(),
                            "registry".to_string(),
                        ],
                    });
                    send_message(&mut stream, &response)?;
                }
                _ => {
                    send_error(&mut stream, None, &ProtocolError::AuthFailed)?;
                    return Ok(());
                }
            }
            continue;
        }

        let response = handle_request(msg, service);
        send_message(&mut stream, &response)?;
    }
}

/// Handle one authenticated request and build the response. Store errors
/// become `internal_error` responses; delete operations on absent targets
/// succeed silently at the store layer.
fn handle_request(msg: ClientRequest, service: &LinkingService) -> ServerResponse {
    match msg {
        ClientRequest::Hello(h) => {
            ServerResponse::Error(ProtocolError::AlreadyAuthenticated.to_error_response(Some(h.id)))
        }
        ClientRequest::GetExplicitLinks(req) => {
            match service.explicit_links(&req.left_set, &req.right_set) {
                Ok(pairs) => {
                    let (left_keys, right_keys) =
                        pairs.into_iter().map(|p| (p.left, p.right)).unzip();
                    ServerResponse::ExplicitLinks(ExplicitLinksResponse {
                        id: req.id,
                        left_keys,
                        right_keys,
                    })
                }
                Err(e) => store_error(req.id, e),
            }
        }
        ClientRequest::AddExplicitLink(req) => {
            match service.add_explicit_link(&req.left.set, &req.left.key, &req.right.set, &req.right.key)
            {
                Ok(()) => ServerResponse::Ack(AckResponse { id: req.id }),
                Err(e) => store_error(req.id, e),
            }
        }
        ClientRequest::DeleteExplicitLink(req) => {
            match service.delete_explicit_link(
                &req.left.set,
                &req.left.key,
                &req.right.set,
                &req.right.key,
            ) {
                Ok(()) => ServerResponse::Ack(AckResponse { id: req.id }),
                Err(e) => store_error(req.id, e),
            }
        }
        ClientRequest::GetKnownSets(req) => match service.known_sets() {
            Ok(sets) => ServerResponse::KnownSets(KnownSetsResponse { id: req.id, sets }),
            Err(e) => store_error(req.id, e),
        },
        ClientRequest::GetKnownKeys(req) => match service.known_keys(&req.set) {
            Ok(keys) => ServerResponse::KnownKeys(KnownKeysResponse {
                id: req.id,
                entries: keys
                    .into_iter()
                    .map(|k| KnownKeyEntry {
                        key: k.key,
                        last_seen: k.last_seen,
                    })
                    .collect(),
            }),
            Err(e) => store_error(req.id, e),
        },
        ClientRequest::DeleteKnownSets(req) => match service.delete_known_sets(&req.names) {
            Ok(()) => ServerResponse::Ack(AckResponse { id: req.id }),
            Err(e) => store_error(req.id, e),
        },
        ClientRequest::DeleteKnownKeys(req) => match service.delete_known_keys(&req.set, &req.keys) {
            Ok(()) => ServerResponse::Ack(AckResponse { id: req.id }),
            Err(e) => store_error(req.id, e),
        },
        ClientRequest::Link(req) => {
            match service.link(&req.src.name, &req.src.keys, &req.dst.name, &req.dst.keys) {
                Ok(mapping) => ServerResponse::Mapping(MappingResponse { id: req.id, mapping }),
                Err(e) => store_error(req.id, e),
            }
        }
        ClientRequest::SuggestLinks(req) => {
            match service.suggest_links(&req.src.name, &req.src.keys, &req.dst.name, &req.dst.keys) {
                Ok(links) => ServerResponse::Candidates(CandidatesResponse {
                    id: req.id,
                    candidates: links
                        .into_iter()
                        .map(|l| Candidate {
                            left: l.left,
                            right: l.right,
                            correlation: l.correlation,
                        })
                        .collect(),
                }),
                Err(e) => store_error(req.id, e),
            }
        }
        ClientRequest::Ping(ping) => ServerResponse::Pong(PongResponse { id: ping.id }),
    }
}

fn store_error(id: String, e: StoreError) -> ServerResponse {
    log::error!("store failure: {e}");
    ServerResponse::Error(ProtocolError::Internal(e).to_error_response(Some(id)))
}

/// Send a message to the client.
fn send_message(stream: &mut TcpStream, msg: &ServerResponse) -> io::Result<()> {
    let json = serde_json::to_string(msg)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    writeln!(stream, "{}", json)?;
    stream.flush()
}

/// Send an error message to the client.
fn send_error(stream: &mut TcpStream, id: Option<String>, error: &ProtocolError) -> io::Result<()> {
    let msg = ServerResponse::Error(error.to_error_response(id));
    send_message(stream, &msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{Clock, LinkingService};
    use crosswalk_store::{KeyRegistry, LinkStore, Store};
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpStream;

    struct FixedClock(i64);

    impl Clock for FixedClock {
        fn now_unix(&self) -> i64 {
            self.0
        }
    }

    const TEST_TOKEN: &str = "test-token";

    fn start_test_server() -> LinkServer {
        let db = Store::open_in_memory().unwrap();
        let service = Arc::new(LinkingService::new(
            LinkStore::new(Arc::clone(&db)),
            KeyRegistry::new(db),
            Arc::new(FixedClock(500)),
        ));

        let mut server = LinkServer::new();
        server
            .start("127.0.0.1:0", TEST_TOKEN.to_string(), service)
            .unwrap();
        server
    }

    struct TestClient {
        stream: TcpStream,
        reader: BufReader<TcpStream>,
    }

    impl TestClient {
        fn connect(server: &LinkServer) -> Self {
            let stream = TcpStream::connect(server.bound_addr().unwrap()).unwrap();
            stream
                .set_read_timeout(Some(Duration::from_secs(5)))
                .unwrap();
            let reader = BufReader::new(stream.try_clone().unwrap());
            Self { stream, reader }
        }

        fn connect_and_hello(server: &LinkServer) -> Self {
            let mut client = Self::connect(server);
            let welcome = client.send(&serde_json::json!({
                "type": "hello",
                "id": "1",
                "client": "test",
                "version": "0.0.0",
                "token": TEST_TOKEN,
                "protocol_version": 1
            }));
            assert!(matches!(welcome, ServerResponse::Welcome(_)));
            client
        }

        fn send(&mut self, msg: &serde_json::Value) -> ServerResponse {
            writeln!(self.stream, "{}", msg).unwrap();
            self.read_response()
        }

        fn send_raw(&mut self, raw: &str) -> ServerResponse {
            writeln!(self.stream, "{}", raw).unwrap();
            self.read_response()
        }

        fn read_response(&mut self) -> ServerResponse {
            let mut line = String::new();
            self.reader.read_line(&mut line).unwrap();
            serde_json::from_str(&line).unwrap()
        }
    }

    #[test]
    fn server_lifecycle() {
        let mut server = start_test_server();
        assert!(server.is_running());
        assert!(server.bound_addr().is_some());

        server.stop();
        assert!(!server.is_running());
    }

    #[test]
    fn hello_then_ping() {
        let mut server = start_test_server();
        let mut client = TestClient::connect_and_hello(&server);

        let pong = client.send(&serde_json::json!({"type": "ping", "id": "2"}));
        assert!(matches!(pong, ServerResponse::Pong(_)));

        server.stop();
    }

    #[test]
    fn wrong_token_is_rejected() {
        let mut server = start_test_server();
        let mut client = TestClient::connect(&server);

        let response = client.send(&serde_json::json!({
            "type": "hello",
            "id": "1",
            "client": "test",
            "version": "0.0.0",
            "token": "wrong-token",
            "protocol_version": 1
        }));

        match response {
            ServerResponse::Error(e) => assert_eq!(e.code, "auth_failed"),
            other => panic!("expected error, got {other:?}"),
        }

        server.stop();
    }

    #[test]
    fn request_before_hello_is_rejected() {
        let mut server = start_test_server();
        let mut client = TestClient::connect(&server);

        let response = client.send(&serde_json::json!({"type": "ping", "id": "1"}));
        match response {
            ServerResponse::Error(e) => assert_eq!(e.code, "auth_failed"),
            other => panic!("expected error, got {other:?}"),
        }

        server.stop();
    }

    #[test]
    fn newer_protocol_version_is_rejected() {
        let mut server = start_test_server();
        let mut client = TestClient::connect(&server);

        let response = client.send(&serde_json::json!({
            "type": "hello",
            "id": "1",
            "client": "test",
            "version": "0.0.0",
            "token": TEST_TOKEN,
            "protocol_version": 99
        }));

        match response {
            ServerResponse::Error(e) => assert_eq!(e.code, "protocol_mismatch"),
            other => panic!("expected error, got {other:?}"),
        }

        server.stop();
    }

    #[test]
    fn explicit_link_round_trip() {
        let mut server = start_test_server();
        let mut client = TestClient::connect_and_hello(&server);

        let ack = client.send(&serde_json::json!({
            "type": "add_explicit_link",
            "id": "2",
            "left": {"set": "powerschool", "key": "ALG-1"},
            "right": {"set": "canvas", "key": "algebra-i"}
        }));
        assert!(matches!(ack, ServerResponse::Ack(_)));

        // Same link, queried from the other side.
        let response = client.send(&serde_json::json!({
            "type": "get_explicit_links",
            "id": "3",
            "left_set": "canvas",
            "right_set": "powerschool"
        }));
        match response {
            ServerResponse::ExplicitLinks(links) => {
                assert_eq!(links.left_keys, vec!["algebra-i"]);
                assert_eq!(links.right_keys, vec!["ALG-1"]);
            }
            other => panic!("expected explicit_links, got {other:?}"),
        }

        server.stop();
    }

    #[test]
    fn link_and_suggest_over_the_wire() {
        let mut server = start_test_server();
        let mut client = TestClient::connect_and_hello(&server);

        let response = client.send(&serde_json::json!({
            "type": "link",
            "id": "2",
            "src": {"name": "powerschool", "keys": ["bio 101", "abc"]},
            "dst": {"name": "canvas", "keys": ["bio-101", "cba"]}
        }));
        match response {
            ServerResponse::Mapping(m) => {
                // "abc"/"cba" scores below the threshold and is dropped.
                assert_eq!(m.mapping.len(), 1);
                assert_eq!(m.mapping.get("bio 101").map(String::as_str), Some("bio-101"));
            }
            other => panic!("expected mapping, got {other:?}"),
        }

        let response = client.send(&serde_json::json!({
            "type": "suggest_links",
            "id": "3",
            "src": {"name": "powerschool", "keys": ["bio 101", "abc"]},
            "dst": {"name": "canvas", "keys": ["bio-101", "cba"]}
        }));
        match response {
            ServerResponse::Candidates(c) => {
                assert_eq!(c.candidates.len(), 2);
                assert!(c.candidates.iter().any(|x| x.left == "abc" && x.correlation < 0.75));
            }
            other => panic!("expected candidates, got {other:?}"),
        }

        server.stop();
    }

    #[test]
    fn linking_requests_are_visible_in_the_registry() {
        let mut server = start_test_server();
        let mut client = TestClient::connect_and_hello(&server);

        client.send(&serde_json::json!({
            "type": "link",
            "id": "2",
            "src": {"name": "powerschool", "keys": ["a"]},
            "dst": {"name": "canvas", "keys": ["b"]}
        }));

        let response = client.send(&serde_json::json!({
            "type": "get_known_keys",
            "id": "3",
            "set": "canvas"
        }));
        match response {
            ServerResponse::KnownKeys(known) => {
                assert_eq!(known.entries.len(), 1);
                assert_eq!(known.entries[0].key, "b");
                assert_eq!(known.entries[0].last_seen, 500);
            }
            other => panic!("expected known_keys, got {other:?}"),
        }

        server.stop();
    }

    #[test]
    fn parse_failures_disconnect_after_limit() {
        let mut server = start_test_server();
        let mut client = TestClient::connect_and_hello(&server);

        for i in 0..2 {
            let response = client.send_raw(&format!("{{not json {i}"));
            match response {
                ServerResponse::Error(e) => assert_eq!(e.code, "malformed_message"),
                other => panic!("expected error, got {other:?}"),
            }
        }

        // Third failure: error, then the server hangs up.
        writeln!(client.stream, "{{still not json").unwrap();
        let mut line = String::new();
        client.reader.read_line(&mut line).unwrap();

        thread::sleep(Duration::from_millis(100));
        line.clear();
        let read = client.reader.read_line(&mut line);
        assert!(read.is_err() || line.is_empty());

        server.stop();
    }
}
