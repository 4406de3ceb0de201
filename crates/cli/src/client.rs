//! JSONL client for the crosswalk server.
//!
//! Connects, performs the hello handshake, then exchanges one request/response
//! pair per call. All admin commands go through this client; the CLI never
//! touches the database directly.

use std::collections::BTreeMap;
use std::fmt;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::net::TcpStream;
use std::time::Duration;

use crosswalk_protocol::{
    AckResponse, Candidate, ClientRequest, DeleteKnownKeysRequest, DeleteKnownSetsRequest,
    ExplicitLinkRequest, GetExplicitLinksRequest, GetKnownKeysRequest, GetKnownSetsRequest,
    HelloRequest, KeyList, KeyRef, KnownKeyEntry, LinkRequest, PingRequest, ServerResponse,
    PROTOCOL_VERSION,
};

#[derive(Debug)]
pub enum ClientError {
    /// Could not reach or talk to the server.
    ConnectionFailed(String),
    /// The server rejected the token.
    AuthFailed(String),
    /// The server answered something this client cannot interpret.
    Protocol(String),
    /// The server answered with an error response.
    Remote { code: String, message: String },
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionFailed(msg) => write!(f, "connection failed: {msg}"),
            Self::AuthFailed(msg) => write!(f, "authentication failed: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol error: {msg}"),
            Self::Remote { code, message } => write!(f, "server error ({code}): {message}"),
        }
    }
}

impl std::error::Error for ClientError {}

/// A client connection to a crosswalk server.
pub struct Client {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
    protocol_version: u32,
    capabilities: Vec<String>,
    next_id: u64,
}

impl Client {
    /// Connect to `addr` and perform the hello handshake.
    pub fn connect(addr: &str, token: &str) -> Result<Self, ClientError> {
        let addr = addr
            .parse()
            .map_err(|_| ClientError::ConnectionFailed(format!("invalid address '{addr}'")))?;
        let stream = TcpStream::connect_timeout(&addr, Duration::from_secs(5))
            .map_err(|e| ClientError::ConnectionFailed(e.to_string()))?;

        stream
            .set_read_timeout(Some(Duration::from_secs(30)))
            .map_err(|e| ClientError::ConnectionFailed(e.to_string()))?;
        stream
            .set_write_timeout(Some(Duration::from_secs(30)))
            .map_err(|e| ClientError::ConnectionFailed(e.to_string()))?;

        let reader = BufReader::new(
            stream
                .try_clone()
                .map_err(|e| ClientError::ConnectionFailed(e.to_string()))?,
        );
        let writer = BufWriter::new(stream);

        let mut client = Self {
            reader,
            writer,
            protocol_version: PROTOCOL_VERSION,
            capabilities: Vec::new(),
            next_id: 1,
        };

        let hello = ClientRequest::Hello(HelloRequest {
            id: client.next_request_id(),
            client: "xwalk".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            token: token.to_string(),
            protocol_version: PROTOCOL_VERSION,
        });
        client.send(&hello)?;

        match client.receive()? {
            ServerResponse::Welcome(welcome) => {
                client.protocol_version = welcome.protocol_version;
                client.capabilities = welcome.capabilities;
                Ok(client)
            }
            ServerResponse::Error(e) if e.code == "auth_failed" => {
                Err(ClientError::AuthFailed(e.message))
            }
            ServerResponse::Error(e) => Err(ClientError::Remote {
                code: e.code,
                message: e.message,
            }),
            _ => Err(ClientError::Protocol("unexpected response to hello".into())),
        }
    }

    pub fn protocol_version(&self) -> u32 {
        self.protocol_version
    }

    pub fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    /// Keepalive round trip; proves the server is reachable and the token is
    /// accepted.
    pub fn ping(&mut self) -> Result<(), ClientError> {
        let id = self.next_request_id();
        match self.round_trip(ClientRequest::Ping(PingRequest { id }))? {
            ServerResponse::Pong(_) => Ok(()),
            other => Err(unexpected(&other)),
        }
    }

    pub fn known_sets(&mut self) -> Result<Vec<String>, ClientError> {
        let id = self.next_request_id();
        match self.round_trip(ClientRequest::GetKnownSets(GetKnownSetsRequest { id }))? {
            ServerResponse::KnownSets(r) => Ok(r.sets),
            other => Err(unexpected(&other)),
        }
    }

    pub fn known_keys(&mut self, set: &str) -> Result<Vec<KnownKeyEntry>, ClientError> {
        let id = self.next_request_id();
        let req = ClientRequest::GetKnownKeys(GetKnownKeysRequest {
            id,
            set: set.to_string(),
        });
        match self.round_trip(req)? {
            ServerResponse::KnownKeys(r) => Ok(r.entries),
            other => Err(unexpected(&other)),
        }
    }

    /// Parallel key arrays, already oriented so the first belongs to
    /// `left_set`.
    pub fn explicit_links(
        &mut self,
        left_set: &str,
        right_set: &str,
    ) -> Result<(Vec<String>, Vec<String>), ClientError> {
        let id = self.next_request_id();
        let req = ClientRequest::GetExplicitLinks(GetExplicitLinksRequest {
            id,
            left_set: left_set.to_string(),
            right_set: right_set.to_string(),
        });
        match self.round_trip(req)? {
            ServerResponse::ExplicitLinks(r) => Ok((r.left_keys, r.right_keys)),
            other => Err(unexpected(&other)),
        }
    }

    pub fn add_explicit_link(&mut self, left: KeyRef, right: KeyRef) -> Result<(), ClientError> {
        let id = self.next_request_id();
        self.expect_ack(ClientRequest::AddExplicitLink(ExplicitLinkRequest { id, left, right }))
    }

    pub fn delete_explicit_link(&mut self, left: KeyRef, right: KeyRef) -> Result<(), ClientError> {
        let id = self.next_request_id();
        self.expect_ack(ClientRequest::DeleteExplicitLink(ExplicitLinkRequest { id, left, right }))
    }

    pub fn delete_known_sets(&mut self, names: Vec<String>) -> Result<(), ClientError> {
        let id = self.next_request_id();
        self.expect_ack(ClientRequest::DeleteKnownSets(DeleteKnownSetsRequest { id, names }))
    }

    pub fn delete_known_keys(&mut self, set: &str, keys: Vec<String>) -> Result<(), ClientError> {
        let id = self.next_request_id();
        self.expect_ack(ClientRequest::DeleteKnownKeys(DeleteKnownKeysRequest {
            id,
            set: set.to_string(),
            keys,
        }))
    }

    pub fn link(
        &mut self,
        src: KeyList,
        dst: KeyList,
    ) -> Result<BTreeMap<String, String>, ClientError> {
        let id = self.next_request_id();
        match self.round_trip(ClientRequest::Link(LinkRequest { id, src, dst }))? {
            ServerResponse::Mapping(r) => Ok(r.mapping),
            other => Err(unexpected(&other)),
        }
    }

    pub fn suggest_links(
        &mut self,
        src: KeyList,
        dst: KeyList,
    ) -> Result<Vec<Candidate>, ClientError> {
        let id = self.next_request_id();
        match self.round_trip(ClientRequest::SuggestLinks(LinkRequest { id, src, dst }))? {
            ServerResponse::Candidates(r) => Ok(r.candidates),
            other => Err(unexpected(&other)),
        }
    }

    fn expect_ack(&mut self, req: ClientRequest) -> Result<(), ClientError> {
        match self.round_trip(req)? {
            ServerResponse::Ack(AckResponse { .. }) => Ok(()),
            other => Err(unexpected(&other)),
        }
    }

    fn round_trip(&mut self, req: ClientRequest) -> Result<ServerResponse, ClientError> {
        self.send(&req)?;
        match self.receive()? {
            ServerResponse::Error(e) => Err(ClientError::Remote {
                code: e.code,
                message: e.message,
            }),
            other => Ok(other),
        }
    }

    fn send(&mut self, req: &ClientRequest) -> Result<(), ClientError> {
        let json =
            serde_json::to_string(req).map_err(|e| ClientError::Protocol(e.to_string()))?;
        writeln!(self.writer, "{json}")
            .map_err(|e| ClientError::ConnectionFailed(e.to_string()))?;
        self.writer
            .flush()
            .map_err(|e| ClientError::ConnectionFailed(e.to_string()))
    }

    fn receive(&mut self) -> Result<ServerResponse, ClientError> {
        let mut line = String::new();
        let read = self
            .reader
            .read_line(&mut line)
            .map_err(|e| ClientError::ConnectionFailed(e.to_string()))?;
        if read == 0 {
            return Err(ClientError::ConnectionFailed(
                "server closed the connection".into(),
            ));
        }
        serde_json::from_str(&line).map_err(|e| ClientError::Protocol(e.to_string()))
    }

    fn next_request_id(&mut self) -> String {
        let id = self.next_id;
        self.next_id += 1;
        id.to_string()
    }
}

fn unexpected(response: &ServerResponse) -> ClientError {
    ClientError::Protocol(format!("unexpected response: {response:?}"))
}
