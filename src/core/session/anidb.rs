//! AniDB UDP API session.
//!
//! Implements the three commands the pipeline needs: `AUTH`, `FILE`
//! and `LOGOUT`. Flood protection and retries are left to the caller.

use super::fields::{anime_mask, anime_response_order, file_mask, file_response_order};
use super::{AnimeField, Credentials, FileField, LookupQuery, MetadataSession, RawFileRecord};
use crate::error::SessionError;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::net::UdpSocket;
use std::time::Duration;
use tracing::{debug, info};

const MAX_DATAGRAM: usize = 1400;
const PROTOCOL_VERSION: u32 = 3;

const LOGIN_ACCEPTED: u16 = 200;
const LOGIN_ACCEPTED_NEW_VERSION: u16 = 201;
const LOGGED_OUT: u16 = 203;
const FILE: u16 = 220;
const NO_SUCH_FILE: u16 = 320;
const NOT_LOGGED_IN: u16 = 403;
const AUTH_FAILURES: [u16; 4] = [500, 503, 504, 505];

/// Connection settings for the AniDB UDP API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AniDbConfig {
    pub server: String,
    pub port: u16,
    /// Local UDP port to bind
    pub local_port: u16,
    pub timeout: Duration,
    pub client: String,
    pub client_version: u32,
}

impl Default for AniDbConfig {
    fn default() -> Self {
        Self {
            server: "api.anidb.net".to_string(),
            port: 9000,
            local_port: 9000,
            timeout: Duration::from_secs(20),
            client: "animeident".to_string(),
            client_version: 1,
        }
    }
}

/// A parsed server reply
#[derive(Debug, Clone, PartialEq, Eq)]
struct Response {
    code: u16,
    message: String,
    lines: Vec<String>,
}

/// AniDB session over UDP
pub struct AniDbSession {
    config: AniDbConfig,
    socket: Option<UdpSocket>,
    session_key: Option<String>,
}

impl AniDbSession {
    /// Create a disconnected session
    pub fn new(config: AniDbConfig) -> Self {
        Self {
            config,
            socket: None,
            session_key: None,
        }
    }

    /// Whether a login is currently active
    pub fn is_authenticated(&self) -> bool {
        self.session_key.is_some()
    }

    fn request(&self, command: &str) -> Result<Response, SessionError> {
        let socket = self.socket.as_ref().ok_or(SessionError::NotConnected)?;

        socket.send(command.as_bytes())?;

        let mut buffer = [0u8; MAX_DATAGRAM];
        let received = socket.recv(&mut buffer).map_err(|e| match e.kind() {
            ErrorKind::WouldBlock | ErrorKind::TimedOut => SessionError::Timeout {
                server: self.config.server.clone(),
                seconds: self.config.timeout.as_secs(),
            },
            _ => SessionError::Io(e),
        })?;

        parse_response(&String::from_utf8_lossy(&buffer[..received]))
    }
}

impl MetadataSession for AniDbSession {
    fn connect(&mut self, credentials: &Credentials) -> Result<(), SessionError> {
        let socket = UdpSocket::bind(("0.0.0.0", self.config.local_port))?;
        socket.connect((self.config.server.as_str(), self.config.port))?;
        socket.set_read_timeout(Some(self.config.timeout))?;
        self.socket = Some(socket);

        let command = format!(
            "AUTH user={}&pass={}&protover={}&client={}&clientver={}&nat={}&enc=UTF8",
            encode_value(&credentials.username),
            encode_value(&credentials.password),
            PROTOCOL_VERSION,
            self.config.client,
            self.config.client_version,
            u8::from(credentials.nat),
        );

        let response = self.request(&command)?;
        match response.code {
            LOGIN_ACCEPTED | LOGIN_ACCEPTED_NEW_VERSION => {
                let key = response
                    .message
                    .split_whitespace()
                    .next()
                    .ok_or_else(|| {
                        SessionError::MalformedResponse("login reply without session key".into())
                    })?
                    .to_string();
                if credentials.nat {
                    if let Some(address) = response.message.split_whitespace().nth(1) {
                        debug!(address, "Server sees us at");
                    }
                }
                info!(server = %self.config.server, user = %credentials.username, "Logged in to AniDB");
                self.session_key = Some(key);
                Ok(())
            }
            code if AUTH_FAILURES.contains(&code) => {
                self.socket = None;
                Err(SessionError::Auth {
                    code,
                    message: response.message,
                })
            }
            code => {
                self.socket = None;
                Err(SessionError::Protocol {
                    code,
                    message: response.message,
                })
            }
        }
    }

    fn lookup(&mut self, query: &LookupQuery<'_>) -> Result<Option<RawFileRecord>, SessionError> {
        let key = self.session_key.clone().ok_or(SessionError::NotConnected)?;

        let command = format!(
            "FILE size={}&ed2k={}&fmask={:010X}&amask={:08X}&s={}",
            query.size,
            query.hash,
            file_mask(query.file_fields),
            anime_mask(query.anime_fields),
            key,
        );
        debug!(name = query.name, "Sending FILE query");

        let response = self.request(&command)?;
        match response.code {
            FILE => {
                let line = response.lines.first().ok_or_else(|| {
                    SessionError::MalformedResponse("FILE reply without data line".into())
                })?;
                parse_file_record(line, query.file_fields, query.anime_fields).map(Some)
            }
            NO_SUCH_FILE => Ok(None),
            code => Err(SessionError::Protocol {
                code,
                message: response.message,
            }),
        }
    }

    fn logout(&mut self) -> Result<(), SessionError> {
        let Some(key) = self.session_key.take() else {
            self.socket = None;
            return Ok(());
        };

        let result = self.request(&format!("LOGOUT s={}", key));
        self.socket = None;

        let response = result?;
        match response.code {
            LOGGED_OUT | NOT_LOGGED_IN => {
                info!("Logged out of AniDB");
                Ok(())
            }
            code => Err(SessionError::Protocol {
                code,
                message: response.message,
            }),
        }
    }
}

/// Escape a parameter value for a command line
fn encode_value(value: &str) -> String {
    value.replace('&', "&amp;").replace('\n', "<br />")
}

/// Undo the server's escaping inside a data field
fn decode_value(value: &str) -> String {
    value.replace("<br />", "\n").replace('`', "'")
}

fn parse_response(raw: &str) -> Result<Response, SessionError> {
    let mut lines = raw.trim_end_matches(&['\n', '\r'][..]).lines();
    let header = lines
        .next()
        .ok_or_else(|| SessionError::MalformedResponse("empty reply".into()))?;

    let (code, message) = header.split_once(' ').unwrap_or((header, ""));
    let code = code
        .parse::<u16>()
        .map_err(|_| SessionError::MalformedResponse(format!("bad status line: {}", header)))?;

    Ok(Response {
        code,
        message: message.to_string(),
        lines: lines.map(str::to_string).collect(),
    })
}

fn parse_file_record(
    line: &str,
    file_fields: &[FileField],
    anime_fields: &[AnimeField],
) -> Result<RawFileRecord, SessionError> {
    let mut values = line.split('|');

    let file_id = values
        .next()
        .and_then(|v| v.parse::<u64>().ok())
        .ok_or_else(|| SessionError::MalformedResponse(format!("bad file id in: {}", line)))?;

    let mut record = RawFileRecord::new(file_id);
    let missing = || SessionError::MalformedResponse(format!("too few columns in: {}", line));

    for field in file_response_order(file_fields) {
        let value = values.next().ok_or_else(missing)?;
        record.file.insert(field, decode_value(value));
    }
    for field in anime_response_order(anime_fields) {
        let value = values.next().ok_or_else(missing)?;
        record.anime.insert(field, decode_value(value));
    }

    Ok(record)
}
