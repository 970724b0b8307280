//! IMAP mailbox over TLS (rustls), driven with raw commands.
//!
//! All socket I/O is blocking and runs under `spawn_blocking`; the session is
//! moved into the blocking task for each operation and handed back afterwards.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use mail_parser::MessageParser;
use regex::Regex;
use rustls_pki_types::ServerName;
use secrecy::ExposeSecret;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::config::MailboxConfig;
use crate::error::MailboxError;
use crate::mailbox::{Mailbox, Message, Sender, StreamItem, Uid};

/// Folder scanned by the cleaner.
const DEFAULT_FOLDER: &str = "INBOX";

/// Socket read timeout; a stalled server fails the current command.
const READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Envelope-only fetch: UID plus the two header fields rules look at.
const FETCH_ENVELOPES: &str = "UID FETCH 1:* (UID BODY.PEEK[HEADER.FIELDS (FROM SUBJECT)])";

static FETCH_UID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bUID (\d+)").expect("valid UID regex"));

static LITERAL_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{(\d+)\}$").expect("valid literal regex"));

static EXISTS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\* (\d+) EXISTS").expect("valid EXISTS regex"));

type TlsStream = rustls::StreamOwned<rustls::ClientConnection, TcpStream>;

/// One logical server response: the text of every physical line joined,
/// with literal payloads pulled out in order.
#[derive(Debug, Default)]
struct Response {
    text: String,
    literals: Vec<Vec<u8>>,
}

/// Authenticated IMAP connection.
struct ImapSession {
    reader: BufReader<TlsStream>,
    next_tag: u32,
}

impl ImapSession {
    /// Connect over TLS and consume the server greeting.
    fn open(config: &MailboxConfig) -> Result<Self, MailboxError> {
        let addr = format!("{}:{}", config.server, config.port);
        let tcp = TcpStream::connect((config.server.as_str(), config.port)).map_err(|e| {
            MailboxError::Connect {
                server: addr.clone(),
                reason: e.to_string(),
            }
        })?;
        tcp.set_read_timeout(Some(READ_TIMEOUT))?;

        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = Arc::new(
            rustls::ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth(),
        );
        let server_name = ServerName::try_from(config.server.clone())
            .map_err(|e| MailboxError::Tls(format!("invalid server name: {e}")))?;
        let conn = rustls::ClientConnection::new(tls_config, server_name)
            .map_err(|e| MailboxError::Tls(e.to_string()))?;

        let mut session = Self {
            reader: BufReader::new(rustls::StreamOwned::new(conn, tcp)),
            next_tag: 1,
        };

        let greeting = session.read_response()?;
        if !(greeting.text.starts_with("* OK") || greeting.text.starts_with("* PREAUTH")) {
            return Err(MailboxError::Connect {
                server: addr,
                reason: format!("unexpected greeting: {}", greeting.text),
            });
        }
        Ok(session)
    }

    fn read_line(&mut self) -> Result<String, MailboxError> {
        let mut buf = Vec::new();
        if self.reader.read_until(b'\n', &mut buf)? == 0 {
            return Err(MailboxError::Protocol("connection closed by server".into()));
        }
        let line = String::from_utf8_lossy(&buf);
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    fn read_response(&mut self) -> Result<Response, MailboxError> {
        let mut response = Response::default();
        loop {
            let line = self.read_line()?;
            let literal = literal_len(&line);
            response.text.push_str(&line);
            match literal {
                Some(len) => {
                    let mut payload = vec![0u8; len];
                    self.reader.read_exact(&mut payload)?;
                    response.literals.push(payload);
                }
                None => return Ok(response),
            }
        }
    }

    fn send(&mut self, command: &str) -> Result<String, MailboxError> {
        let tag = format!("A{:04}", self.next_tag);
        self.next_tag += 1;
        let stream = self.reader.get_mut();
        stream.write_all(format!("{tag} {command}\r\n").as_bytes())?;
        stream.flush()?;
        Ok(tag)
    }

    /// Run a command to completion, returning its untagged responses.
    /// `name` is used in errors instead of the full command text.
    fn command(&mut self, name: &str, command: &str) -> Result<Vec<Response>, MailboxError> {
        let tag = self.send(command)?;
        let mut untagged = Vec::new();
        loop {
            let response = self.read_response()?;
            if is_tagged(&tag, &response.text) {
                check_completion(&tag, name, &response.text)?;
                return Ok(untagged);
            }
            untagged.push(response);
        }
    }

    fn login(&mut self, user: &str, password: &str) -> Result<(), MailboxError> {
        let command = format!("LOGIN {} {}", quote(user), quote(password));
        self.command("LOGIN", &command)
            .map(|_| ())
            .map_err(|e| MailboxError::Login {
                user: user.to_string(),
                reason: e.to_string(),
            })
    }

    /// Select `folder` and return its message count.
    fn select(&mut self, folder: &str) -> Result<u32, MailboxError> {
        let responses = self.command("SELECT", &format!("SELECT {}", quote(folder)))?;
        Ok(responses
            .iter()
            .find_map(|r| exists_count(&r.text))
            .unwrap_or(0))
    }

    /// Fetch every envelope in the selected folder, pushing each into `tx`
    /// as soon as it is parsed. If the receiver goes away the remaining
    /// responses are drained so the connection stays in sync.
    fn stream_envelopes(&mut self, tx: &mpsc::Sender<StreamItem>) -> Result<(), MailboxError> {
        let tag = self.send(FETCH_ENVELOPES)?;
        let mut receiver_closed = false;
        loop {
            let response = self.read_response()?;
            if is_tagged(&tag, &response.text) {
                check_completion(&tag, "UID FETCH", &response.text)?;
                break;
            }
            if receiver_closed || !is_fetch(&response.text) {
                continue;
            }
            if tx.blocking_send(parse_fetch(&response)).is_err() {
                debug!("Consumer dropped, draining remaining FETCH responses");
                receiver_closed = true;
            }
        }

        if receiver_closed {
            Err(MailboxError::Closed)
        } else {
            Ok(())
        }
    }

    fn logout(&mut self) -> Result<(), MailboxError> {
        self.command("LOGOUT", "LOGOUT").map(|_| ())
    }
}

/// IMAP implementation of [`Mailbox`].
pub struct ImapMailbox {
    config: MailboxConfig,
    folder: String,
    session: Option<ImapSession>,
}

impl ImapMailbox {
    pub fn new(config: MailboxConfig) -> Self {
        Self {
            config,
            folder: DEFAULT_FOLDER.to_string(),
            session: None,
        }
    }

    /// Scan a folder other than `INBOX`.
    pub fn with_folder(mut self, folder: impl Into<String>) -> Self {
        self.folder = folder.into();
        self
    }

    /// Run a blocking operation against the session on the blocking pool.
    async fn with_session<T, F>(&mut self, op: F) -> Result<T, MailboxError>
    where
        F: FnOnce(&mut ImapSession) -> Result<T, MailboxError> + Send + 'static,
        T: Send + 'static,
    {
        let mut session = self.session.take().ok_or(MailboxError::NotConnected)?;
        let (session, result) = tokio::task::spawn_blocking(move || {
            let result = op(&mut session);
            (session, result)
        })
        .await
        .map_err(|e| MailboxError::Protocol(format!("IMAP task failed: {e}")))?;
        self.session = Some(session);
        result
    }
}

#[async_trait]
impl Mailbox for ImapMailbox {
    async fn connect(&mut self) -> Result<(), MailboxError> {
        info!(
            server = %self.config.server,
            port = self.config.port,
            user = %self.config.email,
            "Connecting to IMAP server"
        );
        let config = self.config.clone();
        let session = tokio::task::spawn_blocking(move || {
            let mut session = ImapSession::open(&config)?;
            session.login(&config.email, config.password.expose_secret())?;
            Ok::<_, MailboxError>(session)
        })
        .await
        .map_err(|e| MailboxError::Protocol(format!("IMAP task failed: {e}")))??;
        self.session = Some(session);
        info!("Connected and logged in successfully");
        Ok(())
    }

    async fn stream(&mut self, tx: mpsc::Sender<StreamItem>) -> Result<(), MailboxError> {
        let folder = self.folder.clone();
        self.with_session(move |session| {
            let exists = session.select(&folder)?;
            if exists == 0 {
                info!(folder = %folder, "No messages in folder");
                return Ok(());
            }
            info!(folder = %folder, total = exists, "Total messages in folder");
            session.stream_envelopes(&tx)
        })
        .await
    }

    async fn mark_deleted(&mut self, uid: Uid) -> Result<(), MailboxError> {
        self.with_session(move |session| {
            session
                .command(
                    "UID STORE",
                    &format!("UID STORE {uid} +FLAGS.SILENT (\\Deleted)"),
                )
                .map(|_| ())
        })
        .await
    }

    async fn expunge(&mut self) -> Result<(), MailboxError> {
        self.with_session(|session| session.command("EXPUNGE", "EXPUNGE").map(|_| ()))
            .await
    }

    async fn disconnect(&mut self) -> Result<(), MailboxError> {
        if self.session.is_none() {
            debug!("No active IMAP session to disconnect");
            return Ok(());
        }
        info!("Disconnecting from IMAP server");
        let result = self.with_session(|session| session.logout()).await;
        self.session = None;
        if result.is_ok() {
            info!("Logged out");
        }
        result
    }
}

// ── Response helpers ────────────────────────────────────────────────

fn is_tagged(tag: &str, text: &str) -> bool {
    text.strip_prefix(tag).is_some_and(|rest| rest.starts_with(' '))
}

fn check_completion(tag: &str, name: &str, text: &str) -> Result<(), MailboxError> {
    let status = text[tag.len()..].trim_start();
    if status.starts_with("OK") {
        Ok(())
    } else {
        Err(MailboxError::Command {
            command: name.to_string(),
            response: status.to_string(),
        })
    }
}

fn literal_len(line: &str) -> Option<usize> {
    LITERAL_MARKER
        .captures(line)
        .and_then(|c| c[1].parse().ok())
}

fn exists_count(text: &str) -> Option<u32> {
    EXISTS.captures(text).and_then(|c| c[1].parse().ok())
}

fn is_fetch(text: &str) -> bool {
    text.starts_with("* ") && text.contains(" FETCH ")
}

/// Quote a string for use as an IMAP quoted-string.
fn quote(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

/// Build a [`Message`] from one `* n FETCH (UID .. BODY[..] {len})` response.
fn parse_fetch(response: &Response) -> StreamItem {
    let uid = FETCH_UID
        .captures(&response.text)
        .and_then(|c| c[1].parse::<u32>().ok())
        .ok_or_else(|| {
            MailboxError::Protocol(format!("FETCH response without UID: {}", response.text))
        })?;

    let Some(headers) = response.literals.first() else {
        return Ok(Message::new(uid, Vec::new(), ""));
    };
    let Some(parsed) = MessageParser::default().parse(headers.as_slice()) else {
        return Ok(Message::new(uid, Vec::new(), ""));
    };

    let from = extract_senders(parsed.from());
    let subject = parsed.subject().unwrap_or_default().to_string();
    Ok(Message::new(uid, from, subject))
}

fn extract_senders(addr: Option<&mail_parser::Address>) -> Vec<Sender> {
    let Some(addr) = addr else {
        return Vec::new();
    };
    let addresses: Vec<&str> = match addr {
        mail_parser::Address::List(addrs) => addrs
            .iter()
            .filter_map(|a| a.address.as_deref())
            .collect(),
        mail_parser::Address::Group(groups) => groups
            .iter()
            .flat_map(|g| g.addresses.iter().filter_map(|a| a.address.as_deref()))
            .collect(),
    };
    addresses.into_iter().map(Sender::parse).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetch_response(text: &str, headers: Option<&str>) -> Response {
        Response {
            text: text.to_string(),
            literals: headers.map(|h| h.as_bytes().to_vec()).into_iter().collect(),
        }
    }

    #[test]
    fn literal_marker_at_end_of_line() {
        assert_eq!(
            literal_len("* 1 FETCH (UID 7 BODY[HEADER.FIELDS (FROM SUBJECT)] {62}"),
            Some(62)
        );
        assert_eq!(literal_len("* 1 FETCH (UID 7)"), None);
    }

    #[test]
    fn tagged_line_detection() {
        assert!(is_tagged("A0003", "A0003 OK UID FETCH completed"));
        assert!(!is_tagged("A0003", "A00031 OK"));
        assert!(!is_tagged("A0003", "* 3 EXISTS"));
    }

    #[test]
    fn completion_status_errors_carry_response() {
        assert!(check_completion("A0001", "LOGIN", "A0001 OK done").is_ok());
        let err = check_completion("A0001", "LOGIN", "A0001 NO [AUTHENTICATIONFAILED] bad")
            .unwrap_err();
        assert!(err.to_string().contains("LOGIN failed"));
        assert!(err.to_string().contains("AUTHENTICATIONFAILED"));
    }

    #[test]
    fn exists_count_parsed_from_select() {
        assert_eq!(exists_count("* 172 EXISTS"), Some(172));
        assert_eq!(exists_count("* 3 RECENT"), None);
    }

    #[test]
    fn quote_escapes_specials() {
        assert_eq!(quote("plain"), "\"plain\"");
        assert_eq!(quote(r#"pa"ss\word"#), r#""pa\"ss\\word""#);
    }

    #[test]
    fn parse_fetch_extracts_uid_sender_and_subject() {
        let response = fetch_response(
            "* 1 FETCH (UID 4242 BODY[HEADER.FIELDS (FROM SUBJECT)] {70})",
            Some("From: Offers <offer@mail.spam.example>\r\nSubject: Win now\r\n\r\n"),
        );
        let msg = parse_fetch(&response).unwrap();
        assert_eq!(msg.uid, Uid(4242));
        assert_eq!(msg.from, vec![Sender::new("offer", "mail.spam.example")]);
        assert_eq!(msg.subject, "Win now");
    }

    #[test]
    fn parse_fetch_decodes_encoded_subject() {
        let response = fetch_response(
            "* 2 FETCH (UID 9 BODY[HEADER.FIELDS (FROM SUBJECT)] {80})",
            Some("From: a@x.com\r\nSubject: =?UTF-8?B?SGVsbG8gd29ybGQ=?=\r\n\r\n"),
        );
        let msg = parse_fetch(&response).unwrap();
        assert_eq!(msg.subject, "Hello world");
    }

    #[test]
    fn parse_fetch_without_headers_has_no_senders() {
        let response = fetch_response("* 3 FETCH (UID 11 BODY[HEADER.FIELDS (FROM SUBJECT)] NIL)", None);
        let msg = parse_fetch(&response).unwrap();
        assert_eq!(msg.uid, Uid(11));
        assert!(msg.from.is_empty());
        assert_eq!(msg.subject, "");
    }

    #[test]
    fn parse_fetch_without_uid_is_an_error() {
        let response = fetch_response("* 3 FETCH (FLAGS (\\Seen))", None);
        assert!(matches!(
            parse_fetch(&response),
            Err(MailboxError::Protocol(_))
        ));
    }

    #[test]
    fn fetch_detection() {
        assert!(is_fetch("* 12 FETCH (UID 40 FLAGS ())"));
        assert!(!is_fetch("* 12 EXISTS"));
    }
}
