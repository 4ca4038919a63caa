//! STOMP frame codec
//!
//! Frames are text, newline delimited and terminated by a NUL byte:
//!
//! ```text
//! COMMAND
//! header1:value1
//! header2:value2
//!
//! body^@
//! ```
//!
//! [`FrameBuilder`] produces the client frames (CONNECT, SUBSCRIBE, SEND,
//! DISCONNECT), [`Frame::parse`] decodes server frames and [`classify`]
//! performs the cheap prefix check used to route raw inbound text.

use std::fmt;
use std::str::FromStr;

use crate::error::FrameError;

/// Frame terminator
pub const NULL: char = '\0';

/// STOMP version offered in CONNECT
pub const STOMP_VERSION: &str = "1.2";

/// Prefix of an ERROR frame
pub const ERROR_MARKER: &str = "ERROR";

/// Prefix of a MESSAGE frame
pub const MESSAGE_MARKER: &str = "MESSAGE";

const EOL: &[char] = &['\r', '\n'];

/// Frame commands used by the item exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Connect,
    Connected,
    Subscribe,
    Send,
    Message,
    Receipt,
    Disconnect,
    Error,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Connect => "CONNECT",
            Command::Connected => "CONNECTED",
            Command::Subscribe => "SUBSCRIBE",
            Command::Send => "SEND",
            Command::Message => "MESSAGE",
            Command::Receipt => "RECEIPT",
            Command::Disconnect => "DISCONNECT",
            Command::Error => "ERROR",
        }
    }

    /// CONNECT and CONNECTED headers are sent verbatim, every other frame
    /// escapes its header names and values.
    fn escapes_headers(&self) -> bool {
        !matches!(self, Command::Connect | Command::Connected)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Command {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CONNECT" | "STOMP" => Ok(Command::Connect),
            "CONNECTED" => Ok(Command::Connected),
            "SUBSCRIBE" => Ok(Command::Subscribe),
            "SEND" => Ok(Command::Send),
            "MESSAGE" => Ok(Command::Message),
            "RECEIPT" => Ok(Command::Receipt),
            "DISCONNECT" => Ok(Command::Disconnect),
            "ERROR" => Ok(Command::Error),
            other => Err(FrameError::UnknownCommand(other.to_string())),
        }
    }
}

/// Outcome of the prefix check on raw inbound text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameClass {
    /// Text starts with `ERROR`
    Error,

    /// Text starts with `MESSAGE`
    Message,

    /// Anything else; callers ignore it
    Unrecognized,
}

/// Classifies raw inbound text by its literal prefix.
///
/// This does not parse the frame, so it never fails.
pub fn classify(text: &str) -> FrameClass {
    if text.starts_with(ERROR_MARKER) {
        FrameClass::Error
    } else if text.starts_with(MESSAGE_MARKER) {
        FrameClass::Message
    } else {
        FrameClass::Unrecognized
    }
}

/// A single STOMP frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,

    /// Headers in wire order; repeated names keep every entry but lookups
    /// return the first one
    pub headers: Vec<(String, String)>,

    pub body: String,
}

impl Frame {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Returns the first value of the named header
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Serializes the frame, including the trailing NUL
    pub fn encode(&self) -> String {
        let escape = self.command.escapes_headers();
        let mut out = String::with_capacity(self.body.len() + 64);

        out.push_str(self.command.as_str());
        out.push('\n');
        for (name, value) in &self.headers {
            if escape {
                push_escaped(&mut out, name);
                out.push(':');
                push_escaped(&mut out, value);
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push(NULL);
        out
    }

    /// Parses one frame from inbound text.
    ///
    /// Leading and trailing EOLs (heart-beats) around the frame are skipped.
    /// When a `content-length` header is present the body is cut to that
    /// many bytes.
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let text = text.trim_start_matches(EOL).trim_end_matches(EOL);
        let text = text.strip_suffix(NULL).ok_or(FrameError::Unterminated)?;
        let (head, body) = split_head(text)?;

        let mut lines = head.split('\n').map(|line| line.trim_end_matches('\r'));
        let command: Command = lines.next().unwrap_or_default().parse()?;
        let escaped = command.escapes_headers();

        let mut headers = Vec::new();
        for line in lines {
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| FrameError::MalformedHeader(line.to_string()))?;
            if escaped {
                headers.push((unescape(name)?, unescape(value)?));
            } else {
                headers.push((name.to_string(), value.to_string()));
            }
        }

        let mut frame = Frame {
            command,
            headers,
            body: body.to_string(),
        };

        if let Some(raw) = frame.header("content-length") {
            let declared: usize = raw
                .trim()
                .parse()
                .map_err(|_| FrameError::InvalidContentLength(raw.to_string()))?;
            let actual = frame.body.len();
            if declared > actual {
                return Err(FrameError::ContentLengthMismatch { declared, actual });
            }
            if !frame.body.is_char_boundary(declared) {
                return Err(FrameError::InvalidContentLength(raw.to_string()));
            }
            frame.body.truncate(declared);
        }

        Ok(frame)
    }
}

/// Splits at the first blank line, accepting both `\n\n` and `\r\n\r\n`
fn split_head(text: &str) -> Result<(&str, &str), FrameError> {
    let lf = text.find("\n\n").map(|idx| (idx, 2));
    let crlf = text.find("\r\n\r\n").map(|idx| (idx, 4));

    let (idx, len) = match (lf, crlf) {
        (Some(a), Some(b)) if b.0 < a.0 => b,
        (Some(a), _) => a,
        (None, Some(b)) => b,
        (None, None) => return Err(FrameError::MissingSeparator),
    };

    Ok((&text[..idx], &text[idx + len..]))
}

fn push_escaped(out: &mut String, value: &str) {
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
}

fn unescape(value: &str) -> Result<String, FrameError> {
    if !value.contains('\\') {
        return Ok(value.to_string());
    }

    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some('c') => out.push(':'),
            _ => return Err(FrameError::InvalidEscape(value.to_string())),
        }
    }
    Ok(out)
}

/// Checks that a destination is a `/`-rooted topic path without blanks,
/// control characters or empty segments
pub fn validate_destination(destination: &str) -> Result<(), FrameError> {
    let well_formed = destination.len() > 1
        && destination.starts_with('/')
        && !destination.ends_with('/')
        && !destination
            .chars()
            .any(|c| c.is_whitespace() || c.is_control())
        && !destination[1..].split('/').any(str::is_empty);

    if well_formed {
        Ok(())
    } else {
        Err(FrameError::InvalidDestination(destination.to_string()))
    }
}

fn validate_login(login: &str) -> Result<(), FrameError> {
    if login.is_empty() {
        return Err(FrameError::EmptyLogin);
    }
    if login.chars().any(char::is_control) {
        return Err(FrameError::InvalidLogin);
    }
    Ok(())
}

/// Topic the client subscribes to for a game room
pub fn item_topic(room: &str) -> String {
    format!("/topic/item/{}", room)
}

/// Application destination items are sent to for a game room
pub fn item_destination(room: &str) -> String {
    format!("/app/item/{}", room)
}

/// Builds the client side frames for one session
///
/// Holds the virtual host announced in CONNECT and the subscription id
/// counter, so a fresh builder should be used per connection.
#[derive(Debug, Clone)]
pub struct FrameBuilder {
    host: String,
    next_subscription: u32,
}

impl FrameBuilder {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            next_subscription: 0,
        }
    }

    /// CONNECT frame carrying `login`
    pub fn connect(&self, login: &str) -> Result<String, FrameError> {
        validate_login(login)?;

        let mut frame = Frame::new(Command::Connect).with_header("accept-version", STOMP_VERSION);
        if !self.host.is_empty() {
            frame = frame.with_header("host", self.host.as_str());
        }
        Ok(frame
            .with_header("login", login)
            .with_header("heart-beat", "0,0")
            .encode())
    }

    /// SUBSCRIBE frame for `destination`; each call uses a new subscription id
    pub fn subscribe(&mut self, destination: &str) -> Result<String, FrameError> {
        validate_destination(destination)?;

        let id = self.next_subscription;
        self.next_subscription += 1;

        Ok(Frame::new(Command::Subscribe)
            .with_header("id", format!("sub-{}", id))
            .with_header("destination", destination)
            .with_header("ack", "auto")
            .encode())
    }

    /// SEND frame carrying a JSON `payload`
    pub fn send(&self, destination: &str, payload: &str) -> Result<String, FrameError> {
        validate_destination(destination)?;

        Ok(Frame::new(Command::Send)
            .with_header("destination", destination)
            .with_header("content-type", "application/json")
            .with_header("content-length", payload.len().to_string())
            .with_body(payload)
            .encode())
    }

    /// DISCONNECT frame; an empty receipt id requests no receipt
    pub fn disconnect(&self, receipt: Option<&str>) -> String {
        let mut frame = Frame::new(Command::Disconnect);
        if let Some(receipt) = receipt.filter(|r| !r.is_empty()) {
            frame = frame.with_header("receipt", receipt);
        }
        frame.encode()
    }
}
