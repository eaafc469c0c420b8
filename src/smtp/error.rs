//! Error and result types for the client engine

use std::{error::Error as StdError, fmt};

use crate::smtp::response::Code;

/// Boxed error source
pub type BoxError = Box<dyn StdError + Send + Sync>;

// Inspired by https://github.com/seanmonstar/reqwest/blob/master/src/error.rs

/// The errors that may occur while driving an SMTP or LMTP session
pub struct Error {
    inner: Box<Inner>,
}

struct Inner {
    kind: Kind,
    source: Option<BoxError>,
    code: Option<Code>,
    command: Option<&'static str>,
    rejections: Vec<Rejection>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Kind {
    /// Transport could not be established or was closed unexpectedly
    Connection,
    /// The connection, greeting or idle window elapsed
    Timeout,
    /// STARTTLS refused or TLS handshake failure
    Tls,
    /// Reply that does not fit the protocol at this point
    Protocol,
    /// Authentication dialogue failed
    Auth,
    /// Envelope rejected: sender, recipients or their parameters
    Envelope,
    /// Message rejected: size, DATA phase or final reply
    Message,
    /// The caller-supplied body reader failed
    Stream,
}

impl Error {
    pub(crate) fn new<E>(kind: Kind, source: Option<E>) -> Error
    where
        E: Into<BoxError>,
    {
        Error {
            inner: Box::new(Inner {
                kind,
                source: source.map(Into::into),
                code: None,
                command: None,
                rejections: Vec::new(),
            }),
        }
    }

    pub(crate) fn with_code(mut self, code: Code) -> Error {
        self.inner.code = Some(code);
        self
    }

    pub(crate) fn with_command(mut self, command: &'static str) -> Error {
        self.inner.command = Some(command);
        self
    }

    pub(crate) fn with_rejections(mut self, rejections: Vec<Rejection>) -> Error {
        self.inner.rejections = rejections;
        self
    }

    /// Returns true if the transport failed or closed unexpectedly
    pub fn is_connection(&self) -> bool {
        matches!(self.inner.kind, Kind::Connection)
    }

    /// Returns true if a timeout window elapsed
    pub fn is_timeout(&self) -> bool {
        matches!(self.inner.kind, Kind::Timeout)
    }

    /// Returns true if STARTTLS was refused or the handshake failed
    pub fn is_tls(&self) -> bool {
        matches!(self.inner.kind, Kind::Tls)
    }

    /// Returns true if the server deviated from the protocol
    pub fn is_protocol(&self) -> bool {
        matches!(self.inner.kind, Kind::Protocol)
    }

    /// Returns true if authentication failed
    pub fn is_auth(&self) -> bool {
        matches!(self.inner.kind, Kind::Auth)
    }

    /// Returns true if the envelope was rejected
    pub fn is_envelope(&self) -> bool {
        matches!(self.inner.kind, Kind::Envelope)
    }

    /// Returns true if the message was rejected
    pub fn is_message(&self) -> bool {
        matches!(self.inner.kind, Kind::Message)
    }

    /// Returns true if the caller-supplied body reader failed
    pub fn is_stream(&self) -> bool {
        matches!(self.inner.kind, Kind::Stream)
    }

    /// The server reply code this error was generated from, if any
    pub fn status(&self) -> Option<Code> {
        self.inner.code
    }

    /// The command the failing exchange belonged to, if any
    pub fn command(&self) -> Option<&str> {
        self.inner.command
    }

    /// Per-recipient refusals carried by an all-recipients failure
    pub fn rejections(&self) -> &[Rejection] {
        &self.inner.rejections
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut builder = f.debug_struct("missive::Error");

        builder.field("kind", &self.inner.kind);

        if let Some(code) = self.inner.code {
            builder.field("code", &code.to_string());
        }
        if let Some(command) = self.inner.command {
            builder.field("command", &command);
        }
        if !self.inner.rejections.is_empty() {
            builder.field("rejections", &self.inner.rejections);
        }
        if let Some(ref source) = self.inner.source {
            builder.field("source", source);
        }

        builder.finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.kind {
            Kind::Connection => f.write_str("connection error")?,
            Kind::Timeout => f.write_str("operation timed out")?,
            Kind::Tls => f.write_str("tls error")?,
            Kind::Protocol => f.write_str("protocol error")?,
            Kind::Auth => f.write_str("authentication error")?,
            Kind::Envelope => f.write_str("envelope error")?,
            Kind::Message => f.write_str("message error")?,
            Kind::Stream => f.write_str("message stream error")?,
        }

        if let Some(code) = self.inner.code {
            write!(f, " ({code})")?;
        }
        if let Some(command) = self.inner.command {
            write!(f, " in response to {command}")?;
        }
        if let Some(ref e) = self.inner.source {
            write!(f, ": {e}")?;
        }

        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner.source.as_ref().map(|e| {
            let r: &(dyn StdError + 'static) = &**e;
            r
        })
    }
}

/// A single recipient refused during the RCPT phase or LMTP delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    recipient: String,
    code: Code,
    message: String,
}

impl Rejection {
    pub(crate) fn new(recipient: String, code: Code, message: String) -> Rejection {
        Rejection {
            recipient,
            code,
            message,
        }
    }

    /// The refused recipient address
    pub fn recipient(&self) -> &str {
        &self.recipient
    }

    /// The reply code the refusal carried
    pub fn code(&self) -> Code {
        self.code
    }

    /// The server text of the refusal
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} {}", self.recipient, self.code, self.message)
    }
}

pub(crate) fn connection<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Connection, Some(e))
}

pub(crate) fn timeout<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Timeout, Some(e))
}

pub(crate) fn tls<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Tls, Some(e))
}

pub(crate) fn protocol<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Protocol, Some(e))
}

pub(crate) fn auth<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Auth, Some(e))
}

pub(crate) fn envelope<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Envelope, Some(e))
}

pub(crate) fn message<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Message, Some(e))
}

pub(crate) fn stream<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Stream, Some(e))
}

/// Maps an I/O failure to either the timeout or the connection kind.
pub(crate) fn io(e: std::io::Error) -> Error {
    match e.kind() {
        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => timeout(e),
        _ => connection(e),
    }
}
