//! The SMTP/LMTP protocol driver.
//!
//! This module implements the client side of RFC 5321 (and RFC 2033 for
//! LMTP) for submitting mail to a relay: capability negotiation over
//! EHLO/LHLO, STARTTLS upgrades, authentication and the envelope/DATA
//! transaction, with support for the following extensions:
//!
//! * 8BITMIME ([RFC 6152](https://tools.ietf.org/html/rfc6152))
//! * AUTH ([RFC 4954](https://tools.ietf.org/html/rfc4954)) with the PLAIN,
//!   LOGIN, CRAM-MD5, XOAUTH2 and NTLM mechanisms
//! * STARTTLS ([RFC 2487](https://tools.ietf.org/html/rfc2487))
//! * PIPELINING ([RFC 2920](https://tools.ietf.org/html/rfc2920))
//! * SMTPUTF8 ([RFC 6531](https://tools.ietf.org/html/rfc6531))
//! * SIZE ([RFC 1870](https://tools.ietf.org/html/rfc1870))
//! * DSN ([RFC 3461](https://tools.ietf.org/html/rfc3461))

use std::{net::IpAddr, time::Duration};

pub mod authentication;
pub mod client;
pub mod commands;
pub mod error;
pub mod extension;
pub mod response;
mod util;

use self::{
    authentication::Mechanism,
    client::{SmtpConnection, TlsParameters},
    error::Error,
    extension::ClientId,
};

// Registered port numbers:
// https://www.iana.org/assignments/service-names-port-numbers/service-names-port-numbers.xhtml

/// Default SMTP port
pub const SMTP_PORT: u16 = 25;
/// Default submission port
pub const SUBMISSION_PORT: u16 = 587;
/// Default submission over TLS port
pub const SUBMISSIONS_PORT: u16 = 465;

/// How TLS is applied to the connection
#[derive(Clone, Debug)]
pub enum Tls {
    /// Plaintext only, STARTTLS is never issued
    None,
    /// Upgrade via STARTTLS when the server advertises it, plaintext
    /// otherwise
    Opportunistic(TlsParameters),
    /// Upgrade via STARTTLS or fail; the upgrade is attempted even when
    /// the server does not advertise it
    Required(TlsParameters),
    /// TLS from the first byte, without negotiation
    Wrapper(TlsParameters),
}

/// The timeout windows of a connection
#[derive(Clone, Copy, Debug)]
pub struct Timeouts {
    /// Window for establishing the TCP connection
    pub connect: Duration,
    /// Window for the server greeting once connected
    pub greeting: Duration,
    /// Window for any later read or write on the socket
    pub idle: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Timeouts {
            connect: Duration::from_secs(120),
            greeting: Duration::from_secs(30),
            idle: Duration::from_secs(600),
        }
    }
}

/// Builder for [`SmtpClient`]
#[derive(Clone, Debug)]
pub struct SmtpClientBuilder {
    host: String,
    port: Option<u16>,
    tls: Tls,
    hello_name: ClientId,
    lmtp: bool,
    local_address: Option<IpAddr>,
    timeouts: Timeouts,
    auth_mechanism: Option<Mechanism>,
    envelope_only: bool,
}

impl SmtpClientBuilder {
    /// Creates a builder for connections to `host`.
    ///
    /// Defaults: opportunistic STARTTLS validated against `host`, the port
    /// derived from the TLS mode, the machine hostname as EHLO identity and
    /// the standard timeout windows.
    pub fn new<S: Into<String>>(host: S) -> SmtpClientBuilder {
        let host = host.into();
        let tls = Tls::Opportunistic(TlsParameters::new(host.clone()));
        SmtpClientBuilder {
            host,
            port: None,
            tls,
            hello_name: ClientId::default(),
            lmtp: false,
            local_address: None,
            timeouts: Timeouts::default(),
            auth_mechanism: None,
            envelope_only: false,
        }
    }

    /// Sets a fixed port instead of the TLS mode default.
    pub fn port(mut self, port: u16) -> SmtpClientBuilder {
        self.port = Some(port);
        self
    }

    /// Sets the TLS mode.
    pub fn tls(mut self, tls: Tls) -> SmtpClientBuilder {
        self.tls = tls;
        self
    }

    /// Sets the name sent in `EHLO`/`LHLO`/`HELO`.
    pub fn hello_name(mut self, name: ClientId) -> SmtpClientBuilder {
        self.hello_name = name;
        self
    }

    /// Switches the connection to the LMTP dialect.
    pub fn lmtp(mut self, lmtp: bool) -> SmtpClientBuilder {
        self.lmtp = lmtp;
        self
    }

    /// Binds the local end of the connection to a specific address.
    pub fn local_address(mut self, address: IpAddr) -> SmtpClientBuilder {
        self.local_address = Some(address);
        self
    }

    /// Sets the timeout windows.
    pub fn timeouts(mut self, timeouts: Timeouts) -> SmtpClientBuilder {
        self.timeouts = timeouts;
        self
    }

    /// Forces one authentication mechanism instead of the negotiated one.
    pub fn authentication_mechanism(mut self, mechanism: Mechanism) -> SmtpClientBuilder {
        self.auth_mechanism = Some(mechanism);
        self
    }

    /// Stops submissions after the RCPT phase, without sending `DATA`.
    ///
    /// Useful for verifying an envelope against a relay without
    /// transmitting a message.
    pub fn envelope_only(mut self, envelope_only: bool) -> SmtpClientBuilder {
        self.envelope_only = envelope_only;
        self
    }

    /// Freezes the configuration.
    pub fn build(self) -> SmtpClient {
        SmtpClient {
            host: self.host,
            port: self.port,
            tls: self.tls,
            hello_name: self.hello_name,
            lmtp: self.lmtp,
            local_address: self.local_address,
            timeouts: self.timeouts,
            auth_mechanism: self.auth_mechanism,
            envelope_only: self.envelope_only,
        }
    }
}

/// An immutable client configuration.
///
/// Opening a connection does not consume the client; one configuration can
/// open any number of connections.
#[derive(Clone, Debug)]
pub struct SmtpClient {
    pub(crate) host: String,
    pub(crate) port: Option<u16>,
    pub(crate) tls: Tls,
    pub(crate) hello_name: ClientId,
    pub(crate) lmtp: bool,
    pub(crate) local_address: Option<IpAddr>,
    pub(crate) timeouts: Timeouts,
    pub(crate) auth_mechanism: Option<Mechanism>,
    pub(crate) envelope_only: bool,
}

impl SmtpClient {
    /// Connects and drives the session to its ready state: greeting,
    /// EHLO/LHLO, and the STARTTLS upgrade with its second hello when the
    /// TLS mode calls for one.
    pub fn connect(&self) -> Result<SmtpConnection, Error> {
        SmtpConnection::open(self)
    }

    pub(crate) fn effective_port(&self) -> u16 {
        self.port.unwrap_or(match self.tls {
            Tls::Wrapper(_) => SUBMISSIONS_PORT,
            _ => SMTP_PORT,
        })
    }
}
