//! Missive is an SMTP/LMTP client engine for submitting mail to a relay.
//! It provides:
//!
//! * The full submission session: greeting, EHLO capability negotiation,
//!   STARTTLS upgrades, authentication and the envelope/DATA transaction
//! * PLAIN, LOGIN, CRAM-MD5, XOAUTH2 and NTLM authentication
//! * Per-recipient accounting with PIPELINING and LMTP support
//! * Streaming message bodies through a dot-stuffing transfer encoder
//!
//! Message construction is out of scope; the engine takes an envelope and
//! raw message bytes.
//!
//! ```rust,no_run
//! use missive::{Credentials, Envelope, SmtpClientBuilder, Tls, TlsParameters};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let client = SmtpClientBuilder::new("mail.example.org")
//!     .port(587)
//!     .tls(Tls::Required(TlsParameters::new("mail.example.org")))
//!     .build();
//!
//! let mut conn = client.connect()?;
//! conn.login(&Credentials::basic("user", "password"))?;
//!
//! let envelope = Envelope::new(
//!     "sender@example.org",
//!     vec!["recipient@example.net".to_owned()],
//! )?;
//! let receipt = conn.send(&envelope, b"Subject: hello\r\n\r\nHi!\r\n")?;
//! println!("accepted: {:?}", receipt.accepted());
//!
//! conn.quit();
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(trivial_casts, trivial_numeric_casts, unused_import_braces)]

pub mod envelope;
pub mod smtp;

pub use crate::envelope::{DsnNotify, DsnParameters, DsnReturn, Envelope, EnvelopeError};
pub use crate::smtp::{
    authentication::{AccessToken, Credentials, Mechanism, NtlmMessageSource, TokenProvider},
    client::{DeliveryReceipt, SmtpConnection, TlsParameters},
    error::{BoxError, Error, Rejection},
    extension::{ClientId, Extension, ServerInfo},
    SmtpClient, SmtpClientBuilder, Timeouts, Tls,
};
