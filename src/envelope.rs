//! Mail envelope: reverse path, recipients and transmission parameters.
//!
//! The envelope is the RFC 5321 sender/recipient set handed to the relay,
//! distinct from whatever addresses appear in the message headers.

use std::{error::Error as StdError, fmt};

/// `RET` parameter of a delivery status notification request (RFC 3461).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DsnReturn {
    /// Return the full message in the notification
    Full,
    /// Return only the message headers
    Headers,
}

impl fmt::Display for DsnReturn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DsnReturn::Full => f.write_str("FULL"),
            DsnReturn::Headers => f.write_str("HDRS"),
        }
    }
}

/// `NOTIFY` condition of a delivery status notification request.
///
/// `Never` suppresses notifications entirely and cannot be combined with the
/// other conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DsnNotify {
    /// Never send a notification
    Never,
    /// Notify on successful delivery
    Success,
    /// Notify on delivery failure
    Failure,
    /// Notify on delayed delivery
    Delay,
}

impl fmt::Display for DsnNotify {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DsnNotify::Never => f.write_str("NEVER"),
            DsnNotify::Success => f.write_str("SUCCESS"),
            DsnNotify::Failure => f.write_str("FAILURE"),
            DsnNotify::Delay => f.write_str("DELAY"),
        }
    }
}

/// Delivery status notification parameters attached to an envelope.
///
/// Rendered onto `MAIL FROM` (`RET`, `ENVID`) and `RCPT TO` (`NOTIFY`,
/// `ORCPT`) when the server advertises `DSN`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DsnParameters {
    pub(crate) ret: Option<DsnReturn>,
    pub(crate) envid: Option<String>,
    pub(crate) notify: Option<Vec<DsnNotify>>,
    pub(crate) orcpt: Option<String>,
}

impl DsnParameters {
    /// Creates an empty parameter set.
    pub fn new() -> DsnParameters {
        DsnParameters::default()
    }

    /// Sets the `RET` parameter.
    pub fn ret(mut self, ret: DsnReturn) -> DsnParameters {
        self.ret = Some(ret);
        self
    }

    /// Sets the `ENVID` envelope identifier.
    pub fn envid<S: Into<String>>(mut self, envid: S) -> DsnParameters {
        self.envid = Some(envid.into());
        self
    }

    /// Sets the `NOTIFY` conditions.
    pub fn notify(mut self, notify: Vec<DsnNotify>) -> DsnParameters {
        self.notify = Some(notify);
        self
    }

    /// Sets the `ORCPT` original recipient.
    pub fn orcpt<S: Into<String>>(mut self, orcpt: S) -> DsnParameters {
        self.orcpt = Some(orcpt.into());
        self
    }
}

/// A mail envelope.
///
/// Addresses are kept as strings; construction rejects anything that could
/// break out of the `MAIL FROM:<..>` / `RCPT TO:<..>` angle-bracket framing,
/// so no address reaches the wire unchecked. An empty sender renders as the
/// null reverse path `<>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    from: String,
    to: Vec<String>,
    size: Option<u64>,
    eight_bit_mime: bool,
    dsn: Option<DsnParameters>,
}

impl Envelope {
    /// Creates a new envelope, which may fail if `to` is empty or any
    /// address contains CR, LF or angle brackets.
    pub fn new<S: Into<String>>(from: S, to: Vec<String>) -> Result<Envelope, EnvelopeError> {
        if to.is_empty() {
            return Err(EnvelopeError::MissingTo);
        }
        let from = from.into();
        check_address(&from)?;
        for recipient in &to {
            check_address(recipient)?;
        }
        Ok(Envelope {
            from,
            to,
            size: None,
            eight_bit_mime: false,
            dsn: None,
        })
    }

    /// Declares the message size, announced through the `SIZE` parameter.
    pub fn with_size(mut self, size: u64) -> Envelope {
        self.size = Some(size);
        self
    }

    /// Requests `BODY=8BITMIME` when the server supports it.
    pub fn with_eight_bit_mime(mut self, enabled: bool) -> Envelope {
        self.eight_bit_mime = enabled;
        self
    }

    /// Attaches delivery status notification parameters.
    ///
    /// Fails if `NOTIFY=NEVER` is combined with any other condition.
    pub fn with_dsn(mut self, dsn: DsnParameters) -> Result<Envelope, EnvelopeError> {
        if let Some(notify) = &dsn.notify {
            if notify.contains(&DsnNotify::Never) && notify.len() > 1 {
                return Err(EnvelopeError::ConflictingNotify);
            }
        }
        self.dsn = Some(dsn);
        Ok(self)
    }

    /// Envelope sender address.
    pub fn from(&self) -> &str {
        &self.from
    }

    /// Envelope recipient addresses, in submission order.
    pub fn to(&self) -> &[String] {
        &self.to
    }

    /// Declared message size, if any.
    pub fn size(&self) -> Option<u64> {
        self.size
    }

    /// Whether `BODY=8BITMIME` was requested.
    pub fn eight_bit_mime(&self) -> bool {
        self.eight_bit_mime
    }

    /// Attached DSN parameters, if any.
    pub fn dsn(&self) -> Option<&DsnParameters> {
        self.dsn.as_ref()
    }

    pub(crate) fn has_non_ascii(&self) -> bool {
        !self.from.is_ascii() || self.to.iter().any(|to| !to.is_ascii())
    }
}

fn check_address(address: &str) -> Result<(), EnvelopeError> {
    if address.contains(['\r', '\n', '<', '>']) {
        return Err(EnvelopeError::InvalidAddress(address.to_owned()));
    }
    Ok(())
}

/// Errors raised while building an [`Envelope`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    /// The recipient list is empty
    MissingTo,
    /// An address contains CR, LF or angle brackets
    InvalidAddress(String),
    /// `NOTIFY=NEVER` combined with another condition
    ConflictingNotify,
}

impl fmt::Display for EnvelopeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvelopeError::MissingTo => f.write_str("missing destination address"),
            EnvelopeError::InvalidAddress(address) => {
                write!(f, "invalid address: {address:?}")
            }
            EnvelopeError::ConflictingNotify => {
                f.write_str("NOTIFY=NEVER excludes all other notify conditions")
            }
        }
    }
}

impl StdError for EnvelopeError {}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn envelope_requires_recipients() {
        assert_eq!(
            Envelope::new("a@example.com", vec![]).unwrap_err(),
            EnvelopeError::MissingTo
        );
    }

    #[test]
    fn envelope_allows_null_sender() {
        let envelope = Envelope::new("", vec!["b@example.com".to_owned()]).unwrap();
        assert_eq!(envelope.from(), "");
    }

    #[test]
    fn envelope_rejects_framing_characters() {
        for bad in ["a@b\r", "a@b\nX", "<a@b", "a@b>"] {
            assert!(matches!(
                Envelope::new(bad, vec!["ok@example.com".to_owned()]),
                Err(EnvelopeError::InvalidAddress(_))
            ));
        }
        assert!(matches!(
            Envelope::new("ok@example.com", vec!["bad<@example.com".to_owned()]),
            Err(EnvelopeError::InvalidAddress(_))
        ));
    }

    #[test]
    fn notify_never_is_exclusive() {
        let envelope = Envelope::new("a@x", vec!["b@y".to_owned()]).unwrap();
        assert_eq!(
            envelope
                .clone()
                .with_dsn(DsnParameters::new().notify(vec![DsnNotify::Never, DsnNotify::Failure]))
                .unwrap_err(),
            EnvelopeError::ConflictingNotify
        );
        assert!(envelope
            .with_dsn(DsnParameters::new().notify(vec![DsnNotify::Never]))
            .is_ok());
    }

    #[test]
    fn non_ascii_detection_covers_sender_and_recipients() {
        let plain = Envelope::new("a@x", vec!["b@y".to_owned()]).unwrap();
        assert!(!plain.has_non_ascii());
        let sender = Envelope::new("jøran@x", vec!["b@y".to_owned()]).unwrap();
        assert!(sender.has_non_ascii());
        let recipient = Envelope::new("a@x", vec!["b@y".to_owned(), "bjørn@y".to_owned()]).unwrap();
        assert!(recipient.has_non_ascii());
    }
}
