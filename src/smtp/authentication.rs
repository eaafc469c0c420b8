//! Authentication mechanisms, credentials and the pure response builders
//! the dialogue is assembled from

use std::{
    fmt::{self, Display, Formatter},
    sync::Arc,
};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use hmac::{Hmac, Mac};
use md5::Md5;

use crate::smtp::error::{self, BoxError, Error};

/// Supported authentication mechanisms
#[derive(PartialEq, Eq, Copy, Clone, Hash, Debug)]
pub enum Mechanism {
    /// RFC 4616
    Plain,
    /// Obsolete but still widely deployed username/password dialogue
    Login,
    /// RFC 2195
    CramMd5,
    /// OAuth 2 bearer tokens as used by the large providers
    Xoauth2,
    /// NT LAN Manager; never advertised by servers, selected explicitly
    /// when the caller supplies a domain
    Ntlm,
}

impl Display for Mechanism {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Mechanism::Plain => f.write_str("PLAIN"),
            Mechanism::Login => f.write_str("LOGIN"),
            Mechanism::CramMd5 => f.write_str("CRAM-MD5"),
            Mechanism::Xoauth2 => f.write_str("XOAUTH2"),
            Mechanism::Ntlm => f.write_str("NTLM"),
        }
    }
}

impl Mechanism {
    /// Parses an `AUTH` keyword from an EHLO reply.
    ///
    /// NTLM is deliberately absent: it is selected through credentials, not
    /// through server advertisement.
    pub(crate) fn from_keyword(keyword: &str) -> Option<Mechanism> {
        if keyword.eq_ignore_ascii_case("PLAIN") {
            Some(Mechanism::Plain)
        } else if keyword.eq_ignore_ascii_case("LOGIN") {
            Some(Mechanism::Login)
        } else if keyword.eq_ignore_ascii_case("CRAM-MD5") {
            Some(Mechanism::CramMd5)
        } else if keyword.eq_ignore_ascii_case("XOAUTH2") {
            Some(Mechanism::Xoauth2)
        } else {
            None
        }
    }

    /// Does the mechanism carry an initial response on the AUTH line
    pub fn supports_initial_response(self) -> bool {
        matches!(self, Mechanism::Plain | Mechanism::Xoauth2 | Mechanism::Ntlm)
    }
}

/// Source of OAuth 2 access tokens.
///
/// `refresh_token` is consulted once after the server rejects the current
/// token; implementations are expected to mint a fresh one.
pub trait TokenProvider: Send + Sync {
    /// Returns the current access token
    fn access_token(&self) -> Result<String, BoxError>;

    /// Returns a fresh access token after the current one was rejected
    fn refresh_token(&self) -> Result<String, BoxError>;
}

/// An XOAUTH2 bearer token
#[derive(Clone)]
pub enum AccessToken {
    /// A fixed token string; rejection is final, there is nothing to refresh
    Static(String),
    /// A token source that can mint a replacement on rejection
    Provider(Arc<dyn TokenProvider>),
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            AccessToken::Static(_) => f.write_str("AccessToken::Static(..)"),
            AccessToken::Provider(_) => f.write_str("AccessToken::Provider(..)"),
        }
    }
}

/// External NTLM message formatter.
///
/// The engine drives the dialogue; building and parsing the binary NTLM
/// messages is delegated to the implementation. Returned messages are
/// base64, with or without the `NTLM ` prefix some formatters emit.
pub trait NtlmMessageSource: Send + Sync {
    /// Builds the Type 1 negotiation message
    fn negotiate(&self, domain: &str, workstation: &str) -> Result<String, BoxError>;

    /// Parses the Type 2 challenge and builds the Type 3 response
    fn authenticate(
        &self,
        challenge: &str,
        username: &str,
        password: &str,
        domain: &str,
        workstation: &str,
    ) -> Result<String, BoxError>;
}

/// Credentials for a [`login`](crate::SmtpConnection::login) call
#[derive(Clone)]
pub enum Credentials {
    /// Username and password, for PLAIN, LOGIN and CRAM-MD5
    Basic {
        /// Authentication identity
        username: String,
        /// Shared secret
        password: String,
    },
    /// Username and bearer token, for XOAUTH2
    Xoauth2 {
        /// Authentication identity
        username: String,
        /// Bearer token or token source
        token: AccessToken,
    },
    /// Windows domain credentials, for NTLM
    Ntlm {
        /// Authentication identity
        username: String,
        /// Shared secret
        password: String,
        /// Windows domain
        domain: String,
        /// Workstation name
        workstation: String,
        /// External message formatter
        messages: Arc<dyn NtlmMessageSource>,
    },
}

impl Credentials {
    /// Username/password credentials
    pub fn basic<S: Into<String>, T: Into<String>>(username: S, password: T) -> Credentials {
        Credentials::Basic {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Bearer token credentials
    pub fn xoauth2<S: Into<String>>(username: S, token: AccessToken) -> Credentials {
        Credentials::Xoauth2 {
            username: username.into(),
            token,
        }
    }

    /// Windows domain credentials
    pub fn ntlm<S: Into<String>>(
        username: S,
        password: S,
        domain: S,
        workstation: S,
        messages: Arc<dyn NtlmMessageSource>,
    ) -> Credentials {
        Credentials::Ntlm {
            username: username.into(),
            password: password.into(),
            domain: domain.into(),
            workstation: workstation.into(),
            messages,
        }
    }

    /// Whether these credentials can drive the given mechanism
    pub(crate) fn supports(&self, mechanism: Mechanism) -> bool {
        match self {
            Credentials::Basic { .. } => matches!(
                mechanism,
                Mechanism::Plain | Mechanism::Login | Mechanism::CramMd5
            ),
            Credentials::Xoauth2 { .. } => mechanism == Mechanism::Xoauth2,
            Credentials::Ntlm { .. } => mechanism == Mechanism::Ntlm,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Basic { username, .. } => f
                .debug_struct("Credentials::Basic")
                .field("username", username)
                .finish_non_exhaustive(),
            Credentials::Xoauth2 { username, .. } => f
                .debug_struct("Credentials::Xoauth2")
                .field("username", username)
                .finish_non_exhaustive(),
            Credentials::Ntlm {
                username,
                domain,
                workstation,
                ..
            } => f
                .debug_struct("Credentials::Ntlm")
                .field("username", username)
                .field("domain", domain)
                .field("workstation", workstation)
                .finish_non_exhaustive(),
        }
    }
}

// Exact prompts the LOGIN dialogue must produce, base64 of "Username:"
// and "Password:".
pub(crate) const LOGIN_USERNAME_CHALLENGE: &str = "VXNlcm5hbWU6";
pub(crate) const LOGIN_PASSWORD_CHALLENGE: &str = "UGFzc3dvcmQ6";

/// PLAIN initial response. The authorization identity is left empty.
pub(crate) fn plain_response(username: &str, password: &str) -> String {
    BASE64.encode(format!("\0{username}\0{password}"))
}

/// LOGIN answer to either prompt
pub(crate) fn login_response(value: &str) -> String {
    BASE64.encode(value)
}

/// CRAM-MD5 answer: `base64(user SP hex(hmac-md5(pass, challenge)))`
pub(crate) fn cram_md5_response(
    username: &str,
    password: &str,
    encoded_challenge: &str,
) -> Result<String, Error> {
    let challenge = BASE64.decode(encoded_challenge).map_err(error::auth)?;

    let mut mac = Hmac::<Md5>::new_from_slice(password.as_bytes()).map_err(error::auth)?;
    mac.update(&challenge);
    let digest = mac.finalize().into_bytes();

    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest.iter() {
        hex.push_str(&format!("{byte:02x}"));
    }

    Ok(BASE64.encode(format!("{username} {hex}")))
}

/// XOAUTH2 initial response: `base64("user=" u "\x01auth=Bearer " t "\x01\x01")`
pub(crate) fn xoauth2_response(username: &str, token: &str) -> String {
    BASE64.encode(format!("user={username}\x01auth=Bearer {token}\x01\x01"))
}

/// Strips the `NTLM ` prefix a formatter may have included
pub(crate) fn strip_ntlm_prefix(message: &str) -> &str {
    message.strip_prefix("NTLM ").unwrap_or(message)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_plain() {
        assert_eq!(
            plain_response("username", "password"),
            "AHVzZXJuYW1lAHBhc3N3b3Jk"
        );
    }

    #[test]
    fn test_login_prompts() {
        assert_eq!(BASE64.decode(LOGIN_USERNAME_CHALLENGE).unwrap(), b"Username:");
        assert_eq!(BASE64.decode(LOGIN_PASSWORD_CHALLENGE).unwrap(), b"Password:");
        assert_eq!(login_response("user"), "dXNlcg==");
    }

    #[test]
    fn test_cram_md5_rfc_2195_example() {
        // Challenge is base64("<12345@example.com>")
        let reply = cram_md5_response(
            "tim",
            "tanstaaftanstaaf",
            "PDEyMzQ1QGV4YW1wbGUuY29tPg==",
        )
        .unwrap();
        assert_eq!(
            BASE64.decode(&reply).unwrap(),
            b"tim 00c19b9a21e715c2f87eaea2210ac37c"
        );
    }

    #[test]
    fn test_cram_md5_rejects_invalid_challenge() {
        assert!(cram_md5_response("tim", "secret", "not base64!").is_err());
    }

    #[test]
    fn test_xoauth2_payload_round_trip() {
        let reply = xoauth2_response("someuser@example.com", "ya29.token");
        assert_eq!(
            BASE64.decode(&reply).unwrap(),
            b"user=someuser@example.com\x01auth=Bearer ya29.token\x01\x01"
        );
    }

    #[test]
    fn test_ntlm_prefix_stripping() {
        assert_eq!(strip_ntlm_prefix("NTLM TlRMTVNTUAAB"), "TlRMTVNTUAAB");
        assert_eq!(strip_ntlm_prefix("TlRMTVNTUAAB"), "TlRMTVNTUAAB");
    }

    #[test]
    fn test_keyword_parsing_is_case_insensitive() {
        assert_eq!(Mechanism::from_keyword("plain"), Some(Mechanism::Plain));
        assert_eq!(Mechanism::from_keyword("Cram-Md5"), Some(Mechanism::CramMd5));
        assert_eq!(Mechanism::from_keyword("XOAUTH2"), Some(Mechanism::Xoauth2));
        assert_eq!(Mechanism::from_keyword("NTLM"), None);
        assert_eq!(Mechanism::from_keyword("GSSAPI"), None);
    }

    #[test]
    fn test_credential_mechanism_fit() {
        let basic = Credentials::basic("u", "p");
        assert!(basic.supports(Mechanism::Plain));
        assert!(basic.supports(Mechanism::Login));
        assert!(basic.supports(Mechanism::CramMd5));
        assert!(!basic.supports(Mechanism::Xoauth2));

        let xoauth2 = Credentials::xoauth2("u", AccessToken::Static("t".to_owned()));
        assert!(xoauth2.supports(Mechanism::Xoauth2));
        assert!(!xoauth2.supports(Mechanism::Plain));
    }
}
