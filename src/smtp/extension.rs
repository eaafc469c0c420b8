//! ESMTP capabilities and transaction parameters

use std::{
    collections::HashSet,
    fmt::{self, Display, Formatter},
    net::{Ipv4Addr, Ipv6Addr},
};

use crate::{
    envelope::{DsnNotify, DsnReturn},
    smtp::{
        authentication::Mechanism,
        error::{self, Error},
        response::Response,
        util::XText,
    },
};

/// Client identifier, the parameter to `EHLO`, `LHLO` and `HELO`
#[derive(PartialEq, Eq, Clone, Debug)]
#[non_exhaustive]
pub enum ClientId {
    /// A fully qualified domain name
    Domain(String),
    /// An IPv4 address literal
    Ipv4(Ipv4Addr),
    /// An IPv6 address literal
    Ipv6(Ipv6Addr),
}

const LOCALHOST_CLIENT: ClientId = ClientId::Ipv4(Ipv4Addr::new(127, 0, 0, 1));

impl Default for ClientId {
    fn default() -> Self {
        // RFC 5321 wants a primary host name here, and an address literal
        // when the machine has no usable one. A hostname without a dot is
        // not qualified, so it falls back to the literal.
        hostname::get()
            .ok()
            .and_then(|name| name.into_string().ok())
            .filter(|name| name.contains('.'))
            .map(ClientId::Domain)
            .unwrap_or(LOCALHOST_CLIENT)
    }
}

impl Display for ClientId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ClientId::Domain(value) => f.write_str(value),
            ClientId::Ipv4(value) => write!(f, "[{value}]"),
            ClientId::Ipv6(value) => write!(f, "[IPv6:{value}]"),
        }
    }
}

/// Recognized ESMTP keywords
#[derive(PartialEq, Eq, Hash, Copy, Clone, Debug)]
#[non_exhaustive]
pub enum Extension {
    /// 8BITMIME, RFC 6152
    EightBitMime,
    /// SMTPUTF8, RFC 6531
    SmtpUtfEight,
    /// STARTTLS, RFC 2487
    StartTls,
    /// PIPELINING, RFC 2920
    Pipelining,
    /// DSN, RFC 3461
    Dsn,
}

impl Display for Extension {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Extension::EightBitMime => f.write_str("8BITMIME"),
            Extension::SmtpUtfEight => f.write_str("SMTPUTF8"),
            Extension::StartTls => f.write_str("STARTTLS"),
            Extension::Pipelining => f.write_str("PIPELINING"),
            Extension::Dsn => f.write_str("DSN"),
        }
    }
}

/// The capability registry built from an `EHLO` or `LHLO` reply.
///
/// Rebuilt from scratch on every greeting exchange, including the second
/// one after a STARTTLS upgrade.
#[derive(Clone, Debug, Eq, PartialEq, Default)]
pub struct ServerInfo {
    /// The name given in the greeting banner
    name: String,
    /// Recognized extensions advertised by the server
    features: HashSet<Extension>,
    /// Advertised AUTH mechanisms, in order of appearance
    auth: Vec<Mechanism>,
    /// `SIZE` announcement; `Some(0)` means no fixed limit
    max_size: Option<u64>,
}

impl Display for ServerInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.features.is_empty() && self.auth.is_empty() {
            write!(f, "{} with no supported features", self.name)
        } else {
            write!(f, "{} with {:?}, auth {:?}", self.name, self.features, self.auth)
        }
    }
}

impl ServerInfo {
    /// Parses an `EHLO`/`LHLO` reply into a `ServerInfo`.
    ///
    /// Keywords are matched case-insensitively; unknown keywords are
    /// ignored.
    pub fn from_response(response: &Response) -> Result<ServerInfo, Error> {
        let name = match response.first_word() {
            Some(name) => name.to_owned(),
            None => return Err(error::protocol("could not read server name")),
        };

        let mut info = ServerInfo {
            name,
            ..ServerInfo::default()
        };

        for line in response.message().skip(1) {
            if line.is_empty() {
                continue;
            }

            let mut words = line.split_whitespace();
            let keyword = match words.next() {
                Some(keyword) => keyword.to_ascii_uppercase(),
                None => continue,
            };
            match keyword.as_str() {
                "8BITMIME" => {
                    info.features.insert(Extension::EightBitMime);
                }
                "SMTPUTF8" => {
                    info.features.insert(Extension::SmtpUtfEight);
                }
                "STARTTLS" => {
                    info.features.insert(Extension::StartTls);
                }
                "PIPELINING" => {
                    info.features.insert(Extension::Pipelining);
                }
                "DSN" => {
                    info.features.insert(Extension::Dsn);
                }
                "SIZE" => {
                    let limit = words.next().and_then(|n| n.parse::<u64>().ok());
                    info.max_size = Some(limit.unwrap_or(0));
                }
                "AUTH" => {
                    for word in words {
                        if let Some(mechanism) = Mechanism::from_keyword(word) {
                            if !info.auth.contains(&mechanism) {
                                info.auth.push(mechanism);
                            }
                        }
                    }
                }
                _ => {}
            }
        }

        Ok(info)
    }

    /// Builds a registry with no capabilities, as left by a `HELO` fallback.
    pub(crate) fn bare(name: &str) -> ServerInfo {
        ServerInfo {
            name: name.to_owned(),
            ..ServerInfo::default()
        }
    }

    /// Checks if the server advertised an extension
    pub fn supports(&self, keyword: Extension) -> bool {
        self.features.contains(&keyword)
    }

    /// Checks if the server advertised an AUTH mechanism
    pub fn supports_auth(&self, mechanism: Mechanism) -> bool {
        self.auth.contains(&mechanism)
    }

    /// Advertised AUTH mechanisms, in order of appearance
    pub fn auth_mechanisms(&self) -> &[Mechanism] {
        &self.auth
    }

    /// The advertised `SIZE` limit; `Some(0)` means no fixed limit
    pub fn max_size(&self) -> Option<u64> {
        self.max_size
    }

    /// The name given in the greeting banner
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A `MAIL FROM` extension parameter
#[derive(PartialEq, Eq, Clone, Debug)]
pub enum MailParameter {
    /// `BODY` parameter
    Body(MailBodyParameter),
    /// `SIZE` parameter
    Size(u64),
    /// `SMTPUTF8` parameter
    SmtpUtfEight,
    /// `RET` DSN parameter
    Ret(DsnReturn),
    /// `ENVID` DSN parameter, xtext encoded on the wire
    Envid(String),
}

impl Display for MailParameter {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            MailParameter::Body(value) => write!(f, "BODY={value}"),
            MailParameter::Size(size) => write!(f, "SIZE={size}"),
            MailParameter::SmtpUtfEight => f.write_str("SMTPUTF8"),
            MailParameter::Ret(ret) => write!(f, "RET={ret}"),
            MailParameter::Envid(envid) => write!(f, "ENVID={}", XText(envid)),
        }
    }
}

/// Values for the `BODY` parameter to `MAIL FROM`
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum MailBodyParameter {
    /// `7BIT`
    SevenBit,
    /// `8BITMIME`
    EightBitMime,
}

impl Display for MailBodyParameter {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            MailBodyParameter::SevenBit => f.write_str("7BIT"),
            MailBodyParameter::EightBitMime => f.write_str("8BITMIME"),
        }
    }
}

/// A `RCPT TO` extension parameter
#[derive(PartialEq, Eq, Clone, Debug)]
pub enum RcptParameter {
    /// `NOTIFY` DSN parameter
    Notify(Vec<DsnNotify>),
    /// `ORCPT` DSN parameter, xtext encoded on the wire
    Orcpt(String),
}

impl Display for RcptParameter {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            RcptParameter::Notify(conditions) => {
                f.write_str("NOTIFY=")?;
                for (i, condition) in conditions.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{condition}")?;
                }
                Ok(())
            }
            RcptParameter::Orcpt(address) => write!(f, "ORCPT=rfc822;{}", XText(address)),
        }
    }
}
