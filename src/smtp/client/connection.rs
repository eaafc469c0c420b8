//! The stateful SMTP/LMTP connection

use std::{
    fmt::Display,
    io::{Read, Write},
    time::{Duration, Instant},
};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rand::Rng;

use super::{escape_crlf, net::NetworkStream, DataCodec};
use crate::{
    envelope::Envelope,
    smtp::{
        authentication::{
            self, AccessToken, Credentials, Mechanism, LOGIN_PASSWORD_CHALLENGE,
            LOGIN_USERNAME_CHALLENGE,
        },
        commands::{Auth, Data, Ehlo, Helo, Lhlo, Mail, Noop, Quit, Rcpt, Rset, Starttls},
        error::{self, Error, Rejection},
        extension::{Extension, MailParameter, RcptParameter, ServerInfo},
        response::{ReplyReader, Response},
        SmtpClient, Tls,
    },
};

/// Outcome of a completed submission.
///
/// Per-recipient refusals are not operation failures as long as at least one
/// recipient was accepted; they are carried here instead.
#[derive(Clone, Debug)]
pub struct DeliveryReceipt {
    accepted: Vec<String>,
    rejected: Vec<String>,
    rejected_errors: Vec<Rejection>,
    response: String,
    envelope_time: Duration,
    message_time: Option<Duration>,
    message_size: Option<u64>,
}

impl DeliveryReceipt {
    /// Recipients the server accepted, in submission order
    pub fn accepted(&self) -> &[String] {
        &self.accepted
    }

    /// Recipients the server refused, in submission order
    pub fn rejected(&self) -> &[String] {
        &self.rejected
    }

    /// The refusal details matching [`rejected`](Self::rejected)
    pub fn rejected_errors(&self) -> &[Rejection] {
        &self.rejected_errors
    }

    /// The final server reply
    pub fn response(&self) -> &str {
        &self.response
    }

    /// Time spent on the MAIL and RCPT exchanges
    pub fn envelope_time(&self) -> Duration {
        self.envelope_time
    }

    /// Time spent streaming the body and collecting the delivery reply
    pub fn message_time(&self) -> Option<Duration> {
        self.message_time
    }

    /// Encoded message size in bytes, terminator excluded
    pub fn message_size(&self) -> Option<u64> {
        self.message_size
    }
}

/// A live connection to a mail relay.
///
/// Produced by [`SmtpClient::connect`](crate::SmtpClient::connect) once the
/// greeting and capability exchange are complete. All operations run on the
/// calling thread; the connection is single owner and never shared.
#[derive(Debug)]
pub struct SmtpConnection {
    id: String,
    stream: NetworkStream,
    reader: ReplyReader,
    server_info: ServerInfo,
    client: SmtpClient,
    authenticated: bool,
    closed: bool,
}

impl SmtpConnection {
    /// Opens the transport and drives the session to its ready state.
    pub(crate) fn open(client: &SmtpClient) -> Result<SmtpConnection, Error> {
        let port = client.effective_port();
        let mut stream = NetworkStream::connect(
            &client.host,
            port,
            client.timeouts.connect,
            client.local_address,
        )?;
        if let Tls::Wrapper(parameters) = &client.tls {
            stream.upgrade_tls(parameters)?;
        }
        tracing::debug!(host = %client.host, port, "connection established");
        Self::start(stream, client.clone())
    }

    /// Runs the greeting, hello and STARTTLS phases over an open stream.
    pub(crate) fn start(stream: NetworkStream, client: SmtpClient) -> Result<SmtpConnection, Error> {
        let mut conn = SmtpConnection {
            id: connection_id(),
            stream,
            reader: ReplyReader::default(),
            server_info: ServerInfo::default(),
            client,
            authenticated: false,
            closed: false,
        };
        match conn.handshake() {
            Ok(()) => Ok(conn),
            Err(err) => {
                conn.close();
                Err(err)
            }
        }
    }

    fn handshake(&mut self) -> Result<(), Error> {
        self.stream
            .set_read_timeout(Some(self.client.timeouts.greeting))
            .map_err(error::io)?;

        let greeting = self.read_response()?;
        if !greeting.has_code(220) {
            return Err(if greeting.has_code(421) {
                error::connection(greeting.text()).with_code(greeting.code())
            } else {
                error::protocol(greeting.text()).with_code(greeting.code())
            });
        }

        self.stream
            .set_read_timeout(Some(self.client.timeouts.idle))
            .map_err(error::io)?;
        self.stream
            .set_write_timeout(Some(self.client.timeouts.idle))
            .map_err(error::io)?;

        self.hello()?;
        self.starttls()?;
        tracing::debug!(conn = %self.id, server = %self.server_info, "session ready");
        Ok(())
    }

    /// Sends `EHLO`/`LHLO` and rebuilds the capability registry, falling
    /// back to `HELO` where that is allowed.
    fn hello(&mut self) -> Result<(), Error> {
        let client_id = self.client.hello_name.clone();

        if self.client.lmtp {
            let reply = self.command(Lhlo::new(client_id))?;
            if !reply.is_success() {
                return Err(self.hello_failure(&reply, "LHLO"));
            }
            self.server_info = ServerInfo::from_response(&reply)?;
            return Ok(());
        }

        let reply = self.command(Ehlo::new(client_id.clone()))?;
        if reply.is_success() {
            self.server_info = ServerInfo::from_response(&reply)?;
            return Ok(());
        }
        if reply.has_code(421) {
            return Err(self.hello_failure(&reply, "EHLO"));
        }
        if matches!(self.client.tls, Tls::Required(_)) {
            // TLS needs STARTTLS and STARTTLS needs EHLO, so no fallback
            return Err(error::protocol("EHLO rejected while TLS is required")
                .with_code(reply.code())
                .with_command("EHLO"));
        }

        let reply = self.command(Helo::new(client_id))?;
        if !reply.is_success() {
            return Err(self.hello_failure(&reply, "HELO"));
        }
        self.server_info = ServerInfo::bare(reply.first_word().unwrap_or_default());
        Ok(())
    }

    fn hello_failure(&self, reply: &Response, command: &'static str) -> Error {
        if reply.has_code(421) {
            error::connection(reply.text())
                .with_code(reply.code())
                .with_command(command)
        } else {
            error::protocol(reply.text())
                .with_code(reply.code())
                .with_command(command)
        }
    }

    /// Upgrades to TLS when the configuration and the server allow it,
    /// then repeats the hello exchange on the encrypted stream.
    fn starttls(&mut self) -> Result<(), Error> {
        let parameters = match &self.client.tls {
            Tls::None | Tls::Wrapper(_) => return Ok(()),
            Tls::Opportunistic(parameters) | Tls::Required(parameters) => parameters.clone(),
        };
        if self.stream.is_encrypted() {
            return Ok(());
        }

        let required = matches!(self.client.tls, Tls::Required(_));
        // A required upgrade is attempted even without the advertisement;
        // the server gets to say no itself
        if !self.server_info.supports(Extension::StartTls) && !required {
            return Ok(());
        }

        let reply = self.command(Starttls)?;
        if !reply.is_success() {
            if required {
                return Err(error::tls(reply.text())
                    .with_code(reply.code())
                    .with_command("STARTTLS"));
            }
            tracing::debug!(conn = %self.id, code = %reply.code(), "STARTTLS refused, continuing in plaintext");
            return Ok(());
        }

        // Upgrade barrier: nothing may be read from or written to the
        // plaintext stream past this point
        self.reader.reset();
        self.stream.upgrade_tls(&parameters)?;
        tracing::debug!(conn = %self.id, "connection encrypted");

        // The registry obtained in plaintext is untrusted; rebuild it
        self.hello()
    }

    /// Information advertised by the server in the latest hello exchange
    pub fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }

    /// Tells if the transport is currently encrypted
    pub fn is_encrypted(&self) -> bool {
        self.stream.is_encrypted()
    }

    /// Tells if authentication has completed on this connection
    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Authenticates using the most fitting mechanism.
    ///
    /// An explicitly configured mechanism wins; otherwise XOAUTH2 is used
    /// when the credentials carry a token and the server advertises it,
    /// NTLM when the credentials carry a domain, and the first advertised
    /// mechanism the credentials can drive otherwise, defaulting to PLAIN.
    pub fn login(&mut self, credentials: &Credentials) -> Result<(), Error> {
        let mechanism = match self.client.auth_mechanism {
            Some(mechanism) => mechanism,
            None => match credentials {
                Credentials::Xoauth2 { .. }
                    if self.server_info.supports_auth(Mechanism::Xoauth2) =>
                {
                    Mechanism::Xoauth2
                }
                Credentials::Ntlm { .. } => Mechanism::Ntlm,
                _ => self
                    .server_info
                    .auth_mechanisms()
                    .iter()
                    .copied()
                    .find(|mechanism| credentials.supports(*mechanism))
                    .unwrap_or(Mechanism::Plain),
            },
        };
        self.login_with(mechanism, credentials)
    }

    /// Authenticates using one specific mechanism.
    pub fn login_with(
        &mut self,
        mechanism: Mechanism,
        credentials: &Credentials,
    ) -> Result<(), Error> {
        let result = match mechanism {
            Mechanism::Plain => self.auth_plain(credentials),
            Mechanism::Login => self.auth_login(credentials),
            Mechanism::CramMd5 => self.auth_cram_md5(credentials),
            Mechanism::Xoauth2 => self.auth_xoauth2(credentials),
            Mechanism::Ntlm => self.auth_ntlm(credentials),
        };
        match result {
            Ok(()) => {
                self.authenticated = true;
                tracing::debug!(conn = %self.id, %mechanism, "authenticated");
                Ok(())
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    fn auth_plain(&mut self, credentials: &Credentials) -> Result<(), Error> {
        let (username, password) = basic_credentials(credentials, Mechanism::Plain)?;
        let initial = authentication::plain_response(&username, &password);
        let reply = self.command(Auth::new(Mechanism::Plain, Some(initial)))?;
        final_auth_reply(reply)
    }

    fn auth_login(&mut self, credentials: &Credentials) -> Result<(), Error> {
        let (username, password) = basic_credentials(credentials, Mechanism::Login)?;

        let reply = self.command(Auth::new(Mechanism::Login, None))?;
        expect_login_prompt(&reply, LOGIN_USERNAME_CHALLENGE)?;
        let reply = self.command_line(&authentication::login_response(&username))?;
        expect_login_prompt(&reply, LOGIN_PASSWORD_CHALLENGE)?;
        let reply = self.command_line(&authentication::login_response(&password))?;
        final_auth_reply(reply)
    }

    fn auth_cram_md5(&mut self, credentials: &Credentials) -> Result<(), Error> {
        let (username, password) = basic_credentials(credentials, Mechanism::CramMd5)?;

        let reply = self.command(Auth::new(Mechanism::CramMd5, None))?;
        if !reply.has_code(334) {
            return Err(auth_step_error("expected CRAM-MD5 challenge", &reply));
        }
        let challenge = reply
            .first_word()
            .ok_or_else(|| error::auth("empty CRAM-MD5 challenge"))?
            .to_owned();
        let answer = authentication::cram_md5_response(&username, &password, &challenge)?;
        final_auth_reply(self.command_line(&answer)?)
    }

    fn auth_xoauth2(&mut self, credentials: &Credentials) -> Result<(), Error> {
        let (username, token) = match credentials {
            Credentials::Xoauth2 { username, token } => (username.clone(), token.clone()),
            _ => return Err(error::auth("XOAUTH2 requires token credentials")),
        };

        let access_token = match &token {
            AccessToken::Static(value) => value.clone(),
            AccessToken::Provider(provider) => provider.access_token().map_err(error::auth)?,
        };

        let reply = self.xoauth2_exchange(&username, &access_token)?;
        if reply.has_code(235) {
            return Ok(());
        }

        // A fixed token cannot be replaced, so its rejection is final
        let provider = match &token {
            AccessToken::Provider(provider) => provider,
            AccessToken::Static(_) => {
                return Err(auth_step_error("invalid access token", &reply));
            }
        };

        // Randomized pause before the single retry with a fresh token
        #[cfg(not(test))]
        std::thread::sleep(Duration::from_secs(rand::thread_rng().gen_range(1..=5)));

        let fresh_token = provider.refresh_token().map_err(error::auth)?;
        let reply = self.xoauth2_exchange(&username, &fresh_token)?;
        final_auth_reply(reply)
    }

    /// One XOAUTH2 attempt. On 334 the server is offering error details;
    /// they are acknowledged with an empty line and the following reply is
    /// the verdict.
    fn xoauth2_exchange(&mut self, username: &str, token: &str) -> Result<Response, Error> {
        let initial = authentication::xoauth2_response(username, token);
        let reply = self.command(Auth::new(Mechanism::Xoauth2, Some(initial)))?;
        if reply.has_code(334) {
            return self.command_line("");
        }
        Ok(reply)
    }

    fn auth_ntlm(&mut self, credentials: &Credentials) -> Result<(), Error> {
        let (username, password, domain, workstation, messages) = match credentials {
            Credentials::Ntlm {
                username,
                password,
                domain,
                workstation,
                messages,
            } => (username, password, domain, workstation, messages.clone()),
            _ => return Err(error::auth("NTLM requires domain credentials")),
        };

        let negotiate = messages.negotiate(domain, workstation).map_err(error::auth)?;
        let negotiate = authentication::strip_ntlm_prefix(&negotiate).to_owned();
        let reply = self.command(Auth::new(Mechanism::Ntlm, Some(negotiate)))?;
        if !reply.has_code(334) {
            return Err(auth_step_error("expected NTLM challenge", &reply));
        }
        let challenge = reply
            .first_word()
            .ok_or_else(|| error::auth("empty NTLM challenge"))?
            .to_owned();

        let authenticate = messages
            .authenticate(&challenge, username, password, domain, workstation)
            .map_err(error::auth)?;
        let authenticate = authentication::strip_ntlm_prefix(&authenticate).to_owned();
        final_auth_reply(self.command_line(&authenticate)?)
    }

    /// Submits a message.
    pub fn send(&mut self, envelope: &Envelope, message: &[u8]) -> Result<DeliveryReceipt, Error> {
        if message.is_empty() {
            return Err(error::message("empty message body"));
        }
        self.send_stream(envelope, message)
    }

    /// Submits a message read from `body`.
    ///
    /// The body is streamed through the transfer encoder; a failure of the
    /// reader itself surfaces as a stream error.
    pub fn send_stream<R: Read>(
        &mut self,
        envelope: &Envelope,
        mut body: R,
    ) -> Result<DeliveryReceipt, Error> {
        match self.drive_send(envelope, &mut body) {
            Ok(receipt) => Ok(receipt),
            Err(err) => Err(self.fail(err)),
        }
    }

    fn drive_send<R: Read>(
        &mut self,
        envelope: &Envelope,
        body: &mut R,
    ) -> Result<DeliveryReceipt, Error> {
        let supports_utf8 = self.server_info.supports(Extension::SmtpUtfEight);
        let supports_8bit = self.server_info.supports(Extension::EightBitMime);
        let supports_dsn = self.server_info.supports(Extension::Dsn);
        let pipelining = self.server_info.supports(Extension::Pipelining);
        let max_size = self.server_info.max_size();

        if let (Some(size), Some(limit)) = (envelope.size(), max_size) {
            if limit > 0 && size > limit {
                return Err(error::message(format!(
                    "message size {size} exceeds server limit {limit}"
                ))
                .with_command("MAIL FROM"));
            }
        }

        let using_smtputf8 = envelope.has_non_ascii() && supports_utf8;

        let mut parameters = Vec::new();
        if using_smtputf8 {
            parameters.push(MailParameter::SmtpUtfEight);
        }
        if envelope.eight_bit_mime() && supports_8bit {
            parameters.push(MailParameter::Body(
                crate::smtp::extension::MailBodyParameter::EightBitMime,
            ));
        }
        if let Some(size) = envelope.size() {
            if max_size.is_some() {
                parameters.push(MailParameter::Size(size));
            }
        }
        if let Some(dsn) = envelope.dsn().filter(|_| supports_dsn) {
            if let Some(ret) = dsn.ret {
                parameters.push(MailParameter::Ret(ret));
            }
            if let Some(envid) = &dsn.envid {
                parameters.push(MailParameter::Envid(envid.clone()));
            }
        }

        let envelope_started = Instant::now();

        let reply = self.command(Mail::new(envelope.from().to_owned(), parameters))?;
        if !reply.is_success() {
            let text = if using_smtputf8 && !envelope.from().is_ascii() && reply.has_code(550) {
                "Internationalized mailbox name not allowed".to_owned()
            } else {
                reply.text()
            };
            return Err(error::envelope(text)
                .with_code(reply.code())
                .with_command("MAIL FROM"));
        }
        tracing::debug!(conn = %self.id, from = %envelope.from(), "sender accepted");

        let rcpt_parameters: Vec<RcptParameter> = match envelope.dsn().filter(|_| supports_dsn) {
            Some(dsn) => {
                let mut parameters = Vec::new();
                if let Some(notify) = &dsn.notify {
                    parameters.push(RcptParameter::Notify(notify.clone()));
                }
                if let Some(orcpt) = &dsn.orcpt {
                    parameters.push(RcptParameter::Orcpt(orcpt.clone()));
                }
                parameters
            }
            None => Vec::new(),
        };

        let mut accepted = Vec::new();
        let mut rejected = Vec::new();
        let mut rejected_errors = Vec::new();
        let mut last_reply = String::new();

        if pipelining {
            // All expected replies are accounted for before the first
            // command byte goes out, then the batch is written in one piece
            let mut batch = String::new();
            for recipient in envelope.to() {
                batch.push_str(&Rcpt::new(recipient.clone(), rcpt_parameters.clone()).to_string());
            }
            self.write_wire(batch.as_bytes())?;
            tracing::debug!(conn = %self.id, count = envelope.to().len(), "pipelined recipient batch written");
            for recipient in envelope.to() {
                let reply = self.read_response()?;
                last_reply = reply.to_string();
                record_recipient(
                    recipient,
                    &reply,
                    using_smtputf8,
                    &mut accepted,
                    &mut rejected,
                    &mut rejected_errors,
                );
            }
        } else {
            for recipient in envelope.to() {
                let reply =
                    self.command(Rcpt::new(recipient.clone(), rcpt_parameters.clone()))?;
                last_reply = reply.to_string();
                record_recipient(
                    recipient,
                    &reply,
                    using_smtputf8,
                    &mut accepted,
                    &mut rejected,
                    &mut rejected_errors,
                );
            }
        }

        if accepted.is_empty() {
            return Err(error::envelope("all recipients were rejected")
                .with_command("RCPT TO")
                .with_rejections(rejected_errors));
        }

        let envelope_time = envelope_started.elapsed();

        if self.client.envelope_only {
            self.expect_quiescent()?;
            return Ok(DeliveryReceipt {
                accepted,
                rejected,
                rejected_errors,
                response: last_reply,
                envelope_time,
                message_time: None,
                message_size: None,
            });
        }

        let reply = self.command(Data)?;
        // Both 354 and the occasional nonstandard 250 open the data channel
        if !reply.is_positive() {
            return Err(error::message(reply.text())
                .with_code(reply.code())
                .with_command("DATA"));
        }

        let message_started = Instant::now();
        let mut codec = DataCodec::new();
        let mut chunk = [0u8; 8192];
        let mut encoded = Vec::with_capacity(chunk.len() + 16);
        loop {
            let n = body.read(&mut chunk).map_err(error::stream)?;
            if n == 0 {
                break;
            }
            encoded.clear();
            codec.encode(&chunk[..n], &mut encoded);
            self.write_wire(&encoded)?;
        }
        encoded.clear();
        codec.finish(&mut encoded);
        self.write_wire(&encoded)?;
        tracing::debug!(
            conn = %self.id,
            bytes_in = codec.in_bytes(),
            bytes_out = codec.out_bytes(),
            "message data transmitted"
        );

        let response = if self.client.lmtp {
            // One verdict per accepted recipient, in acceptance order
            let mut delivered = Vec::new();
            let mut last = String::new();
            for recipient in accepted.drain(..) {
                let reply = self.read_response()?;
                last = reply.to_string();
                if reply.is_success() {
                    delivered.push(recipient);
                } else {
                    tracing::debug!(conn = %self.id, recipient = %recipient, code = %reply.code(), "delivery refused");
                    rejected.push(recipient.clone());
                    rejected_errors.push(Rejection::new(recipient, reply.code(), reply.text()));
                }
            }
            accepted = delivered;
            if accepted.is_empty() {
                return Err(error::message("message rejected for all recipients")
                    .with_command("DATA")
                    .with_rejections(rejected_errors));
            }
            last
        } else {
            let reply = self.read_response()?;
            if !reply.is_success() {
                return Err(error::message(reply.text())
                    .with_code(reply.code())
                    .with_command("DATA"));
            }
            reply.to_string()
        };

        self.expect_quiescent()?;
        tracing::info!(
            conn = %self.id,
            accepted = accepted.len(),
            rejected = rejected.len(),
            size = codec.out_bytes(),
            "message submitted"
        );

        Ok(DeliveryReceipt {
            accepted,
            rejected,
            rejected_errors,
            response,
            envelope_time,
            message_time: Some(message_started.elapsed()),
            message_size: Some(codec.out_bytes()),
        })
    }

    /// Issues `RSET`, flushing any half-finished transaction server side.
    pub fn reset(&mut self) -> Result<(), Error> {
        let reply = self.command(Rset)?;
        if reply.is_success() {
            Ok(())
        } else {
            Err(error::protocol(reply.text())
                .with_code(reply.code())
                .with_command("RSET"))
        }
    }

    /// Probes the connection with `NOOP`.
    pub fn test_connected(&mut self) -> bool {
        match self.command(Noop) {
            Ok(reply) => reply.is_success(),
            Err(_) => false,
        }
    }

    /// Polite shutdown: sends `QUIT`, then tears the transport down.
    pub fn quit(&mut self) {
        let _ = self.command(Quit);
        self.close();
    }

    /// Immediate shutdown. Safe to call any number of times.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let _ = self.stream.shutdown();
        tracing::debug!(conn = %self.id, "connection closed");
    }

    /// Closes the connection for failures the session cannot recover from.
    fn fail(&mut self, err: Error) -> Error {
        if err.is_connection() || err.is_timeout() || err.is_protocol() || err.is_tls() {
            self.close();
        }
        err
    }

    /// A buffered reply with nothing awaiting it is a protocol violation.
    fn expect_quiescent(&mut self) -> Result<(), Error> {
        match self.reader.next_response()? {
            Some(reply) => Err(error::protocol(format!("unexpected reply: {reply}"))
                .with_code(reply.code())),
            None => Ok(()),
        }
    }

    fn command<C: Display>(&mut self, command: C) -> Result<Response, Error> {
        let line = command.to_string();
        self.write_wire(line.as_bytes())?;
        self.read_response()
    }

    /// Writes one continuation line of an authentication dialogue.
    fn command_line(&mut self, line: &str) -> Result<Response, Error> {
        self.write_wire(format!("{line}\r\n").as_bytes())?;
        self.read_response()
    }

    fn write_wire(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.stream.write_all(bytes).map_err(error::io)?;
        self.stream.flush().map_err(error::io)?;
        tracing::trace!(conn = %self.id, ">> {}", escape_crlf(&String::from_utf8_lossy(bytes)));
        Ok(())
    }

    fn read_response(&mut self) -> Result<Response, Error> {
        loop {
            if let Some(reply) = self.reader.next_response()? {
                tracing::trace!(conn = %self.id, "<< {}", escape_crlf(&reply.to_string()));
                return Ok(reply);
            }

            let mut chunk = [0u8; 4096];
            let n = self.stream.read(&mut chunk).map_err(error::io)?;
            if n == 0 {
                self.close();
                return Err(error::connection("connection closed unexpectedly"));
            }
            self.reader.feed(&chunk[..n]);
        }
    }
}

impl Drop for SmtpConnection {
    fn drop(&mut self) {
        self.close();
    }
}

fn connection_id() -> String {
    let mut raw = [0u8; 8];
    rand::thread_rng().fill(&mut raw[..]);
    BASE64
        .encode(raw)
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect()
}

fn basic_credentials(
    credentials: &Credentials,
    mechanism: Mechanism,
) -> Result<(String, String), Error> {
    match credentials {
        Credentials::Basic { username, password } => Ok((username.clone(), password.clone())),
        _ => Err(error::auth(format!(
            "{mechanism} requires username and password credentials"
        ))),
    }
}

fn expect_login_prompt(reply: &Response, prompt: &str) -> Result<(), Error> {
    if reply.has_code(334) && reply.first_word() == Some(prompt) {
        Ok(())
    } else {
        Err(auth_step_error("unexpected LOGIN prompt", reply))
    }
}

fn final_auth_reply(reply: Response) -> Result<(), Error> {
    if reply.has_code(235) {
        Ok(())
    } else {
        Err(auth_step_error("invalid credentials", &reply))
    }
}

fn auth_step_error(context: &str, reply: &Response) -> Error {
    let text = reply.text();
    let detail = if text.is_empty() {
        context.to_owned()
    } else {
        format!("{context}: {text}")
    };
    error::auth(detail)
        .with_code(reply.code())
        .with_command("AUTH")
}

fn record_recipient(
    recipient: &str,
    reply: &Response,
    using_smtputf8: bool,
    accepted: &mut Vec<String>,
    rejected: &mut Vec<String>,
    rejected_errors: &mut Vec<Rejection>,
) {
    if reply.is_success() {
        accepted.push(recipient.to_owned());
        return;
    }
    let text = if using_smtputf8 && !recipient.is_ascii() && reply.has_code(553) {
        "Internationalized mailbox name not allowed".to_owned()
    } else {
        reply.text()
    };
    rejected.push(recipient.to_owned());
    rejected_errors.push(Rejection::new(recipient.to_owned(), reply.code(), text));
}
