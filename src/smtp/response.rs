//! Server replies: the three digit code model, the logical reply built from
//! one or more continuation lines, and the incremental framer that turns raw
//! socket bytes into logical replies.

use std::fmt::{self, Display, Formatter};

use nom::{branch::alt, bytes::complete::tag, character::complete::one_of, combinator::map, IResult};

use crate::smtp::error::{self, Error};

/// The first digit of a reply code indicates severity
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum Severity {
    /// 2yz
    PositiveCompletion = 2,
    /// 3yz
    PositiveIntermediate = 3,
    /// 4yz
    TransientNegativeCompletion = 4,
    /// 5yz
    PermanentNegativeCompletion = 5,
}

impl Display for Severity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", *self as u8)
    }
}

/// A three digit reply code
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub struct Code {
    /// First digit
    pub severity: Severity,
    /// Second digit
    pub category: u8,
    /// Third digit
    pub detail: u8,
}

impl Code {
    /// Creates a new `Code`; the category and detail digits must be 0..=9.
    pub fn new(severity: Severity, category: u8, detail: u8) -> Code {
        debug_assert!(category < 10 && detail < 10);
        Code {
            severity,
            category,
            detail,
        }
    }

    /// Tells if the code is positive (2yz or 3yz)
    pub fn is_positive(self) -> bool {
        matches!(
            self.severity,
            Severity::PositiveCompletion | Severity::PositiveIntermediate
        )
    }
}

impl Display for Code {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.severity, self.category, self.detail)
    }
}

impl From<Code> for u16 {
    fn from(code: Code) -> u16 {
        code.severity as u16 * 100 + code.category as u16 * 10 + code.detail as u16
    }
}

/// A logical server reply: one code and one text line per wire line
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Response {
    code: Code,
    message: Vec<String>,
}

impl Response {
    /// Creates a new `Response`
    pub fn new(code: Code, message: Vec<String>) -> Response {
        Response { code, message }
    }

    /// Reply code
    pub fn code(&self) -> Code {
        self.code
    }

    /// Tells if the reply is positive (2yz or 3yz)
    pub fn is_positive(&self) -> bool {
        self.code.is_positive()
    }

    /// Tells if the reply is a positive completion (2yz)
    pub fn is_success(&self) -> bool {
        self.code.severity == Severity::PositiveCompletion
    }

    /// Tests code equality
    pub fn has_code(&self, code: u16) -> bool {
        u16::from(self.code) == code
    }

    /// Returns only the first word of the message if possible
    pub fn first_word(&self) -> Option<&str> {
        self.message
            .first()
            .and_then(|line| line.split_whitespace().next())
    }

    /// Returns the first line of the message if possible
    pub fn first_line(&self) -> Option<&str> {
        self.message.first().map(String::as_str)
    }

    /// Server text lines, without codes
    pub fn message(&self) -> impl Iterator<Item = &str> {
        self.message.iter().map(String::as_str)
    }

    /// Server text joined with newlines, without codes
    pub fn text(&self) -> String {
        self.message.join("\n")
    }
}

impl Display for Response {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let last = self.message.len().saturating_sub(1);
        for (i, line) in self.message.iter().enumerate() {
            let sep = if i == last { ' ' } else { '-' };
            write!(f, "{}{}{}", self.code, sep, line)?;
            if i != last {
                f.write_str("\n")?;
            }
        }
        if self.message.is_empty() {
            write!(f, "{}", self.code)?;
        }
        Ok(())
    }
}

/// One wire line of a reply
#[derive(PartialEq, Eq, Debug)]
struct ReplyLine<'a> {
    code: Code,
    last: bool,
    text: &'a str,
}

fn parse_severity(i: &str) -> IResult<&str, Severity> {
    alt((
        map(tag("2"), |_| Severity::PositiveCompletion),
        map(tag("3"), |_| Severity::PositiveIntermediate),
        map(tag("4"), |_| Severity::TransientNegativeCompletion),
        map(tag("5"), |_| Severity::PermanentNegativeCompletion),
    ))(i)
}

fn parse_digit(i: &str) -> IResult<&str, u8> {
    map(one_of("0123456789"), |c| c as u8 - b'0')(i)
}

fn parse_code(i: &str) -> IResult<&str, Code> {
    let (i, severity) = parse_severity(i)?;
    let (i, category) = parse_digit(i)?;
    let (i, detail) = parse_digit(i)?;
    Ok((
        i,
        Code {
            severity,
            category,
            detail,
        },
    ))
}

fn parse_reply_line(i: &str) -> IResult<&str, ReplyLine<'_>> {
    let (rest, code) = parse_code(i)?;
    if rest.is_empty() {
        return Ok((
            "",
            ReplyLine {
                code,
                last: true,
                text: "",
            },
        ));
    }
    let (text, sep) = one_of(" -")(rest)?;
    Ok((
        "",
        ReplyLine {
            code,
            last: sep == ' ',
            text,
        },
    ))
}

/// Incremental reply framer.
///
/// Owns the residual byte buffer between reads, splits on `\r?\n`, skips
/// blank lines between replies and coalesces continuation lines into one
/// logical [`Response`]. Feeding the same bytes in any chunking yields the
/// same reply sequence.
#[derive(Debug, Default)]
pub(crate) struct ReplyReader {
    buf: Vec<u8>,
    pending: Option<(Code, Vec<String>)>,
}

impl ReplyReader {
    /// Appends raw bytes from the transport.
    pub(crate) fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Drops buffered bytes and any half-assembled reply.
    pub(crate) fn reset(&mut self) {
        self.buf.clear();
        self.pending = None;
    }

    /// Extracts the next complete logical reply, if one is buffered.
    pub(crate) fn next_response(&mut self) -> Result<Option<Response>, Error> {
        while let Some(line) = self.take_line() {
            if line.is_empty() && self.pending.is_none() {
                continue;
            }

            let parsed = match parse_reply_line(&line) {
                Ok((_, parsed)) => parsed,
                Err(_) => {
                    self.pending = None;
                    return Err(error::protocol(format!("unparseable reply line: {line:?}")));
                }
            };

            if let Some((code, mut lines)) = self.pending.take() {
                if parsed.code != code {
                    return Err(error::protocol(format!(
                        "reply code changed mid-reply: {} then {}",
                        code, parsed.code
                    )));
                }
                lines.push(parsed.text.to_owned());
                if parsed.last {
                    return Ok(Some(Response::new(code, lines)));
                }
                self.pending = Some((code, lines));
            } else if parsed.last {
                return Ok(Some(Response::new(parsed.code, vec![parsed.text.to_owned()])));
            } else {
                self.pending = Some((parsed.code, vec![parsed.text.to_owned()]));
            }
        }
        Ok(None)
    }

    /// Takes one `\r?\n` terminated line off the buffer.
    ///
    /// Bytes are treated as opaque 8 bit data; lines are converted lossily so
    /// whatever legacy encoding the server used survives as text.
    fn take_line(&mut self) -> Option<String> {
        let nl = self.buf.iter().position(|&b| b == b'\n')?;
        let mut line: Vec<u8> = self.buf.drain(..=nl).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn drain(reader: &mut ReplyReader) -> Vec<Response> {
        let mut out = Vec::new();
        while let Some(response) = reader.next_response().unwrap() {
            out.push(response);
        }
        out
    }

    #[test]
    fn test_code_display() {
        let code = Code::new(Severity::TransientNegativeCompletion, 2, 1);
        assert_eq!(code.to_string(), "421");
        assert_eq!(u16::from(code), 421);
    }

    #[test]
    fn test_single_line_reply() {
        let mut reader = ReplyReader::default();
        reader.feed(b"250 OK\r\n");
        let replies = drain(&mut reader);
        assert_eq!(replies.len(), 1);
        assert!(replies[0].has_code(250));
        assert_eq!(replies[0].first_line(), Some("OK"));
    }

    #[test]
    fn test_multiline_reply_is_coalesced() {
        let mut reader = ReplyReader::default();
        reader.feed(b"250-mail.example.org\r\n250-8BITMIME\r\n250-SIZE 42\r\n250 AUTH PLAIN\r\n");
        let replies = drain(&mut reader);
        assert_eq!(replies.len(), 1);
        assert_eq!(
            replies[0],
            Response::new(
                Code::new(Severity::PositiveCompletion, 5, 0),
                vec![
                    "mail.example.org".to_owned(),
                    "8BITMIME".to_owned(),
                    "SIZE 42".to_owned(),
                    "AUTH PLAIN".to_owned(),
                ],
            )
        );
    }

    #[test]
    fn test_byte_by_byte_equals_single_chunk() {
        let input: &[u8] = b"220 ready\r\n250-x\r\n250 y\r\n354 go\r\n";

        let mut whole = ReplyReader::default();
        whole.feed(input);
        let expected = drain(&mut whole);

        let mut trickled = ReplyReader::default();
        let mut got = Vec::new();
        for byte in input {
            trickled.feed(std::slice::from_ref(byte));
            while let Some(response) = trickled.next_response().unwrap() {
                got.push(response);
            }
        }

        assert_eq!(got, expected);
        assert_eq!(got.len(), 3);
    }

    #[test]
    fn test_lf_only_lines_are_accepted() {
        let mut reader = ReplyReader::default();
        reader.feed(b"250-a\n250 b\n");
        let replies = drain(&mut reader);
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].text(), "a\nb");
    }

    #[test]
    fn test_blank_lines_between_replies_are_skipped() {
        let mut reader = ReplyReader::default();
        reader.feed(b"\r\n250 one\r\n\r\n\r\n220 two\r\n");
        let replies = drain(&mut reader);
        assert_eq!(replies.len(), 2);
        assert!(replies[0].has_code(250));
        assert!(replies[1].has_code(220));
    }

    #[test]
    fn test_incomplete_reply_stays_buffered() {
        let mut reader = ReplyReader::default();
        reader.feed(b"250-wait");
        assert!(reader.next_response().unwrap().is_none());
        reader.feed(b" for it\r\n");
        assert!(reader.next_response().unwrap().is_none());
        reader.feed(b"250 done\r\n");
        let reply = reader.next_response().unwrap().unwrap();
        assert_eq!(reply.text(), "wait for it\ndone");
    }

    #[test]
    fn test_code_drift_is_rejected() {
        let mut reader = ReplyReader::default();
        reader.feed(b"250-a\r\n550 b\r\n");
        assert!(reader.next_response().is_err());
    }

    #[test]
    fn test_garbage_line_is_rejected() {
        for garbage in ["hello world\r\n", "2500 x\r\n", "250something\r\n", "25 x\r\n"] {
            let mut reader = ReplyReader::default();
            reader.feed(garbage.as_bytes());
            assert!(reader.next_response().is_err(), "accepted {garbage:?}");
        }
    }

    #[test]
    fn test_bare_code_line() {
        let mut reader = ReplyReader::default();
        reader.feed(b"250\r\n");
        let reply = reader.next_response().unwrap().unwrap();
        assert!(reply.has_code(250));
        assert_eq!(reply.first_line(), Some(""));
    }

    #[test]
    fn test_response_first_word() {
        let response = Response::new(
            Code::new(Severity::PositiveIntermediate, 3, 4),
            vec!["VXNlcm5hbWU6 extra".to_owned()],
        );
        assert_eq!(response.first_word(), Some("VXNlcm5hbWU6"));
        assert!(response.is_positive());
        assert!(!response.is_success());
    }

    #[test]
    fn test_response_display_round_trip() {
        let response = Response::new(
            Code::new(Severity::PositiveCompletion, 5, 0),
            vec!["a".to_owned(), "b".to_owned()],
        );
        assert_eq!(response.to_string(), "250-a\n250 b");
    }
}
