//! Wire-level client pieces: the DATA body codec, the network stream and
//! the connection itself

mod connection;
#[cfg(test)]
pub(crate) mod mock;
pub(crate) mod net;

pub use self::connection::{DeliveryReceipt, SmtpConnection};
pub use self::net::TlsParameters;

/// Makes CRLF visible in wire-level log events
pub(crate) fn escape_crlf(string: &str) -> String {
    string.replace("\r\n", "<CRLF>")
}

/// Transfer encoder for the DATA phase.
///
/// Normalizes line endings to CRLF, doubles any dot that starts a line and
/// keeps running byte counts. [`DataCodec::finish`] flushes a dangling line
/// and emits the `.` terminator, leaving the transport open.
#[derive(Debug)]
pub(crate) struct DataCodec {
    at_line_start: bool,
    pending_cr: bool,
    ends_with_crlf: bool,
    in_bytes: u64,
    out_bytes: u64,
}

impl DataCodec {
    pub(crate) fn new() -> DataCodec {
        DataCodec {
            at_line_start: true,
            pending_cr: false,
            ends_with_crlf: false,
            in_bytes: 0,
            out_bytes: 0,
        }
    }

    /// Encodes one chunk of message bytes into `out`.
    pub(crate) fn encode(&mut self, chunk: &[u8], out: &mut Vec<u8>) {
        self.in_bytes += chunk.len() as u64;
        let start = out.len();

        for &byte in chunk {
            match byte {
                b'\r' => {
                    // Held back until the next byte decides between CRLF
                    // and a bare CR
                    if self.pending_cr {
                        self.push_line_break(out);
                    }
                    self.pending_cr = true;
                }
                b'\n' => {
                    self.pending_cr = false;
                    self.push_line_break(out);
                }
                _ => {
                    if self.pending_cr {
                        self.pending_cr = false;
                        self.push_line_break(out);
                    }
                    if self.at_line_start && byte == b'.' {
                        out.push(b'.');
                    }
                    out.push(byte);
                    self.at_line_start = false;
                    self.ends_with_crlf = false;
                }
            }
        }

        self.out_bytes += (out.len() - start) as u64;
    }

    /// Flushes any dangling line and emits the terminator.
    pub(crate) fn finish(&mut self, out: &mut Vec<u8>) {
        let start = out.len();
        if self.pending_cr {
            self.pending_cr = false;
            self.push_line_break(out);
        }
        self.out_bytes += (out.len() - start) as u64;

        if !self.ends_with_crlf {
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b".\r\n");
    }

    /// Message bytes consumed so far
    pub(crate) fn in_bytes(&self) -> u64 {
        self.in_bytes
    }

    /// Encoded bytes produced so far, terminator excluded
    pub(crate) fn out_bytes(&self) -> u64 {
        self.out_bytes
    }

    fn push_line_break(&mut self, out: &mut Vec<u8>) {
        out.extend_from_slice(b"\r\n");
        self.at_line_start = true;
        self.ends_with_crlf = true;
    }
}
