//! LMTP dialect tests against a scripted in-process server

use std::{
    io::{BufRead, BufReader, Write},
    net::{TcpListener, TcpStream},
    thread,
};

use missive::{ClientId, Envelope, SmtpClientBuilder, Tls};

fn spawn_server<F>(handler: F) -> u16
where
    F: FnOnce(TcpStream) + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    thread::spawn(move || {
        if let Ok((stream, _)) = listener.accept() {
            handler(stream);
        }
    });
    port
}

fn reply(stream: &mut TcpStream, line: &str) {
    stream.write_all(line.as_bytes()).unwrap();
    stream.write_all(b"\r\n").unwrap();
    stream.flush().unwrap();
}

fn read_line(reader: &mut BufReader<TcpStream>) -> Option<String> {
    let mut line = String::new();
    if reader.read_line(&mut line).unwrap() == 0 {
        return None;
    }
    Some(line.trim_end().to_owned())
}

#[test]
fn lmtp_delivers_one_verdict_per_recipient() {
    let port = spawn_server(move |mut stream| {
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        reply(&mut stream, "220 lmtp.local LMTP");
        while let Some(line) = read_line(&mut reader) {
            if line.starts_with("LHLO") {
                stream
                    .write_all(b"250-lmtp.local\r\n250-PIPELINING\r\n250 8BITMIME\r\n")
                    .unwrap();
                stream.flush().unwrap();
            } else if line.starts_with("MAIL FROM:") {
                reply(&mut stream, "250 ok");
            } else if line.starts_with("RCPT TO:") {
                reply(&mut stream, "250 ok");
            } else if line == "DATA" {
                reply(&mut stream, "354 go");
                while let Some(data_line) = read_line(&mut reader) {
                    if data_line == "." {
                        break;
                    }
                }
                // One verdict per accepted recipient
                reply(&mut stream, "250 stored for r1");
                reply(&mut stream, "452 mailbox full");
            } else if line == "QUIT" {
                reply(&mut stream, "221 bye");
                break;
            } else {
                reply(&mut stream, "500 unexpected");
            }
        }
    });

    let client = SmtpClientBuilder::new("127.0.0.1")
        .port(port)
        .tls(Tls::None)
        .lmtp(true)
        .hello_name(ClientId::Domain("client.test".to_owned()))
        .build();
    let mut conn = client.connect().unwrap();

    let envelope = Envelope::new(
        "s@x.test",
        vec!["r1@y.test".to_owned(), "r2@y.test".to_owned()],
    )
    .unwrap();
    let receipt = conn.send(&envelope, b"hello").unwrap();

    assert_eq!(receipt.accepted(), ["r1@y.test".to_owned()]);
    assert_eq!(receipt.rejected(), ["r2@y.test".to_owned()]);
    assert_eq!(receipt.rejected_errors().len(), 1);
    assert_eq!(u16::from(receipt.rejected_errors()[0].code()), 452);
    assert!(receipt.response().contains("452"));
    conn.quit();
}

#[test]
fn lhlo_failure_has_no_helo_fallback() {
    let port = spawn_server(move |mut stream| {
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        reply(&mut stream, "220 lmtp.local LMTP");
        if let Some(line) = read_line(&mut reader) {
            assert!(line.starts_with("LHLO"));
            reply(&mut stream, "500 not speaking LMTP");
        }
    });

    let client = SmtpClientBuilder::new("127.0.0.1")
        .port(port)
        .tls(Tls::None)
        .lmtp(true)
        .hello_name(ClientId::Domain("client.test".to_owned()))
        .build();
    let err = client.connect().unwrap_err();
    assert!(err.is_protocol());
    assert_eq!(err.command(), Some("LHLO"));
}
