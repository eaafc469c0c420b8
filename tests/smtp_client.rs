//! End-to-end submission tests against a scripted in-process server

use std::{
    io::{BufRead, BufReader, Write},
    net::{TcpListener, TcpStream},
    sync::mpsc,
    thread,
    time::Duration,
};

use missive::{ClientId, Credentials, Envelope, Extension, SmtpClientBuilder, Timeouts, Tls};

fn builder(port: u16) -> SmtpClientBuilder {
    SmtpClientBuilder::new("127.0.0.1")
        .port(port)
        .tls(Tls::None)
        .hello_name(ClientId::Domain("client.test".to_owned()))
}

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
fn full_submission_round_trip() {
    let (tx, rx) = mpsc::channel::<String>();
    let port = spawn_server(move |mut stream| {
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        reply(&mut stream, "220 test.local ESMTP");
        while let Some(line) = read_line(&mut reader) {
            tx.send(line.clone()).unwrap();
            if line.starts_with("EHLO") {
                stream
                    .write_all(
                        b"250-test.local\r\n250-PIPELINING\r\n250-8BITMIME\r\n250 SIZE 1048576\r\n",
                    )
                    .unwrap();
                stream.flush().unwrap();
            } else if line.starts_with("MAIL FROM:") {
                reply(&mut stream, "250 sender ok");
            } else if line.starts_with("RCPT TO:") {
                reply(&mut stream, "250 recipient ok");
            } else if line == "DATA" {
                reply(&mut stream, "354 end with .");
                let mut body = Vec::new();
                while let Some(data_line) = read_line(&mut reader) {
                    if data_line == "." {
                        break;
                    }
                    body.push(data_line);
                }
                tx.send(format!("<DATA>{}", body.join("|"))).unwrap();
                reply(&mut stream, "250 queued as 7");
            } else if line == "QUIT" {
                reply(&mut stream, "221 bye");
                break;
            } else {
                reply(&mut stream, "500 unexpected");
            }
        }
    });

    let client = builder(port).build();
    let mut conn = client.connect().unwrap();
    assert!(conn.server_info().supports(Extension::Pipelining));
    assert!(!conn.is_encrypted());

    let envelope = Envelope::new("a@x.test", vec!["b@y.test".to_owned()]).unwrap();
    let receipt = conn
        .send(&envelope, b"line one\r\n.starts with a dot\r\nlast line")
        .unwrap();
    assert_eq!(receipt.accepted(), ["b@y.test".to_owned()]);
    assert!(receipt.rejected().is_empty());
    assert!(receipt.response().contains("queued"));
    assert!(receipt.message_size().is_some());
    conn.quit();

    let seen: Vec<String> = rx.iter().collect();
    assert!(seen.contains(&"EHLO client.test".to_owned()));
    assert!(seen.contains(&"MAIL FROM:<a@x.test>".to_owned()));
    assert!(seen.contains(&"RCPT TO:<b@y.test>".to_owned()));
    assert!(seen.contains(&"QUIT".to_owned()));
    // The leading dot arrives doubled on the wire
    let data = seen.iter().find(|l| l.starts_with("<DATA>")).unwrap();
    assert_eq!(data, "<DATA>line one|..starts with a dot|last line");
}

#[test]
fn partial_rejection_over_real_sockets() {
    let port = spawn_server(move |mut stream| {
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        reply(&mut stream, "220 test.local ESMTP");
        let mut rcpt_count = 0;
        while let Some(line) = read_line(&mut reader) {
            if line.starts_with("EHLO") {
                stream.write_all(b"250-test.local\r\n250 OK\r\n").unwrap();
                stream.flush().unwrap();
            } else if line.starts_with("MAIL FROM:") {
                reply(&mut stream, "250 ok");
            } else if line.starts_with("RCPT TO:") {
                rcpt_count += 1;
                if rcpt_count == 2 {
                    reply(&mut stream, "550 user unknown");
                } else {
                    reply(&mut stream, "250 ok");
                }
            } else if line == "DATA" {
                reply(&mut stream, "354 go");
                while let Some(data_line) = read_line(&mut reader) {
                    if data_line == "." {
                        break;
                    }
                }
                reply(&mut stream, "250 delivered");
            } else if line == "QUIT" {
                reply(&mut stream, "221 bye");
                break;
            }
        }
    });

    let client = builder(port).build();
    let mut conn = client.connect().unwrap();
    let envelope = Envelope::new(
        "s@x.test",
        vec![
            "one@y.test".to_owned(),
            "two@y.test".to_owned(),
            "three@y.test".to_owned(),
        ],
    )
    .unwrap();
    let receipt = conn.send(&envelope, b"hello").unwrap();

    assert_eq!(
        receipt.accepted(),
        ["one@y.test".to_owned(), "three@y.test".to_owned()]
    );
    assert_eq!(receipt.rejected(), ["two@y.test".to_owned()]);
    assert_eq!(receipt.rejected_errors().len(), 1);
    assert_eq!(receipt.rejected_errors()[0].recipient(), "two@y.test");
    conn.quit();
}

#[test]
fn login_authentication_over_real_sockets() {
    let port = spawn_server(move |mut stream| {
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        reply(&mut stream, "220 test.local ESMTP");
        while let Some(line) = read_line(&mut reader) {
            if line.starts_with("EHLO") {
                stream
                    .write_all(b"250-test.local\r\n250 AUTH LOGIN PLAIN\r\n")
                    .unwrap();
                stream.flush().unwrap();
            } else if line == "AUTH LOGIN" {
                reply(&mut stream, "334 VXNlcm5hbWU6");
                // base64("someone")
                assert_eq!(read_line(&mut reader).as_deref(), Some("c29tZW9uZQ=="));
                reply(&mut stream, "334 UGFzc3dvcmQ6");
                // base64("secret")
                assert_eq!(read_line(&mut reader).as_deref(), Some("c2VjcmV0"));
                reply(&mut stream, "235 authenticated");
            } else if line == "QUIT" {
                reply(&mut stream, "221 bye");
                break;
            }
        }
    });

    let client = builder(port).build();
    let mut conn = client.connect().unwrap();
    conn.login(&Credentials::basic("someone", "secret")).unwrap();
    assert!(conn.is_authenticated());
    conn.quit();
}

#[test]
fn greeting_timeout_fires() {
    let port = spawn_server(|stream| {
        // Say nothing until the client gives up
        thread::sleep(Duration::from_secs(2));
        drop(stream);
    });

    let client = builder(port)
        .timeouts(Timeouts {
            connect: Duration::from_secs(5),
            greeting: Duration::from_millis(200),
            idle: Duration::from_secs(5),
        })
        .build();
    let err = client.connect().unwrap_err();
    assert!(err.is_timeout());
}

#[test]
fn refused_connection_is_a_connection_error() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let err = builder(port).build().connect().unwrap_err();
    assert!(err.is_connection());
}
