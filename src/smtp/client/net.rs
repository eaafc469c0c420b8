//! Network stream with in-place STARTTLS upgrade

use std::{
    io::{self, Read, Write},
    mem,
    net::{IpAddr, Shutdown, SocketAddr, TcpStream, ToSocketAddrs},
    time::Duration,
};

use native_tls::{TlsConnector, TlsStream};
use socket2::{Domain, Protocol, Socket, Type};

use crate::smtp::error::{self, Error};

/// Parameters for a TLS handshake, whether implicit or via STARTTLS
#[derive(Clone, Debug)]
pub struct TlsParameters {
    domain: String,
    accept_invalid_certs: bool,
    accept_invalid_hostnames: bool,
}

impl TlsParameters {
    /// Creates parameters that validate certificates against `domain`
    pub fn new<S: Into<String>>(domain: S) -> TlsParameters {
        TlsParameters {
            domain: domain.into(),
            accept_invalid_certs: false,
            accept_invalid_hostnames: false,
        }
    }

    /// The domain certificates are validated against
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Disables certificate validation. This defeats the point of TLS.
    pub fn danger_accept_invalid_certs(mut self, accept: bool) -> TlsParameters {
        self.accept_invalid_certs = accept;
        self
    }

    /// Disables hostname verification. This defeats the point of TLS.
    pub fn danger_accept_invalid_hostnames(mut self, accept: bool) -> TlsParameters {
        self.accept_invalid_hostnames = accept;
        self
    }

    fn connector(&self) -> Result<TlsConnector, Error> {
        TlsConnector::builder()
            .danger_accept_invalid_certs(self.accept_invalid_certs)
            .danger_accept_invalid_hostnames(self.accept_invalid_hostnames)
            .build()
            .map_err(error::tls)
    }
}

/// The transport under a connection
#[derive(Debug)]
pub(crate) enum NetworkStream {
    /// Plain TCP
    Tcp(TcpStream),
    /// TLS over TCP
    Tls(Box<TlsStream<TcpStream>>),
    /// Scripted test double
    #[cfg(test)]
    Mock(super::mock::MockStream),
    /// Placeholder while the stream is moved into a TLS wrapper
    None,
}

impl NetworkStream {
    /// Opens a TCP connection, optionally bound to a local address.
    pub(crate) fn connect(
        host: &str,
        port: u16,
        timeout: Duration,
        local_address: Option<IpAddr>,
    ) -> Result<NetworkStream, Error> {
        let addresses = (host, port).to_socket_addrs().map_err(error::connection)?;

        let mut last_err = None;
        for address in addresses {
            match connect_addr(&address, timeout, local_address) {
                Ok(stream) => return Ok(NetworkStream::Tcp(stream)),
                Err(err) => last_err = Some(err),
            }
        }

        Err(match last_err {
            Some(err) => error::io(err),
            None => error::connection(format!("could not resolve {host}")),
        })
    }

    /// Replaces the plain stream with its TLS wrapper.
    ///
    /// The owned socket moves into the handshake; on success the same
    /// connection continues encrypted.
    pub(crate) fn upgrade_tls(&mut self, parameters: &TlsParameters) -> Result<(), Error> {
        match mem::replace(self, NetworkStream::None) {
            NetworkStream::Tcp(stream) => {
                let connector = parameters.connector()?;
                match connector.connect(parameters.domain(), stream) {
                    Ok(tls_stream) => {
                        *self = NetworkStream::Tls(Box::new(tls_stream));
                        Ok(())
                    }
                    Err(err) => Err(error::tls(err)),
                }
            }
            already_tls @ NetworkStream::Tls(_) => {
                *self = already_tls;
                Ok(())
            }
            other => {
                *self = other;
                Err(error::tls("stream cannot be secured"))
            }
        }
    }

    /// Tells if the stream is currently encrypted
    pub(crate) fn is_encrypted(&self) -> bool {
        matches!(self, NetworkStream::Tls(_))
    }

    /// Sets the read window; `None` blocks forever
    pub(crate) fn set_read_timeout(&self, duration: Option<Duration>) -> io::Result<()> {
        match self {
            NetworkStream::Tcp(stream) => stream.set_read_timeout(duration),
            NetworkStream::Tls(stream) => stream.get_ref().set_read_timeout(duration),
            #[cfg(test)]
            NetworkStream::Mock(_) => Ok(()),
            NetworkStream::None => Ok(()),
        }
    }

    /// Sets the write window; `None` blocks forever
    pub(crate) fn set_write_timeout(&self, duration: Option<Duration>) -> io::Result<()> {
        match self {
            NetworkStream::Tcp(stream) => stream.set_write_timeout(duration),
            NetworkStream::Tls(stream) => stream.get_ref().set_write_timeout(duration),
            #[cfg(test)]
            NetworkStream::Mock(_) => Ok(()),
            NetworkStream::None => Ok(()),
        }
    }

    /// Tears the transport down in both directions.
    pub(crate) fn shutdown(&mut self) -> io::Result<()> {
        match self {
            NetworkStream::Tcp(stream) => stream.shutdown(Shutdown::Both),
            NetworkStream::Tls(stream) => {
                let _ = stream.shutdown();
                stream.get_ref().shutdown(Shutdown::Both)
            }
            #[cfg(test)]
            NetworkStream::Mock(_) => Ok(()),
            NetworkStream::None => Ok(()),
        }
    }
}

fn connect_addr(
    address: &SocketAddr,
    timeout: Duration,
    local_address: Option<IpAddr>,
) -> io::Result<TcpStream> {
    let socket = Socket::new(Domain::for_address(*address), Type::STREAM, Some(Protocol::TCP))?;
    if let Some(ip) = local_address {
        socket.bind(&SocketAddr::new(ip, 0).into())?;
    }
    socket.connect_timeout(&(*address).into(), timeout)?;

    let stream: TcpStream = socket.into();
    // Request/response protocol, Nagle only adds latency
    stream.set_nodelay(true)?;
    Ok(stream)
}

impl Read for NetworkStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            NetworkStream::Tcp(stream) => stream.read(buf),
            NetworkStream::Tls(stream) => stream.read(buf),
            #[cfg(test)]
            NetworkStream::Mock(stream) => stream.read(buf),
            NetworkStream::None => Ok(0),
        }
    }
}

impl Write for NetworkStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            NetworkStream::Tcp(stream) => stream.write(buf),
            NetworkStream::Tls(stream) => stream.write(buf),
            #[cfg(test)]
            NetworkStream::Mock(stream) => stream.write(buf),
            NetworkStream::None => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "stream was consumed by a failed upgrade",
            )),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            NetworkStream::Tcp(stream) => stream.flush(),
            NetworkStream::Tls(stream) => stream.flush(),
            #[cfg(test)]
            NetworkStream::Mock(stream) => stream.flush(),
            NetworkStream::None => Ok(()),
        }
    }
}
