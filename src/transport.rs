use rustls::{ServerConnection, StreamOwned};
use std::io::{self, prelude::*, BufReader};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

/// A byte stream a request is served over: plain TCP or TLS on top of it.
pub trait Transport: Read + Write {
    /// The socket underneath, for timeouts.
    fn socket(&self) -> &TcpStream;

    /// Ends the response direction. Input can still be read afterwards.
    fn close_write(&mut self) -> io::Result<()>;
}

impl Transport for TcpStream {
    fn socket(&self) -> &TcpStream {
        self
    }

    fn close_write(&mut self) -> io::Result<()> {
        self.shutdown(Shutdown::Write)
    }
}

pub type TlsStream = StreamOwned<ServerConnection, TcpStream>;

impl Transport for TlsStream {
    fn socket(&self) -> &TcpStream {
        &self.sock
    }

    fn close_write(&mut self) -> io::Result<()> {
        self.conn.send_close_notify();
        while self.conn.wants_write() {
            self.conn.write_tls(&mut self.sock)?;
        }
        self.sock.shutdown(Shutdown::Write)
    }
}

/// Buffered reads and direct writes over one transport.
///
/// Request heads and upload bodies are read through the buffer; responses
/// bypass it, so a handler can alternate between the two.
pub struct Connection<T: Transport> {
    inner: BufReader<T>,
}

impl<T: Transport> Connection<T> {
    pub fn new(transport: T) -> Self {
        Self {
            inner: BufReader::new(transport),
        }
    }

    pub fn set_read_timeout(&self, timeout: Duration) -> io::Result<()> {
        self.inner.get_ref().socket().set_read_timeout(Some(timeout))
    }

    pub fn close_write(&mut self) -> io::Result<()> {
        self.inner.get_mut().flush()?;
        self.inner.get_mut().close_write()
    }
}

impl<T: Transport> Read for Connection<T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<T: Transport> BufRead for Connection<T> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.inner.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.inner.consume(amt)
    }
}

impl<T: Transport> Write for Connection<T> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.get_mut().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.get_mut().flush()
    }
}
