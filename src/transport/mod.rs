//! Line protocol transport — CRLF-framed commands and replies over TCP or TLS.
//!
//! Shared by the POP3 session. Every read and write is bounded by the
//! configured deadline; an expired deadline is reported as
//! [`MailError::Timeout`] so callers can tell it apart from a bad reply.

pub mod tls;

use std::time::Duration;

use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf,
    WriteHalf,
};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, trace};

use crate::config::TlsConfig;
use crate::error::MailError;

/// Longest reply or message line accepted, terminator included.
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// Largest dot-terminated block accepted.
pub const MAX_BLOCK_LEN: usize = 64 * 1024 * 1024;

/// Async read+write stream marker.
pub trait MailStream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> MailStream for T {}

/// A connected, buffered line transport.
pub struct LineTransport {
    server: String,
    reader: BufReader<ReadHalf<Box<dyn MailStream>>>,
    writer: WriteHalf<Box<dyn MailStream>>,
    timeout: Duration,
    max_line: usize,
    max_block: usize,
}

impl LineTransport {
    /// Connect to `host:port`, wrapping the socket in TLS when `tls` is set.
    pub async fn dial(
        host: &str,
        port: u16,
        tls: Option<&TlsConfig>,
        deadline: Duration,
    ) -> Result<Self, MailError> {
        let server = format!("{host}:{port}");

        let tcp = timeout(deadline, TcpStream::connect((host, port)))
            .await
            .map_err(|_| MailError::Timeout {
                operation: format!("connect to {server}"),
                after: deadline,
            })?
            .map_err(|e| MailError::connection_lost(&server, e))?;

        let stream: Box<dyn MailStream> = match tls {
            Some(tls_config) => {
                let connector = tls::connector(tls_config, &server)?;
                let name = tls::server_name(tls_config, host)?;
                let stream = timeout(deadline, connector.connect(name, tcp))
                    .await
                    .map_err(|_| MailError::Timeout {
                        operation: format!("TLS handshake with {server}"),
                        after: deadline,
                    })?
                    .map_err(|e| {
                        MailError::connection_lost(&server, format!("TLS handshake failed: {e}"))
                    })?;
                debug!(server = %server, "TLS established");
                Box::new(stream)
            }
            None => Box::new(tcp),
        };

        Ok(Self::from_boxed(server, stream, deadline))
    }

    /// Wrap an already-connected stream.
    pub fn from_stream<S>(server: impl Into<String>, stream: S, deadline: Duration) -> Self
    where
        S: MailStream + 'static,
    {
        Self::from_boxed(server.into(), Box::new(stream), deadline)
    }

    fn from_boxed(server: String, stream: Box<dyn MailStream>, deadline: Duration) -> Self {
        let (read, write) = tokio::io::split(stream);
        Self {
            server,
            reader: BufReader::new(read),
            writer: write,
            timeout: deadline,
            max_line: MAX_LINE_LEN,
            max_block: MAX_BLOCK_LEN,
        }
    }

    /// The `host:port` this transport talks to.
    pub fn server(&self) -> &str {
        &self.server
    }

    /// Send one command line; CRLF is appended.
    pub async fn send_line(&mut self, line: &str) -> Result<(), MailError> {
        trace!(server = %self.server, "C: {}", redact(line));
        let framed = format!("{line}\r\n");
        let deadline = self.timeout;
        let writer = &mut self.writer;
        let write = async move {
            writer.write_all(framed.as_bytes()).await?;
            writer.flush().await
        };
        timeout(deadline, write)
            .await
            .map_err(|_| MailError::Timeout {
                operation: format!("write '{}'", redact(line)),
                after: deadline,
            })?
            .map_err(|e| MailError::connection_lost(&self.server, e))
    }

    /// Read one reply line with the trailing CRLF removed.
    pub async fn read_line(&mut self) -> Result<String, MailError> {
        let line = self.read_line_within_deadline().await?;
        trace!(server = %self.server, "S: {line}");
        Ok(line)
    }

    /// Read a dot-terminated block, undoing dot-stuffing.
    ///
    /// A lone `.` ends the block; any other line starting with `.` loses
    /// that first dot (`..hello` becomes `.hello`). Lines are re-joined
    /// with CRLF. Bytes after the terminator stay buffered. A block larger
    /// than [`MAX_BLOCK_LEN`] ends the connection.
    pub async fn read_multiline(&mut self) -> Result<String, MailError> {
        let mut block = String::new();
        let mut lines = 0usize;
        loop {
            let line = self.read_line_within_deadline().await?;
            if line == "." {
                break;
            }
            let unstuffed = line.strip_prefix('.').unwrap_or(&line);
            block.push_str(unstuffed);
            block.push_str("\r\n");
            lines += 1;
            if block.len() > self.max_block {
                return Err(MailError::connection_lost(
                    &self.server,
                    format!("message exceeds {} bytes", self.max_block),
                ));
            }
        }
        trace!(server = %self.server, lines, bytes = block.len(), "S: <block>");
        Ok(block)
    }

    /// Shut down the write side. Errors are ignored.
    pub async fn close(mut self) {
        let _ = timeout(self.timeout, self.writer.shutdown()).await;
        debug!(server = %self.server, "Transport closed");
    }

    async fn read_line_within_deadline(&mut self) -> Result<String, MailError> {
        let mut buf = Vec::new();
        let limit = self.max_line;
        let n = timeout(
            self.timeout,
            (&mut self.reader).take(limit as u64).read_until(b'\n', &mut buf),
        )
            .await
            .map_err(|_| MailError::Timeout {
                operation: format!("read from {}", self.server),
                after: self.timeout,
            })?
            .map_err(|e| MailError::connection_lost(&self.server, e))?;
        if n == 0 {
            return Err(MailError::connection_lost(&self.server, "connection closed"));
        }
        // The rest of an oversized line is still unread, so the stream is
        // out of step with the protocol from here on.
        if buf.len() >= limit && !buf.ends_with(b"\n") {
            return Err(MailError::connection_lost(
                &self.server,
                format!("line exceeds {limit} bytes"),
            ));
        }

        if buf.ends_with(b"\n") {
            buf.pop();
            if buf.ends_with(b"\r") {
                buf.pop();
            }
        }
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

/// Hide the argument of a `PASS` command in logs and errors.
fn redact(line: &str) -> &str {
    if line.get(..4).is_some_and(|verb| verb.eq_ignore_ascii_case("PASS")) {
        "PASS ****"
    } else {
        line
    }
}
