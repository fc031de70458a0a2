//! Host Link Transport
//!
//! Provides async line framing over the serial port (or any tokio byte
//! stream, which is how tests drive the controller).

use crate::error::ProtocolError;
use crate::message::TelemetryMessage;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf, WriteHalf,
};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, info, trace};

/// Reader half of an opened serial link
pub type SerialReader = LineReader<ReadHalf<SerialStream>>;

/// Writer half of an opened serial link
pub type SerialWriter = LineWriter<WriteHalf<SerialStream>>;

/// Reads newline-terminated lines from the host
pub struct LineReader<R> {
    /// Buffered byte source
    inner: BufReader<R>,
    /// Maximum accepted line length in bytes
    max_len: usize,
    /// Scratch buffer reused between reads
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    /// Create a new line reader
    pub fn new(reader: R, max_len: usize) -> Self {
        Self {
            inner: BufReader::new(reader),
            max_len,
            buf: Vec::with_capacity(max_len + 2),
        }
    }

    /// Read the next line with its terminator stripped.
    ///
    /// Returns `Ok(None)` at end of stream. An overlong line is consumed up
    /// to its newline without being stored and reported as
    /// [`ProtocolError::LineTooLong`].
    pub async fn next_line(&mut self) -> Result<Option<String>, ProtocolError> {
        self.buf.clear();
        // Room for the longest accepted line plus "\r\n".
        let limit = self.max_len + 2;
        let mut overflow = false;
        let mut read_any = false;

        loop {
            let available = self.inner.fill_buf().await?;
            if available.is_empty() {
                if !read_any {
                    return Ok(None);
                }
                break;
            }
            read_any = true;

            let (chunk, complete) = match available.iter().position(|b| *b == b'\n') {
                Some(end) => (&available[..=end], true),
                None => (available, false),
            };
            let used = chunk.len();

            if !overflow {
                if self.buf.len() + used > limit {
                    overflow = true;
                    self.buf.clear();
                } else {
                    self.buf.extend_from_slice(chunk);
                }
            }
            self.inner.consume(used);

            if complete {
                break;
            }
        }

        while matches!(self.buf.last(), Some(b'\n' | b'\r')) {
            self.buf.pop();
        }

        if overflow || self.buf.len() > self.max_len {
            return Err(ProtocolError::LineTooLong { max: self.max_len });
        }

        let line = String::from_utf8_lossy(&self.buf).trim().to_string();
        trace!("Host -> {}", line);
        Ok(Some(line))
    }
}

/// Writes newline-terminated lines to the host
pub struct LineWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> LineWriter<W> {
    /// Create a new line writer
    pub fn new(writer: W) -> Self {
        Self { inner: writer }
    }

    /// Write one line and flush it
    pub async fn send_line(&mut self, text: &str) -> Result<(), ProtocolError> {
        self.inner.write_all(text.as_bytes()).await?;
        self.inner.write_all(b"\n").await?;
        self.inner.flush().await?;
        trace!("Host <- {}", text);
        Ok(())
    }

    /// Write one telemetry line
    pub async fn send_telemetry(&mut self, msg: &TelemetryMessage) -> Result<(), ProtocolError> {
        debug!("Telemetry {}", msg);
        self.send_line(&msg.encode()).await
    }
}

/// Split any duplex byte stream into a line reader and writer
pub fn split_stream<S>(stream: S, max_len: usize) -> (LineReader<ReadHalf<S>>, LineWriter<WriteHalf<S>>)
where
    S: AsyncRead + AsyncWrite,
{
    let (read, write) = tokio::io::split(stream);
    (LineReader::new(read, max_len), LineWriter::new(write))
}

/// Open the serial device and split it into line halves
///
/// # Arguments
/// * `device` - Serial port device path (e.g. "/dev/ttyUSB0")
/// * `baud_rate` - Baud rate for serial communication
/// * `max_len` - Maximum accepted inbound line length
pub fn open_serial(
    device: &str,
    baud_rate: u32,
    max_len: usize,
) -> Result<(SerialReader, SerialWriter), ProtocolError> {
    info!("Opening host link on {} at {} baud", device, baud_rate);

    let port = tokio_serial::new(device, baud_rate)
        .data_bits(tokio_serial::DataBits::Eight)
        .parity(tokio_serial::Parity::None)
        .stop_bits(tokio_serial::StopBits::One)
        .open_native_async()?;

    Ok(split_stream(port, max_len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::FruitState;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_reads_lines_and_strips_terminators() {
        let input: &[u8] = b"confirm|1|12|50\r\nstop\npartial";
        let mut reader = LineReader::new(input, 64);

        assert_eq!(reader.next_line().await.unwrap().as_deref(), Some("confirm|1|12|50"));
        assert_eq!(reader.next_line().await.unwrap().as_deref(), Some("stop"));
        assert_eq!(reader.next_line().await.unwrap().as_deref(), Some("partial"));
        assert_eq!(reader.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_overlong_line_is_rejected_then_reading_continues() {
        let mut input = vec![b'x'; 100];
        input.extend_from_slice(b"\nstop\n");
        let mut reader = LineReader::new(input.as_slice(), 64);

        assert!(matches!(
            reader.next_line().await,
            Err(ProtocolError::LineTooLong { max: 64 })
        ));
        assert_eq!(reader.next_line().await.unwrap().as_deref(), Some("stop"));
    }

    #[tokio::test]
    async fn test_endless_line_does_not_grow_buffer() {
        let mut input = vec![b'x'; 4 * 1024 * 1024];
        input.extend_from_slice(b"\nwake?\n");
        let mut reader = LineReader::new(input.as_slice(), 64);

        assert!(matches!(
            reader.next_line().await,
            Err(ProtocolError::LineTooLong { max: 64 })
        ));
        assert!(reader.buf.capacity() < 1024);
        assert_eq!(reader.next_line().await.unwrap().as_deref(), Some("wake?"));
        assert!(reader.buf.capacity() < 1024);
    }

    #[tokio::test]
    async fn test_line_at_limit_is_accepted() {
        let line = "9".repeat(64);
        let input = format!("{}\r\n{}\n", line, "9".repeat(65));
        let mut reader = LineReader::new(input.as_bytes(), 64);

        assert_eq!(reader.next_line().await.unwrap(), Some(line));
        assert!(reader.next_line().await.is_err());
        assert_eq!(reader.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_writer_terminates_lines() {
        let (client, mut host) = tokio::io::duplex(256);
        let (_reader, mut writer) = split_stream(client, 64);

        writer.send_line("awake").await.unwrap();
        writer
            .send_telemetry(&TelemetryMessage::new(4, FruitState::SortingPassed, 2))
            .await
            .unwrap();

        let expected = "awake\n4|SORTING_PASSED|2\n";
        let mut out = vec![0u8; expected.len()];
        host.read_exact(&mut out).await.unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), expected);
    }
}
