//! Agent wire framing: 4-byte big-endian length, 1 code byte, body.

use crate::error::{Error, Result};
use crate::protocol::message::AgentMessage;
use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Safety bound on frame size; not part of the wire contract, just guards
/// against a hostile peer claiming a multi-gigabyte length.
const MAX_MESSAGE_SIZE: u32 = 16 * 1024 * 1024;

/// Read exactly one framed message.
///
/// Returns `Ok(None)` on a clean close before a full 5-byte header (4-byte
/// length + 1 code byte) is read. Once the header is read, any further
/// short read (including a zero-length frame) is a framing error, never EOF.
pub async fn read_message<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<AgentMessage>> {
    let mut header = [0u8; 5];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(header[0..4].try_into().unwrap());
    if len == 0 {
        return Err(Error::Framing("zero-length frame".to_string()));
    }
    if len > MAX_MESSAGE_SIZE {
        return Err(Error::Framing(format!("frame too large: {len} bytes")));
    }
    let code = header[4];

    let body_len = (len - 1) as usize;
    let mut body = vec![0u8; body_len];
    reader
        .read_exact(&mut body)
        .await
        .map_err(|_| Error::Framing("short read on frame body".to_string()))?;

    Ok(Some(AgentMessage::new(code, body.into())))
}

/// Write one framed message, sequenced as a single logical write.
pub async fn write_message<W: AsyncWrite + Unpin>(writer: &mut W, msg: &AgentMessage) -> Result<()> {
    writer.write_all(&msg.encode()).await?;
    writer.flush().await?;
    Ok(())
}

/// A framed reader that keeps partial-frame progress in `self` rather than
/// in a stack-local across an await point.
///
/// `read_message` as a bare free function is only safe to call in a plain
/// loop. Racing it inside `tokio::select!` is not: if the other branch wins
/// while a `read_exact` is mid-body, the bytes already pulled off the
/// socket are dropped along with the future, desyncing the stream from
/// then on. `FrameReader` accumulates into its own buffer across calls, so
/// a cancelled `read_message` call leaves the partial frame in place for
/// the next call to pick up.
pub struct FrameReader<R> {
    reader: R,
    buf: BytesMut,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: BytesMut::new(),
        }
    }

    /// Read exactly one framed message. Same EOF/framing-error semantics as
    /// the free `read_message` function; safe to use as a `tokio::select!`
    /// branch.
    pub async fn read_message(&mut self) -> Result<Option<AgentMessage>> {
        while self.buf.len() < 5 {
            let n = self.reader.read_buf(&mut self.buf).await?;
            if n == 0 {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Err(Error::Framing("connection closed mid-header".to_string()));
            }
        }

        let len = u32::from_be_bytes(self.buf[0..4].try_into().unwrap());
        if len == 0 {
            return Err(Error::Framing("zero-length frame".to_string()));
        }
        if len > MAX_MESSAGE_SIZE {
            return Err(Error::Framing(format!("frame too large: {len} bytes")));
        }

        let total = 4 + len as usize;
        while self.buf.len() < total {
            let n = self.reader.read_buf(&mut self.buf).await?;
            if n == 0 {
                return Err(Error::Framing("short read on frame body".to_string()));
            }
        }

        let mut frame = self.buf.split_to(total);
        let code = frame[4];
        let body = frame.split_off(5).freeze();
        Ok(Some(AgentMessage::new(code, body)))
    }
}
