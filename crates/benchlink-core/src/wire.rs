//! Length-delimited frame-bundle I/O.
//!
//! A bundle travels as a big-endian `u32` byte length followed by the
//! encoded bundle body.  Reading and writing never split or merge frames.

use benchlink_protocol::frame::{decode_bundle, encode_bundle, MalformedFrame};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on a bundle body; larger announcements are treated as a
/// protocol violation rather than an allocation request.
pub const MAX_BUNDLE_LEN: usize = 64 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("peer closed the connection")]
    Closed,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Malformed(#[from] MalformedFrame),
    #[error("announced bundle of {0} bytes exceeds limit")]
    BundleTooLarge(usize),
}

/// Write one frame bundle.
pub async fn write_frames<W>(writer: &mut W, frames: &[Vec<u8>]) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
{
    let body = encode_bundle(frames);
    writer.write_all(&(body.len() as u32).to_be_bytes()).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame bundle.  A clean or mid-message EOF is `WireError::Closed`.
pub async fn read_frames<R>(reader: &mut R) -> Result<Vec<Vec<u8>>, WireError>
where
    R: AsyncRead + Unpin,
{
    let mut len_bytes = [0u8; 4];
    read_exact_or_closed(reader, &mut len_bytes).await?;
    let len = u32::from_be_bytes(len_bytes) as usize;
    if len > MAX_BUNDLE_LEN {
        return Err(WireError::BundleTooLarge(len));
    }
    let mut body = vec![0u8; len];
    read_exact_or_closed(reader, &mut body).await?;
    Ok(decode_bundle(&body)?)
}

async fn read_exact_or_closed<R>(reader: &mut R, buf: &mut [u8]) -> Result<(), WireError>
where
    R: AsyncRead + Unpin,
{
    match reader.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(WireError::Closed),
        Err(e) => Err(WireError::Io(e)),
    }
}

/// Incremental bundle reader for timeout-bounded polling.
///
/// A poll that times out mid-message must not lose the bytes already read,
/// or the stream desynchronizes; partial input therefore persists in the
/// buffer across calls.  Use [`read_frames`] instead when the reader runs on
/// a dedicated task and never races a timeout.
#[derive(Default)]
pub struct FrameBuffer {
    buffer: Vec<u8>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Discard buffered bytes; required after a reconnect.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Read at most one bundle, waiting up to `timeout`.  `Ok(None)` means
    /// no complete bundle arrived in time.
    pub async fn poll_frames<R>(
        &mut self,
        reader: &mut R,
        timeout: std::time::Duration,
    ) -> Result<Option<Vec<Vec<u8>>>, WireError>
    where
        R: AsyncRead + Unpin,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(frames) = self.try_extract()? {
                return Ok(Some(frames));
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let mut chunk = [0u8; 4096];
            match tokio::time::timeout_at(deadline, reader.read(&mut chunk)).await {
                Err(_) => return Ok(None),
                Ok(Ok(0)) => return Err(WireError::Closed),
                Ok(Ok(n)) => self.buffer.extend_from_slice(&chunk[..n]),
                Ok(Err(e)) => return Err(WireError::Io(e)),
            }
        }
    }

    fn try_extract(&mut self) -> Result<Option<Vec<Vec<u8>>>, WireError> {
        if self.buffer.len() < 4 {
            return Ok(None);
        }
        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&self.buffer[..4]);
        let len = u32::from_be_bytes(len_bytes) as usize;
        if len > MAX_BUNDLE_LEN {
            return Err(WireError::BundleTooLarge(len));
        }
        if self.buffer.len() < 4 + len {
            return Ok(None);
        }
        let body: Vec<u8> = self.buffer.drain(..4 + len).skip(4).collect();
        Ok(Some(decode_bundle(&body)?))
    }
}
