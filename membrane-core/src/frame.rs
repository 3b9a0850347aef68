//! Length-prefixed MessagePack framing: a big-endian `u32` size followed by the encoded message.

use {
    std::io::ErrorKind,
    serde::{Serialize, de::DeserializeOwned},
    tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    crate::error::FrameError,
};

pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

pub async fn write_message<W, T>(writer: &mut W, message: &T) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let encoded = rmp_serde::to_vec(message)
        .map_err(|err| FrameError::Encode { reason: err.to_string() })?;
    if encoded.len() > MAX_FRAME_SIZE {
        return Err(FrameError::FrameTooLarge { size: encoded.len(), limit: MAX_FRAME_SIZE });
    }

    writer.write_u32(encoded.len() as u32).await?;
    writer.write_all(&encoded).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads the next message. Returns `Ok(None)` when the stream ends cleanly on a frame boundary.
pub async fn read_message<R, T>(reader: &mut R) -> Result<Option<T>, FrameError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let size = match reader.read_u32().await {
        Ok(v) => v as usize,
        Err(err) if err.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    if size > MAX_FRAME_SIZE {
        return Err(FrameError::FrameTooLarge { size, limit: MAX_FRAME_SIZE });
    }

    let mut buf = vec![0u8; size];
    reader.read_exact(&mut buf).await?;

    rmp_serde::from_slice(&buf)
        .map(Some)
        .map_err(|err| FrameError::Decode { reason: err.to_string() })
}
