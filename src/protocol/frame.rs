//! Read and write length-prefixed message frames from the wire.
//!
//! # References
//! - <https://kafka.apache.org/protocol#protocol_common>

use std::io::Cursor;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::primitives::{ReadType, WriteType};

#[derive(Error, Debug)]
pub enum ReadError {
    #[error("cannot read data: {0}")]
    IO(#[from] std::io::Error),

    #[error("invalid frame length: {len}")]
    InvalidLength { len: i32 },

    #[error("frame too large: {len} exceeds maximum {max}")]
    TooLarge { len: usize, max: usize },
}

#[async_trait]
pub trait AsyncMessageRead {
    async fn read_message(&mut self, max_message_size: usize) -> Result<Vec<u8>, ReadError>;
}

#[async_trait]
impl<R> AsyncMessageRead for R
where
    R: AsyncRead + Send + Unpin,
{
    async fn read_message(&mut self, max_message_size: usize) -> Result<Vec<u8>, ReadError> {
        let mut len_buf = [0u8; 4];
        self.read_exact(&mut len_buf).await?;
        let len = i32::read(&mut Cursor::new(len_buf))
            .expect("reading i32 from in-mem buffer always works");

        if len < 0 {
            return Err(ReadError::InvalidLength { len });
        }
        let len = len as usize;
        if len > max_message_size {
            return Err(ReadError::TooLarge {
                len,
                max: max_message_size,
            });
        }

        let mut buf = vec![0u8; len];
        self.read_exact(&mut buf).await?;
        Ok(buf)
    }
}

#[derive(Error, Debug)]
pub enum WriteError {
    #[error("cannot write data: {0}")]
    IO(#[from] std::io::Error),

    #[error("message too large: {size}")]
    TooLarge { size: usize },
}

#[async_trait]
pub trait AsyncMessageWrite {
    async fn write_message(&mut self, msg: &[u8]) -> Result<(), WriteError>;
}

#[async_trait]
impl<W> AsyncMessageWrite for W
where
    W: AsyncWrite + Send + Unpin,
{
    async fn write_message(&mut self, msg: &[u8]) -> Result<(), WriteError> {
        let len = i32::try_from(msg.len()).map_err(|_| WriteError::TooLarge { size: msg.len() })?;
        let mut len_buf = Vec::with_capacity(4);
        len.write(&mut len_buf)
            .expect("i32 is always writable to in-mem buffer");

        self.write_all(&len_buf).await?;
        self.write_all(msg).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_matches::assert_matches;

    #[tokio::test]
    async fn test_roundtrip() {
        let mut stream = Cursor::new(vec![]);
        stream.write_message(b"hello frame").await.unwrap();
        stream.set_position(0);
        let msg = stream.read_message(1024).await.unwrap();
        assert_eq!(msg, b"hello frame");
    }

    #[tokio::test]
    async fn test_read_too_large() {
        let mut stream = Cursor::new(vec![]);
        stream.write_message(&[0u8; 64]).await.unwrap();
        stream.set_position(0);
        let err = stream.read_message(16).await.unwrap_err();
        assert_matches!(err, ReadError::TooLarge { len: 64, max: 16 });
    }

    #[tokio::test]
    async fn test_read_negative_length() {
        let mut stream = Cursor::new((-5i32).to_be_bytes().to_vec());
        let err = stream.read_message(1024).await.unwrap_err();
        assert_matches!(err, ReadError::InvalidLength { len: -5 });
    }
}
