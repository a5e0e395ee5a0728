//! Length-prefixed message framing: a u32 big-endian byte count followed
//! by that many bytes of XML text.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::ServerError;

/// Upper bound on a single frame; anything larger is a protocol error,
/// not a configuration we should buffer.
pub const MAX_FRAME_BYTES: u32 = 16 * 1024 * 1024;

/// Reads one frame. `Ok(None)` signals a clean end of stream.
pub async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<Option<String>, ServerError> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_BYTES {
        return Err(ServerError::FrameTooLarge {
            size: len,
            limit: MAX_FRAME_BYTES,
        });
    }
    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await?;
    Ok(Some(String::from_utf8_lossy(&payload).into_owned()))
}

/// Writes one frame and flushes it.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    payload: &str,
) -> Result<(), ServerError> {
    let bytes = payload.as_bytes();
    let len = bytes.len() as u32;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(bytes).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn roundtrip() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        write_frame(&mut client, "<rpc><commit/></rpc>").await.unwrap();
        let got = read_frame(&mut server).await.unwrap();
        assert_eq!(got.as_deref(), Some("<rpc><commit/></rpc>"));
    }

    #[tokio::test]
    async fn multiple_frames_in_order() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        write_frame(&mut client, "one").await.unwrap();
        write_frame(&mut client, "two").await.unwrap();
        assert_eq!(read_frame(&mut server).await.unwrap().as_deref(), Some("one"));
        assert_eq!(read_frame(&mut server).await.unwrap().as_deref(), Some("two"));
    }

    #[tokio::test]
    async fn clean_eof_is_none() {
        let (client, mut server) = tokio::io::duplex(16);
        drop(client);
        assert!(read_frame(&mut server).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn oversized_frame_rejected() {
        let (mut client, mut server) = tokio::io::duplex(64);
        let bad_len = (MAX_FRAME_BYTES + 1).to_be_bytes();
        tokio::io::AsyncWriteExt::write_all(&mut client, &bad_len)
            .await
            .unwrap();
        assert!(matches!(
            read_frame(&mut server).await,
            Err(ServerError::FrameTooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn empty_frame_roundtrips() {
        let (mut client, mut server) = tokio::io::duplex(16);
        write_frame(&mut client, "").await.unwrap();
        assert_eq!(read_frame(&mut server).await.unwrap().as_deref(), Some(""));
    }
}
