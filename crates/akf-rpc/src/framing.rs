//! Content-Length framing.
//!
//! A frame is a block of headers terminated by an empty line, followed by
//! exactly `Content-Length` bytes of UTF-8 JSON.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Result, RpcError};

/// Upper bound on a single frame body.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Upper bound on a single header line, terminator included.
pub const MAX_HEADER_LINE: usize = 8 * 1024;

/// Read one frame body.
///
/// Returns `Ok(None)` when the peer closes the stream cleanly before sending
/// any header bytes; EOF in the middle of a frame is `ConnectionClosed`.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Vec<u8>>>
where
    R: AsyncBufRead + Unpin,
{
    let mut content_length: Option<usize> = None;
    let mut line = String::new();
    let mut headers_seen = 0usize;

    loop {
        line.clear();
        let bytes_read = (&mut *reader)
            .take(MAX_HEADER_LINE as u64 + 1)
            .read_line(&mut line)
            .await?;
        if line.len() > MAX_HEADER_LINE {
            return Err(RpcError::protocol(format!(
                "header line exceeds limit of {} bytes",
                MAX_HEADER_LINE
            )));
        }

        if bytes_read == 0 {
            if headers_seen > 0 {
                return Err(RpcError::ConnectionClosed);
            }
            return Ok(None);
        }

        let trimmed = line.trim();

        // Empty line signals end of headers; stray blank lines between
        // frames are skipped.
        if trimmed.is_empty() {
            if headers_seen == 0 {
                continue;
            }
            break;
        }
        headers_seen += 1;

        if let Some(len_str) = trimmed.strip_prefix("Content-Length:") {
            content_length = Some(len_str.trim().parse().map_err(|e| {
                RpcError::protocol(format!("invalid Content-Length: {}", e))
            })?);
        }
    }

    let content_length =
        content_length.ok_or_else(|| RpcError::protocol("missing Content-Length header"))?;
    if content_length > MAX_FRAME_LEN {
        return Err(RpcError::protocol(format!(
            "frame of {} bytes exceeds limit of {}",
            content_length, MAX_FRAME_LEN
        )));
    }

    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            RpcError::ConnectionClosed
        } else {
            RpcError::Io(e)
        }
    })?;

    tracing::trace!(content_length, "received frame");
    Ok(Some(body))
}

/// Write one frame and flush.
pub async fn write_frame<W>(writer: &mut W, body: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let header = format!("Content-Length: {}\r\n\r\n", body.len());
    writer.write_all(header.as_bytes()).await?;
    writer.write_all(body).await?;
    writer.flush().await?;
    tracing::trace!(content_length = body.len(), "sent frame");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    #[tokio::test]
    async fn test_frame_round_trip_over_duplex() {
        let (mut client, server) = tokio::io::duplex(1024);
        let mut reader = BufReader::new(server);

        write_frame(&mut client, br#"{"a":1}"#).await.unwrap();
        write_frame(&mut client, br#"{"b":2}"#).await.unwrap();

        assert_eq!(read_frame(&mut reader).await.unwrap().unwrap(), br#"{"a":1}"#);
        assert_eq!(read_frame(&mut reader).await.unwrap().unwrap(), br#"{"b":2}"#);
    }

    #[tokio::test]
    async fn test_clean_eof_is_none() {
        let mut reader = BufReader::new(&b""[..]);
        assert!(read_frame(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_truncated_body_is_connection_closed() {
        let mut reader = BufReader::new(&b"Content-Length: 10\r\n\r\n{}"[..]);
        let err = read_frame(&mut reader).await.unwrap_err();
        assert!(matches!(err, RpcError::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_missing_length_rejected() {
        let mut reader = BufReader::new(&b"X-Other: 1\r\n\r\n{}"[..]);
        let err = read_frame(&mut reader).await.unwrap_err();
        assert!(matches!(err, RpcError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_invalid_length_rejected() {
        let mut reader = BufReader::new(&b"Content-Length: abc\r\n\r\n"[..]);
        let err = read_frame(&mut reader).await.unwrap_err();
        assert!(matches!(err, RpcError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let header = format!("Content-Length: {}\r\n\r\n", MAX_FRAME_LEN + 1);
        let mut reader = BufReader::new(header.as_bytes());
        let err = read_frame(&mut reader).await.unwrap_err();
        assert!(matches!(err, RpcError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_oversized_header_line_rejected() {
        let header = format!("X-Pad: {}", "a".repeat(MAX_HEADER_LINE * 4));
        let mut reader = BufReader::new(header.as_bytes());
        let err = read_frame(&mut reader).await.unwrap_err();
        assert!(matches!(err, RpcError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_long_header_within_limit_accepted() {
        let pad = "a".repeat(MAX_HEADER_LINE - "X-Pad: \r\n".len());
        let frame = format!("X-Pad: {}\r\nContent-Length: 2\r\n\r\n{{}}", pad);
        let mut reader = BufReader::new(frame.as_bytes());
        assert_eq!(read_frame(&mut reader).await.unwrap().unwrap(), b"{}");
    }
}
