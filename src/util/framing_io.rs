//! Header-then-body frame I/O shared by the client receive loop and the server connected-client
//! receive loop.
// (c) 2026 nuke-ms contributors

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::error::{CoreError, FramingError};
use crate::wire::{decode_header, SerializedData, SEGMENTATION_HEADER_LEN};

/// Reads exactly one segmentation frame off `reader` and returns its body (everything after the
/// 4-byte header, i.e. beginning with the inner layer's tag byte).
///
/// This is the "(a) read 4 bytes, (b) decode header, (c) allocate body, (d) read body" sequence
/// from the receive-loop algorithm, shared verbatim between the client and the server since both
/// sides speak the same framing.
///
/// # Errors
/// [`CoreError::Framing`] if the header is malformed or declares an oversized frame;
/// [`CoreError::Io`] if the underlying read fails (including a clean EOF, reported as
/// `UnexpectedEof`).
pub(crate) async fn read_frame<R>(reader: &mut R) -> Result<SerializedData, CoreError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; SEGMENTATION_HEADER_LEN];
    reader.read_exact(&mut header).await?;
    let parsed = decode_header(&header)?;

    let body_len = parsed.size - SEGMENTATION_HEADER_LEN;
    let mut body = vec![0u8; body_len];
    if body_len > 0 {
        reader.read_exact(&mut body).await?;
    }
    trace!(size = parsed.size, "read frame");
    Ok(SerializedData::from(body))
}

/// Writes `frame_bytes` (a complete, pre-serialized segmentation frame) to `writer` and flushes.
///
/// The caller keeps the buffer alive for the duration of this call; once it returns the data has
/// either been fully handed to the OS or an error has been reported — there is no partial-write
/// state visible to callers.
///
/// # Errors
/// [`CoreError::Io`] if the underlying write fails.
pub(crate) async fn write_frame<W>(writer: &mut W, frame_bytes: &[u8]) -> Result<(), CoreError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(frame_bytes).await?;
    writer.flush().await?;
    Ok(())
}

/// Maps a raw framing decode failure that occurred while only a header (not yet a full frame)
/// was available. Kept as a distinct helper so call sites reporting "Oversized packet." etc. use
/// exactly the taxonomy's `Display` text.
pub(crate) fn framing_reason(err: &FramingError) -> String {
    err.to_string()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::wire::{Layer, NearUserMessage, SegmentationLayer, UniqueUserID};
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn reads_header_only_frame() {
        let mut mock = Builder::new().read(&[0x80, 0x04, 0x00, 0x00]).build();
        let body = read_frame(&mut mock).await.unwrap();
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn reads_full_near_user_message_frame() {
        let msg = NearUserMessage::new(1, UniqueUserID::NONE, UniqueUserID::NONE, "hi");
        let frame = SegmentationLayer::new(msg.clone()).to_bytes();
        let mut mock = Builder::new().read(&frame).build();
        let body = read_frame(&mut mock).await.unwrap();
        let parsed = NearUserMessage::from_serialized(body).unwrap();
        assert_eq!(parsed, msg);
    }

    #[tokio::test]
    async fn oversized_header_is_rejected_before_reading_body() {
        let mut header = [0x80u8, 0x00, 0x00, 0x00];
        // size = 0x9000, above MAX_PACKET_SIZE; no body bytes are queued on the mock, proving
        // the body is never read once the header is rejected.
        header[1..3].copy_from_slice(&0x9000u16.to_le_bytes());
        let mut mock = Builder::new().read(&header).build();
        let err = read_frame(&mut mock).await.unwrap_err();
        assertables::assert_matches!(err, CoreError::Framing(FramingError::OversizedPacket { .. }));
    }

    #[tokio::test]
    async fn writes_then_reads_back() {
        let msg = NearUserMessage::new(7, UniqueUserID::NONE, UniqueUserID::from(9), "round trip");
        let frame = SegmentationLayer::new(msg.clone()).to_bytes();
        let mut mock = Builder::new().write(&frame).read(&frame).build();
        write_frame(&mut mock, &frame).await.unwrap();
        let body = read_frame(&mut mock).await.unwrap();
        assert_eq!(NearUserMessage::from_serialized(body).unwrap(), msg);
    }
}
