//! The message-layer stack: [`StringwrapLayer`], [`NearUserMessage`], [`SegmentationLayer`].
//!
//! Layers compose by containment, not inheritance: a `SegmentationLayer<T>` owns a `T`.
//! `NearUserMessage` owns a `StringwrapLayer`. Every layer implements the uniform [`Layer`]
//! interface (`size`, `fill_serialized`, `from_serialized`); no runtime dispatch is required on
//! the fast path.
// (c) 2026 nuke-ms contributors

use crate::error::FramingError;
use crate::wire::{
    read_u16, read_u32, write_u16, write_u32, SerializedData, UniqueUserID, MAX_PACKET_SIZE,
};

/// Uniform interface implemented by every wire-protocol layer.
pub trait Layer: Sized {
    /// Exact serialized byte length of this value (constant-time).
    fn size(&self) -> usize;

    /// Writes exactly [`size`](Layer::size) bytes into `out`, appending to whatever is already
    /// there. Never allocates beyond what `out`'s own growth requires.
    fn fill_serialized(&self, out: &mut Vec<u8>);

    /// Parses a value of this layer from a serialized byte view.
    ///
    /// # Errors
    /// Returns [`FramingError::InvalidHeader`], [`FramingError::UndersizedPacket`],
    /// [`FramingError::OversizedPacket`] or [`FramingError::UnalignedPayload`] depending on the
    /// layer and the nature of the malformed input.
    fn from_serialized(data: SerializedData) -> Result<Self, FramingError>;

    /// Convenience: serializes this value into a fresh buffer.
    fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.size());
        self.fill_serialized(&mut out);
        out
    }
}

/////////////////////////////////////////////////////////////////////////////////////////////
// STRINGWRAP LAYER

/// A message-layer whose payload is a sequence of 16-bit code units: the narrow text message,
/// each character widened to `u16` in wire order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StringwrapLayer {
    units: Vec<u16>,
}

impl StringwrapLayer {
    /// Builds a `StringwrapLayer` from a Rust string, widening each UTF-16 code unit.
    #[must_use]
    pub fn from_text(text: &str) -> Self {
        Self {
            units: text.encode_utf16().collect(),
        }
    }

    /// Renders the payload back into a Rust `String`, replacing any unpaired surrogate with the
    /// Unicode replacement character.
    #[must_use]
    pub fn to_text(&self) -> String {
        String::from_utf16_lossy(&self.units)
    }

    /// Number of 16-bit code units carried.
    #[must_use]
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Whether the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

impl Layer for StringwrapLayer {
    fn size(&self) -> usize {
        self.units.len() * 2
    }

    fn fill_serialized(&self, out: &mut Vec<u8>) {
        for unit in &self.units {
            write_u16(out, *unit);
        }
    }

    fn from_serialized(data: SerializedData) -> Result<Self, FramingError> {
        let bytes = data.as_slice();
        if bytes.len() % 2 != 0 {
            return Err(FramingError::UnalignedPayload { len: bytes.len() });
        }
        let units = bytes.chunks_exact(2).map(read_u16).collect();
        Ok(Self { units })
    }
}

/////////////////////////////////////////////////////////////////////////////////////////////
// NEAR USER MESSAGE

/// The layer tag byte identifying a [`NearUserMessage`] inside a [`SegmentationLayer`].
pub const NEAR_USER_MESSAGE_TAG: u8 = 0x41;

/// Fixed header length of [`NearUserMessage`], before the variable-length text payload.
pub const NEAR_USER_MESSAGE_HEADER_LEN: usize = 21;

/// The user-visible message: a routed, identified piece of narrow text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NearUserMessage {
    /// Monotonically increasing (per sender) message identifier.
    pub msg_id: u32,
    /// Intended recipient; [`UniqueUserID::NONE`] means broadcast.
    pub recipient: UniqueUserID,
    /// Sender; may be [`UniqueUserID::NONE`] on the wire, in which case the server stamps it.
    pub sender: UniqueUserID,
    /// The text payload.
    pub text: StringwrapLayer,
}

impl NearUserMessage {
    /// Builds a new message with the given fields.
    #[must_use]
    pub fn new(msg_id: u32, recipient: UniqueUserID, sender: UniqueUserID, text: &str) -> Self {
        Self {
            msg_id,
            recipient,
            sender,
            text: StringwrapLayer::from_text(text),
        }
    }
}

impl Layer for NearUserMessage {
    fn size(&self) -> usize {
        NEAR_USER_MESSAGE_HEADER_LEN + self.text.size()
    }

    fn fill_serialized(&self, out: &mut Vec<u8>) {
        out.push(NEAR_USER_MESSAGE_TAG);
        write_u32(out, self.msg_id);
        self.recipient.fill_serialized(out);
        self.sender.fill_serialized(out);
        self.text.fill_serialized(out);
    }

    fn from_serialized(data: SerializedData) -> Result<Self, FramingError> {
        let bytes = data.as_slice();
        if bytes.len() < NEAR_USER_MESSAGE_HEADER_LEN {
            return Err(FramingError::UndersizedPacket {
                needed: NEAR_USER_MESSAGE_HEADER_LEN,
                got: bytes.len(),
            });
        }
        if bytes[0] != NEAR_USER_MESSAGE_TAG {
            return Err(FramingError::InvalidHeader {
                detail: "NearUserMessage tag byte must be 0x41",
            });
        }
        let msg_id = read_u32(&bytes[1..5]);
        let recipient = UniqueUserID::from_wire_bytes(&bytes[5..13]);
        let sender = UniqueUserID::from_wire_bytes(&bytes[13..21]);

        // Zero-copy: the StringwrapLayer gets a view onto the same backing allocation as `data`.
        let tail_len = bytes.len() - NEAR_USER_MESSAGE_HEADER_LEN;
        let tail = data.slice(NEAR_USER_MESSAGE_HEADER_LEN, tail_len);
        let text = StringwrapLayer::from_serialized(tail)?;

        Ok(Self {
            msg_id,
            recipient,
            sender,
            text,
        })
    }
}

/////////////////////////////////////////////////////////////////////////////////////////////
// SEGMENTATION LAYER

/// The outermost length-prefixed framing header.
pub const SEGMENTATION_TAG: u8 = 0x80;

/// Fixed header length of [`SegmentationLayer`].
pub const SEGMENTATION_HEADER_LEN: usize = 4;

/// The declared size and pad of a segmentation header, decoded without requiring the body to
/// have been read yet. Receive loops use this to learn how many body bytes to read before
/// allocating the body buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentationHeader {
    /// Total frame size, header included.
    pub size: usize,
}

/// Decodes just the 4-byte segmentation header, without touching any body bytes.
///
/// # Errors
/// [`FramingError::InvalidHeader`] if the tag or pad byte is wrong, or the declared size is below
/// the header's own length; [`FramingError::OversizedPacket`] if the declared size exceeds
/// [`MAX_PACKET_SIZE`].
pub fn decode_header(bytes: &[u8; SEGMENTATION_HEADER_LEN]) -> Result<SegmentationHeader, FramingError> {
    if bytes[0] != SEGMENTATION_TAG {
        return Err(FramingError::InvalidHeader {
            detail: "segmentation tag byte must be 0x80",
        });
    }
    if bytes[3] != 0x00 {
        return Err(FramingError::InvalidHeader {
            detail: "segmentation pad byte must be 0x00",
        });
    }
    let size = usize::from(read_u16(&bytes[1..3]));
    if size < SEGMENTATION_HEADER_LEN {
        return Err(FramingError::InvalidHeader {
            detail: "segmentation size field is smaller than the header itself",
        });
    }
    if size > MAX_PACKET_SIZE {
        return Err(FramingError::OversizedPacket {
            size,
            max: MAX_PACKET_SIZE,
        });
    }
    Ok(SegmentationHeader { size })
}

/// The outermost framing layer: a 4-byte length-prefixed header wrapping an `Inner` layer.
///
/// ```text
/// byte  0 : 0x80
/// byte  1 : size_lo    (u16 little-endian, bytes 1..3 inclusive; total frame size)
/// byte  2 : size_hi
/// byte  3 : 0x00
/// bytes 4..size-1 : inner
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentationLayer<Inner: Layer> {
    /// The wrapped layer.
    pub inner: Inner,
}

impl<Inner: Layer> SegmentationLayer<Inner> {
    /// Wraps `inner` in a segmentation frame.
    pub fn new(inner: Inner) -> Self {
        Self { inner }
    }

    /// Unwraps the inner layer.
    pub fn into_inner(self) -> Inner {
        self.inner
    }

    /// Serializes this frame, rejecting it first if `size()` exceeds [`MAX_PACKET_SIZE`].
    ///
    /// `fill_serialized` itself has no way to fail (the [`Layer`] trait's contract is infallible),
    /// so this is the checked entry point outbound callers should use instead of `to_bytes`.
    ///
    /// # Errors
    /// [`FramingError::OversizedPacket`] if the frame's total size exceeds [`MAX_PACKET_SIZE`].
    pub fn try_to_bytes(&self) -> Result<Vec<u8>, FramingError> {
        let total = self.size();
        if total > MAX_PACKET_SIZE {
            return Err(FramingError::OversizedPacket {
                size: total,
                max: MAX_PACKET_SIZE,
            });
        }
        Ok(self.to_bytes())
    }
}

impl<Inner: Layer> Layer for SegmentationLayer<Inner> {
    fn size(&self) -> usize {
        SEGMENTATION_HEADER_LEN + self.inner.size()
    }

    fn fill_serialized(&self, out: &mut Vec<u8>) {
        // Precondition: total <= MAX_PACKET_SIZE. Outbound callers must enforce this via
        // `try_to_bytes` before reaching here; this method has no way to report a violation.
        let total = self.size();
        debug_assert!(total <= MAX_PACKET_SIZE, "oversized frame reached fill_serialized unchecked");
        out.push(SEGMENTATION_TAG);
        write_u16(out, total as u16);
        out.push(0x00);
        self.inner.fill_serialized(out);
    }

    fn from_serialized(data: SerializedData) -> Result<Self, FramingError> {
        let bytes = data.as_slice();
        if bytes.len() < SEGMENTATION_HEADER_LEN {
            return Err(FramingError::UndersizedPacket {
                needed: SEGMENTATION_HEADER_LEN,
                got: bytes.len(),
            });
        }
        let header_bytes: [u8; SEGMENTATION_HEADER_LEN] = bytes[..SEGMENTATION_HEADER_LEN]
            .try_into()
            .expect("slice of exactly SEGMENTATION_HEADER_LEN bytes");
        let header = decode_header(&header_bytes)?;
        if bytes.len() < header.size {
            return Err(FramingError::UndersizedPacket {
                needed: header.size,
                got: bytes.len(),
            });
        }
        let inner_len = header.size - SEGMENTATION_HEADER_LEN;
        let inner_data = data.slice(SEGMENTATION_HEADER_LEN, inner_len);
        let inner = Inner::from_serialized(inner_data)?;
        Ok(Self { inner })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn stringwrap_round_trip() {
        let text = "This is a narrow char string";
        let layer = StringwrapLayer::from_text(text);
        assert_eq!(layer.size(), 56);
        let bytes = layer.to_bytes();
        assert_eq!(bytes.len(), 56);
        let parsed = StringwrapLayer::from_serialized(SerializedData::from(bytes)).unwrap();
        assert_eq!(parsed.to_text(), text);
    }

    #[test]
    fn stringwrap_odd_length_is_unaligned() {
        let data = SerializedData::from(vec![1, 2, 3]);
        let err = StringwrapLayer::from_serialized(data).unwrap_err();
        assert_eq!(err, FramingError::UnalignedPayload { len: 3 });
    }

    #[test]
    fn near_user_message_empty_string_size_is_21() {
        let msg = NearUserMessage::new(1, UniqueUserID::NONE, UniqueUserID::NONE, "");
        assert_eq!(msg.size(), 21);
        let bytes = msg.to_bytes();
        let parsed = NearUserMessage::from_serialized(SerializedData::from(bytes)).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn near_user_message_wrong_tag_is_invalid_header() {
        use assertables::assert_matches;
        let mut bytes = NearUserMessage::new(1, UniqueUserID::NONE, UniqueUserID::NONE, "hi").to_bytes();
        bytes[0] = 0x99;
        let err = NearUserMessage::from_serialized(SerializedData::from(bytes)).unwrap_err();
        assert_matches!(err, FramingError::InvalidHeader { .. });
    }

    #[test]
    fn framed_near_user_message_scenario() {
        // "With love" from sender "from me" to recipient "to you", msg_id 0xF0.
        let recipient = UniqueUserID::from(0x0000_756f_7920_6f74);
        let sender = UniqueUserID::from(0x0000_656d_206d_6f72);
        let msg = NearUserMessage::new(0xF0, recipient, sender, "With love");
        assert_eq!(msg.size(), 21 + 18);

        let frame = SegmentationLayer::new(msg.clone());
        assert_eq!(frame.size(), 43);

        let bytes = frame.to_bytes();
        assert_eq!(&bytes[0..4], &[0x80, 0x2B, 0x00, 0x00]);
        assert_eq!(bytes[4], 0x41);
        assert_eq!(&bytes[5..9], &[0xF0, 0x00, 0x00, 0x00]);

        let parsed = SegmentationLayer::<NearUserMessage>::from_serialized(SerializedData::from(bytes)).unwrap();
        assert_eq!(parsed.inner, msg);
    }

    #[test]
    fn segmentation_header_only_frame_parses() {
        let bytes = vec![0x80, 0x04, 0x00, 0x00];
        let header = decode_header(&bytes.clone().try_into().unwrap()).unwrap();
        assert_eq!(header.size, 4);
        let parsed = SegmentationLayer::<StringwrapLayer>::from_serialized(SerializedData::from(bytes)).unwrap();
        assert!(parsed.inner.is_empty());
    }

    #[test]
    fn segmentation_max_size_accepted_one_more_rejected() {
        let mut at_max = [0u8; 4];
        at_max[0] = 0x80;
        let max = MAX_PACKET_SIZE as u16;
        at_max[1..3].copy_from_slice(&max.to_le_bytes());
        assert!(decode_header(&at_max).is_ok());

        let mut over = at_max;
        let over_size = MAX_PACKET_SIZE as u32 + 1;
        over[1..3].copy_from_slice(&(over_size as u16).to_le_bytes());
        let err = decode_header(&over).unwrap_err();
        assert_eq!(
            err,
            FramingError::OversizedPacket {
                size: over_size as usize,
                max: MAX_PACKET_SIZE
            }
        );
    }

    #[test]
    fn segmentation_header_bad_tag_or_pad_is_invalid() {
        use assertables::assert_matches;
        assert_matches!(
            decode_header(&[0x00, 0x04, 0x00, 0x00]).unwrap_err(),
            FramingError::InvalidHeader { .. }
        );
        assert_matches!(
            decode_header(&[0x80, 0x04, 0x00, 0x01]).unwrap_err(),
            FramingError::InvalidHeader { .. }
        );
    }
}
