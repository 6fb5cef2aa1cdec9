//! A shared, reference-counted view over a byte region.
// (c) 2026 nuke-ms contributors

use bytes::Bytes;

/// A view over an externally-owned byte region, plus a shared ownership handle keeping that
/// region alive for as long as any view into it exists.
///
/// This is a thin newtype over [`bytes::Bytes`], which already provides exactly the contract the
/// wire layers need: an atomically refcounted backing allocation plus an offset/length view, with
/// cheap `O(1)` sub-slicing that shares the same backing allocation rather than copying. Every
/// parsed upper layer that references a slice of an inbound packet holds its own `SerializedData`
/// pointing at the same underlying buffer, so the buffer is freed only once the last layer
/// referencing it is dropped.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SerializedData(Bytes);

impl SerializedData {
    /// Length in bytes of this view.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether this view is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrows the bytes of this view.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// Returns a sub-view `[start, start+len)`, sharing the same backing allocation.
    ///
    /// # Panics
    /// Panics if the requested range is out of bounds, mirroring `bytes::Bytes::slice`.
    #[must_use]
    pub fn slice(&self, start: usize, len: usize) -> Self {
        Self(self.0.slice(start..start + len))
    }
}

impl From<Bytes> for SerializedData {
    fn from(b: Bytes) -> Self {
        Self(b)
    }
}

impl From<Vec<u8>> for SerializedData {
    fn from(v: Vec<u8>) -> Self {
        Self(Bytes::from(v))
    }
}

impl AsRef<[u8]> for SerializedData {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn slice_shares_backing_storage() {
        let whole = SerializedData::from(vec![1, 2, 3, 4, 5, 6]);
        let head = whole.slice(0, 3);
        let tail = whole.slice(3, 3);
        assert_eq!(head.as_slice(), &[1, 2, 3]);
        assert_eq!(tail.as_slice(), &[4, 5, 6]);
        // The original view is still valid after sub-slices were taken.
        assert_eq!(whole.as_slice(), &[1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn empty_view() {
        let empty = SerializedData::from(Vec::new());
        assert!(empty.is_empty());
        assert_eq!(empty.len(), 0);
    }
}
