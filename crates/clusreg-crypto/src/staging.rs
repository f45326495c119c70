//! Caller-owned input buffers.

/// A copy of the input the provider reads from.
///
/// Always holds at least one byte of storage, so the pointer handed to the
/// provider is valid even for empty input.
#[derive(Debug, Clone)]
pub struct StagingBuffer {
    storage: Vec<u8>,
    len: usize,
}

impl StagingBuffer {
    pub fn new(data: &[u8]) -> Self {
        let mut storage = vec![0u8; data.len().max(1)];
        storage[..data.len()].copy_from_slice(data);
        StagingBuffer {
            storage,
            len: data.len(),
        }
    }

    /// Number of input bytes, which may be zero.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes of storage backing the buffer; never zero.
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.storage[..self.len]
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.storage.as_ptr()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_still_has_storage() {
        let staged = StagingBuffer::new(&[]);
        assert!(staged.is_empty());
        assert_eq!(staged.capacity(), 1);
        assert!(!staged.as_ptr().is_null());
        assert!(staged.as_slice().is_empty());
    }

    #[test]
    fn copies_input() {
        let mut input = vec![1u8, 2, 3];
        let staged = StagingBuffer::new(&input);
        input[0] = 9;
        assert_eq!(staged.as_slice(), &[1, 2, 3]);
        assert_eq!(staged.len(), 3);
        assert_eq!(staged.capacity(), 3);
    }
}
