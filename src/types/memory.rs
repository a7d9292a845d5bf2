/// Flat arena of NUL-terminated strings referenced by byte offset.
///
/// Offset `0` always holds the empty string and stands for an absent
/// operand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Memory(Vec<u8>);

impl Memory {
    #[must_use]
    pub fn new() -> Self {
        Self(vec![0])
    }

    /// Wrap raw arena bytes.
    ///
    /// # Panics
    ///
    /// Panics if `bytes` does not start with the reserved NUL byte.
    #[must_use]
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        let mut bytes = bytes.into();
        assert_eq!(bytes.first(), Some(&0), "memory must start with the reserved empty string");
        if bytes.last() != Some(&0) {
            bytes.push(0);
        }
        Self(bytes)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the arena holds no bytes at all. Every constructor stores
    /// the reserved NUL byte, so a `Memory` is never empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The string starting at `offset`, up to its terminating NUL.
    ///
    /// Out-of-range offsets and non-UTF-8 contents read as the empty string.
    #[must_use]
    pub fn str_at(&self, offset: u32) -> &str {
        let Some(tail) = self.0.get(offset as usize..) else {
            return "";
        };
        let end = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
        std::str::from_utf8(&tail[..end]).unwrap_or("")
    }

    /// Offset of the first interned string equal to `value`.
    #[must_use]
    pub fn offset_of(&self, value: &str) -> Option<u32> {
        if value.is_empty() {
            return Some(0);
        }
        let mut start = 1;
        while start < self.0.len() {
            let candidate = self.str_at(start as u32);
            if candidate == value {
                return u32::try_from(start).ok();
            }
            start += candidate.len() + 1;
        }
        None
    }

    /// Whether `offset` is the first byte of an interned string.
    #[must_use]
    pub fn is_string_start(&self, offset: u32) -> bool {
        let offset = offset as usize;
        offset == 0 || (offset < self.0.len() && self.0[offset - 1] == 0)
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}
