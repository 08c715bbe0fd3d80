/// Growable buffer backed by a `Vec<u8>`, filled incrementally by successive encode calls.
///
/// Used by `flexnet-proto`'s message encoders to assemble outgoing request bodies
/// field by field without pre-computing a final length.
pub struct WriteBuf {
    inner: Vec<u8>,
    filled: usize,
}

impl WriteBuf {
    pub const fn new() -> Self {
        Self {
            inner: Vec::new(),
            filled: 0,
        }
    }

    pub fn filled(&self) -> &[u8] {
        &self.inner[..self.filled]
    }

    pub fn clear(&mut self) {
        self.filled = 0;
    }

    pub fn write_slice(&mut self, slice: &[u8]) {
        let n = slice.len();
        if self.inner.len() < self.filled + n {
            self.inner.resize(self.filled + n, 0);
        }
        self.inner[self.filled..self.filled + n].copy_from_slice(slice);
        self.filled += n;
    }
}

impl Default for WriteBuf {
    fn default() -> Self {
        Self::new()
    }
}
