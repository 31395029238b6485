//! Bounds-checked little-endian reads over a byte slice.

pub(crate) struct ByteReader<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, offset: 0 }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.offset
    }

    pub fn u32(&mut self) -> Option<u32> {
        let bytes = self.take(4)?;
        Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn u8(&mut self) -> Option<u8> {
        let bytes = self.take(1)?;
        Some(bytes[0])
    }

    /// Read `count` consecutive f32 values.
    pub fn f32s(&mut self, count: usize) -> Option<Vec<f32>> {
        let bytes = self.take(count.checked_mul(4)?)?;
        Some(
            bytes
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        )
    }

    pub fn bytes(&mut self, count: usize) -> Option<&'a [u8]> {
        self.take(count)
    }

    fn take(&mut self, count: usize) -> Option<&'a [u8]> {
        let end = self.offset.checked_add(count)?;
        if end > self.buf.len() {
            return None;
        }
        let slice = &self.buf[self.offset..end];
        self.offset = end;
        Some(slice)
    }
}
