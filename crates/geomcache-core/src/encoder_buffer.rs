use byteorder::{LittleEndian, WriteBytesExt};

/// Growable little-endian byte buffer for block payloads.
///
/// Writes into a `Vec<u8>` never fail, so the encode methods do not return
/// a status.
#[derive(Debug, Clone, Default)]
pub struct EncoderBuffer {
    buffer: Vec<u8>,
}

impl EncoderBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    pub fn data(&self) -> &[u8] {
        &self.buffer
    }

    pub fn size(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buffer
    }

    #[inline]
    pub fn encode_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    #[inline]
    pub fn encode_u16(&mut self, value: u16) {
        let _ = self.buffer.write_u16::<LittleEndian>(value);
    }

    #[inline]
    pub fn encode_i16(&mut self, value: i16) {
        let _ = self.buffer.write_i16::<LittleEndian>(value);
    }

    #[inline]
    pub fn encode_u32(&mut self, value: u32) {
        let _ = self.buffer.write_u32::<LittleEndian>(value);
    }

    #[inline]
    pub fn encode_u64(&mut self, value: u64) {
        let _ = self.buffer.write_u64::<LittleEndian>(value);
    }

    #[inline]
    pub fn encode_f32(&mut self, value: f32) {
        let _ = self.buffer.write_f32::<LittleEndian>(value);
    }

    pub fn encode_f32_slice(&mut self, values: &[f32]) {
        for &v in values {
            self.encode_f32(v);
        }
    }

    pub fn encode_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Writes a u32 byte length followed by the UTF-8 bytes.
    pub fn encode_string(&mut self, value: &str) {
        self.encode_u32(value.len() as u32);
        self.encode_bytes(value.as_bytes());
    }

    /// Appends `count` zero bytes.
    pub fn encode_padding(&mut self, count: usize) {
        self.buffer.resize(self.buffer.len() + count, 0);
    }

    /// Zero-pads the buffer to a multiple of `alignment`.
    pub fn pad_to(&mut self, alignment: usize) {
        if alignment > 1 {
            let rem = self.buffer.len() % alignment;
            if rem != 0 {
                self.encode_padding(alignment - rem);
            }
        }
    }

    /// Overwrites a u32 at `offset`. Returns false when out of range.
    pub fn patch_u32(&mut self, offset: usize, value: u32) -> bool {
        match self.buffer.get_mut(offset..offset + 4) {
            Some(slot) => {
                slot.copy_from_slice(&value.to_le_bytes());
                true
            }
            None => false,
        }
    }
}

impl AsRef<[u8]> for EncoderBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.buffer
    }
}
