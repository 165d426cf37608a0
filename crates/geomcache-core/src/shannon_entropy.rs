/// Byte histogram used to estimate how well a residual buffer compresses.
#[derive(Clone, Debug)]
pub struct ByteHistogram {
    frequencies: [u32; 256],
    num_values: u64,
}

impl Default for ByteHistogram {
    fn default() -> Self {
        Self::new()
    }
}

impl ByteHistogram {
    pub fn new() -> Self {
        Self {
            frequencies: [0; 256],
            num_values: 0,
        }
    }

    #[inline]
    pub fn push(&mut self, byte: u8) {
        self.frequencies[byte as usize] += 1;
        self.num_values += 1;
    }

    pub fn push_slice(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.push(b);
        }
    }

    pub fn num_values(&self) -> u64 {
        self.num_values
    }

    /// Empirical Shannon entropy in bits per byte, in `[0, 8]`.
    pub fn entropy(&self) -> f64 {
        if self.num_values == 0 {
            return 0.0;
        }
        let total = self.num_values as f64;
        let mut entropy = 0.0;
        for &frequency in self.frequencies.iter().filter(|&&f| f > 0) {
            let p = frequency as f64 / total;
            entropy -= p * p.log2();
        }
        entropy
    }
}

/// Bits per byte of `bytes`.
pub fn byte_entropy(bytes: &[u8]) -> f64 {
    let mut histogram = ByteHistogram::new();
    histogram.push_slice(bytes);
    histogram.entropy()
}
