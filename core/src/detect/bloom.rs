//! Bloom filter over byte strings.
//!
//! Double-hash scheme: two seeded splitmix64 stream hashes `h1`, `h2`, with
//! the i-th probe at `(h1 + i*h2) mod m`. False positives are possible and
//! acceptable; false negatives are not.

const SEED_H1: u64 = 0x9e37_79b9_7f4a_7c15;
const SEED_H2: u64 = 0xbf58_476d_1ce4_e5b9;

/// Default filter width in bits.
pub const DEFAULT_BITS: usize = 16_384;
/// Default number of probes per element.
pub const DEFAULT_HASHES: u32 = 4;

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9e37_79b9_7f4a_7c15);
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}

fn hash_seeded(bytes: &[u8], seed: u64) -> u64 {
    let mut h = seed;
    for &b in bytes {
        h = splitmix64(h ^ u64::from(b));
    }
    h
}

/// A fixed-width Bloom filter.
#[derive(Debug, Clone)]
pub struct BloomFilter {
    words: Vec<u64>,
    nbits: u64,
    hashes: u32,
}

impl Default for BloomFilter {
    fn default() -> Self {
        Self::new(DEFAULT_BITS, DEFAULT_HASHES)
    }
}

impl BloomFilter {
    /// Creates a filter of at least `bits` bits (rounded up to a whole
    /// 64-bit word) probed `hashes` times per element.
    pub fn new(bits: usize, hashes: u32) -> Self {
        assert!(bits > 0 && hashes > 0, "degenerate bloom filter");
        let words = bits.div_ceil(64);
        BloomFilter {
            words: vec![0u64; words],
            nbits: (words * 64) as u64,
            hashes,
        }
    }

    pub fn add(&mut self, bytes: &[u8]) {
        let h1 = hash_seeded(bytes, SEED_H1);
        let h2 = hash_seeded(bytes, SEED_H2);
        for i in 0..u64::from(self.hashes) {
            let bit = h1.wrapping_add(i.wrapping_mul(h2)) % self.nbits;
            self.words[(bit >> 6) as usize] |= 1u64 << (bit & 63);
        }
    }

    /// `true` if `bytes` may have been added; `false` means definitely not.
    pub fn possibly_contains(&self, bytes: &[u8]) -> bool {
        let h1 = hash_seeded(bytes, SEED_H1);
        let h2 = hash_seeded(bytes, SEED_H2);
        (0..u64::from(self.hashes)).all(|i| {
            let bit = h1.wrapping_add(i.wrapping_mul(h2)) % self.nbits;
            self.words[(bit >> 6) as usize] & (1u64 << (bit & 63)) != 0
        })
    }

    /// Resets the filter to empty.
    pub fn clear(&mut self) {
        self.words.fill(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_bloom_no_false_negatives() {
        let mut bloom = BloomFilter::default();
        let entries: Vec<String> = (0..1000).map(|i| format!("entry-{}", i)).collect();
        for entry in &entries {
            bloom.add(entry.as_bytes());
        }
        for entry in &entries {
            assert!(bloom.possibly_contains(entry.as_bytes()));
        }
    }

    #[test]
    fn core_bloom_mostly_rejects_absent() {
        let mut bloom = BloomFilter::default();
        for i in 0..100 {
            bloom.add(format!("present-{}", i).as_bytes());
        }
        let false_positives = (0..1000)
            .filter(|i| bloom.possibly_contains(format!("absent-{}", i).as_bytes()))
            .count();
        // 16384 bits / 100 entries / k=4 leaves the false-positive rate
        // far below this.
        assert!(false_positives < 50, "{} false positives", false_positives);
    }

    #[test]
    fn core_bloom_clear() {
        let mut bloom = BloomFilter::new(1024, 3);
        bloom.add(b"something");
        assert!(bloom.possibly_contains(b"something"));
        bloom.clear();
        assert!(!bloom.possibly_contains(b"something"));
    }
}
