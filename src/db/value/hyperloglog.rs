/// Register count: 2^14.
pub const REGISTERS: usize = 16384;

const INDEX_BITS: u32 = 14;
const INDEX_MASK: u64 = (REGISTERS as u64) - 1;

/// A HyperLogLog cardinality sketch with one byte per register.
#[derive(Clone, Debug, PartialEq)]
pub struct HyperLogLog {
    registers: Box<[u8; REGISTERS]>,
}

impl Default for HyperLogLog {
    fn default() -> Self {
        HyperLogLog {
            registers: Box::new([0; REGISTERS]),
        }
    }
}

/// FNV-1a with a splitmix-style finalizer. The hash must be deterministic
/// across processes so persisted sketches stay meaningful.
fn hash64(data: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for &byte in data {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash ^= hash >> 33;
    hash = hash.wrapping_mul(0xff51_afd7_ed55_8ccd);
    hash ^= hash >> 33;
    hash = hash.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    hash ^ (hash >> 33)
}

impl HyperLogLog {
    /// Observe an element. True when any register changed.
    pub fn add(&mut self, element: &[u8]) -> bool {
        let hash = hash64(element);
        #[allow(clippy::cast_possible_truncation)]
        let index = (hash & INDEX_MASK) as usize;
        let rest = hash >> INDEX_BITS;
        // Run length of trailing zeroes in the remaining 50 bits, plus one.
        #[allow(clippy::cast_possible_truncation)]
        let rank = (u64::from(rest.trailing_zeros()).min(64 - u64::from(INDEX_BITS)) + 1) as u8;
        if rank > self.registers[index] {
            self.registers[index] = rank;
            true
        } else {
            false
        }
    }

    /// The cardinality estimate, with linear counting for the small range.
    pub fn count(&self) -> u64 {
        let m = REGISTERS as f64;
        let mut sum = 0.0;
        let mut zeros = 0u32;
        for &register in self.registers.iter() {
            sum += (-f64::from(register)).exp2();
            if register == 0 {
                zeros += 1;
            }
        }

        let alpha = 0.7213 / (1.0 + 1.079 / m);
        let estimate = alpha * m * m / sum;

        let estimate = if estimate <= 2.5 * m && zeros > 0 {
            m * (m / f64::from(zeros)).ln()
        } else {
            estimate
        };

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let rounded = estimate.round().max(0.0) as u64;
        rounded
    }

    /// Merge another sketch in: element-wise register maximum.
    pub fn merge(&mut self, other: &HyperLogLog) -> bool {
        let mut changed = false;
        for (register, &incoming) in self.registers.iter_mut().zip(other.registers.iter()) {
            if incoming > *register {
                *register = incoming;
                changed = true;
            }
        }
        changed
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.registers[..]
    }

    /// Rebuild from a persisted register file.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != REGISTERS {
            return None;
        }
        let mut sketch = HyperLogLog::default();
        sketch.registers.copy_from_slice(bytes);
        Some(sketch)
    }
}
