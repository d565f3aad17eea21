use crate::cipher::hmac_sha256;
use crate::types::random_bytes;
use hmac::Mac;
use zeroize::{Zeroize, ZeroizeOnDrop};

const PART_LENGTH: usize = 32;
const RATCHET_LENGTH: usize = 4 * PART_LENGTH;

/// The Megolm hash ratchet: four 32 byte parts R(0)..R(3) and a counter.
///
/// R(i) is rehashed every 2^(8 * (3 - i)) steps, so any later index can be
/// reached from an earlier one in at most 1020 hash operations while earlier
/// indices stay unreachable.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MegolmRatchet {
    parts: Box<[u8; RATCHET_LENGTH]>,
    counter: u32,
}

impl MegolmRatchet {
    /// A fresh ratchet with random state at index 0.
    pub(crate) fn new() -> Self {
        Self {
            parts: random_bytes::<RATCHET_LENGTH>(),
            counter: 0,
        }
    }

    pub(crate) fn from_parts(parts: &[u8; RATCHET_LENGTH], counter: u32) -> Self {
        Self {
            parts: Box::new(*parts),
            counter,
        }
    }

    /// The current message index.
    pub fn index(&self) -> u32 {
        self.counter
    }

    pub(crate) fn as_bytes(&self) -> &[u8; RATCHET_LENGTH] {
        &self.parts
    }

    fn part(&self, index: usize) -> [u8; PART_LENGTH] {
        let mut part = [0u8; PART_LENGTH];
        part.copy_from_slice(&self.parts[index * PART_LENGTH..(index + 1) * PART_LENGTH]);
        part
    }

    /// R(to) = HMAC(R(from), to)
    fn rehash(&mut self, from: usize, to: usize) {
        let mut key = self.part(from);
        let mut mac = hmac_sha256(&key);
        key.zeroize();

        // Part indices are at most 3.
        mac.update(&[to as u8]);
        let digest = mac.finalize().into_bytes();
        self.parts[to * PART_LENGTH..(to + 1) * PART_LENGTH].copy_from_slice(&digest);
    }

    /// Steps the ratchet forward by one index.
    pub(crate) fn advance(&mut self) {
        self.counter = self.counter.wrapping_add(1);

        // The highest part whose period divides the new counter gets rehashed,
        // and every lower-order part is reseeded from it.
        let mut mask: u32 = 0x00FF_FFFF;
        let mut highest = 0;
        while highest < 4 && self.counter & mask != 0 {
            highest += 1;
            mask >>= 8;
        }

        for part in (highest..4).rev() {
            self.rehash(highest, part);
        }
    }

    /// Fast-forwards the ratchet to `target`. A target below the current
    /// index is treated as a wrap-around of the 32 bit counter.
    pub(crate) fn advance_to(&mut self, target: u32) {
        for part in 0..4 {
            let shift = (3 - part) * 8;
            let mask = !0u32 << shift;

            // Only the low byte of the difference matters for this part.
            let mut steps = (target >> shift).wrapping_sub(self.counter >> shift) & 0xff;

            if steps == 0 {
                // R(0) may need a full cycle when the counter has wrapped.
                if target < self.counter {
                    steps = 0x100;
                } else {
                    continue;
                }
            }

            // Every step but the last only touches this part.
            while steps > 1 {
                self.rehash(part, part);
                steps -= 1;
            }

            for lower in (part..4).rev() {
                self.rehash(part, lower);
            }

            self.counter = target & mask;
        }
    }
}

impl std::fmt::Debug for MegolmRatchet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MegolmRatchet")
            .field("index", &self.counter)
            .finish_non_exhaustive()
    }
}
