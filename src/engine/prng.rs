//! Seeded pseudo-random generators for the shared noise stream.
//!
//! Xoshiro128** (state filled from SplitMix32) is the default. Mulberry32
//! is kept for compatibility with older identities. Outputs are
//! bit-identical to the page-world implementation so both worlds can
//! rebuild the same stream from a seed.
//!
//! Not cryptographic. The seed is the only secret and it is already
//! derived from the salt.

use rand::{RngCore, SeedableRng};
use std::cell::RefCell;
use std::rc::Rc;

use crate::config::PrngAlgorithm;

/// 2^32 as f64, the divisor mapping a u32 draw onto [0, 1).
pub const TWO_POW_32: f64 = 4_294_967_296.0;

#[inline]
fn to_unit(value: u32) -> f64 {
    value as f64 / TWO_POW_32
}

/// SplitMix32, used only to expand a 32-bit seed into xoshiro state.
#[derive(Debug, Clone)]
pub struct SplitMix32 {
    state: u32,
}

impl SplitMix32 {
    pub fn new(seed: u32) -> Self {
        Self { state: seed }
    }

    #[inline]
    pub fn next_u32(&mut self) -> u32 {
        self.state = self.state.wrapping_add(0x9E37_79B9);
        let mut t = self.state ^ (self.state >> 16);
        t = t.wrapping_mul(0x21F0_AAAD);
        t ^= t >> 15;
        t = t.wrapping_mul(0x735A_2D97);
        t ^ (t >> 15)
    }

    #[inline]
    pub fn next_f64(&mut self) -> f64 {
        to_unit(self.next_u32())
    }
}

/// Xoshiro128** with 128 bits of state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Xoshiro128StarStar {
    s: [u32; 4],
}

impl Xoshiro128StarStar {
    pub fn new(seed: u32) -> Self {
        let mut mix = SplitMix32::new(seed);
        let mut s = [0u32; 4];
        for word in s.iter_mut() {
            // Scale through [0, 1) onto [0, 2^32 - 1), truncating
            *word = (mix.next_f64() * 4_294_967_295.0) as u32;
        }
        Self { s }
    }

    #[inline]
    pub fn next_u32(&mut self) -> u32 {
        let s = &mut self.s;
        let result = s[1].wrapping_mul(5).rotate_left(7).wrapping_mul(9);
        let t = s[1] << 9;

        s[2] ^= s[0];
        s[3] ^= s[1];
        s[1] ^= s[2];
        s[0] ^= s[3];
        s[2] ^= t;
        s[3] = s[3].rotate_left(11);

        result
    }

    #[inline]
    pub fn next_f64(&mut self) -> f64 {
        to_unit(self.next_u32())
    }
}

/// Mulberry32, the legacy single-word generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mulberry32 {
    state: u32,
}

impl Mulberry32 {
    pub fn new(seed: u32) -> Self {
        Self { state: seed }
    }

    #[inline]
    pub fn next_u32(&mut self) -> u32 {
        self.state = self.state.wrapping_add(0x6D2B_79F5);
        let a = self.state;
        let mut t = (a ^ (a >> 15)).wrapping_mul(1 | a);
        t = t.wrapping_add((t ^ (t >> 7)).wrapping_mul(61 | t)) ^ t;
        t ^ (t >> 14)
    }

    #[inline]
    pub fn next_f64(&mut self) -> f64 {
        to_unit(self.next_u32())
    }
}

macro_rules! impl_rand_traits {
    ($ty:ty) => {
        impl RngCore for $ty {
            fn next_u32(&mut self) -> u32 {
                <$ty>::next_u32(self)
            }

            fn next_u64(&mut self) -> u64 {
                let lo = <$ty>::next_u32(self) as u64;
                let hi = <$ty>::next_u32(self) as u64;
                (hi << 32) | lo
            }

            fn fill_bytes(&mut self, dest: &mut [u8]) {
                for chunk in dest.chunks_mut(4) {
                    let bytes = <$ty>::next_u32(self).to_le_bytes();
                    chunk.copy_from_slice(&bytes[..chunk.len()]);
                }
            }

            fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
                self.fill_bytes(dest);
                Ok(())
            }
        }

        impl SeedableRng for $ty {
            type Seed = [u8; 4];

            fn from_seed(seed: Self::Seed) -> Self {
                <$ty>::new(u32::from_le_bytes(seed))
            }
        }
    };
}

impl_rand_traits!(SplitMix32);
impl_rand_traits!(Xoshiro128StarStar);
impl_rand_traits!(Mulberry32);

/// Either generator, chosen by [`PrngAlgorithm`].
#[derive(Debug, Clone)]
pub enum Generator {
    Xoshiro(Xoshiro128StarStar),
    Mulberry(Mulberry32),
}

impl Generator {
    pub fn new(algorithm: PrngAlgorithm, seed: u32) -> Self {
        match algorithm {
            PrngAlgorithm::Xoshiro128StarStar => Generator::Xoshiro(Xoshiro128StarStar::new(seed)),
            PrngAlgorithm::Mulberry32 => Generator::Mulberry(Mulberry32::new(seed)),
        }
    }

    #[inline]
    pub fn next_u32(&mut self) -> u32 {
        match self {
            Generator::Xoshiro(g) => g.next_u32(),
            Generator::Mulberry(g) => g.next_u32(),
        }
    }

    #[inline]
    pub fn next_f64(&mut self) -> f64 {
        to_unit(self.next_u32())
    }
}

/// Handle to the one generator every consumer in a context draws from.
///
/// Clones share state; draw order across clones is the order of calls.
#[derive(Debug, Clone)]
pub struct SharedPrng(Rc<RefCell<Generator>>);

impl SharedPrng {
    pub fn new(algorithm: PrngAlgorithm, seed: u32) -> Self {
        Self(Rc::new(RefCell::new(Generator::new(algorithm, seed))))
    }

    /// Next draw in [0, 1).
    #[inline]
    pub fn draw(&self) -> f64 {
        self.0.borrow_mut().next_f64()
    }

    #[inline]
    pub fn next_u32(&self) -> u32 {
        self.0.borrow_mut().next_u32()
    }

    /// Uniform index in `0..len` (`len` must be non-zero).
    #[inline]
    pub fn index(&self, len: usize) -> usize {
        ((self.draw() * len as f64) as usize).min(len.saturating_sub(1))
    }

    /// Fisher-Yates shuffle driven by this stream.
    pub fn shuffle<T>(&self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = self.index(i + 1);
            items.swap(i, j);
        }
    }
}
