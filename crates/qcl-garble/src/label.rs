//! Wire labels and the global free-XOR offset.

use std::fmt;
use std::ops::{BitXor, BitXorAssign};

use rand::Rng;

/// A 128-bit wire label. The least significant bit of the first byte is
/// the point-and-permute bit.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct Label(pub [u8; 16]);

impl Label {
    pub fn random(rng: &mut impl Rng) -> Label {
        let mut bytes = [0u8; 16];
        rng.fill(&mut bytes);
        Label(bytes)
    }

    /// The point-and-permute bit.
    #[inline]
    pub fn permute_bit(&self) -> bool {
        self.0[0] & 1 != 0
    }
}

impl BitXor for Label {
    type Output = Label;

    fn bitxor(mut self, rhs: Label) -> Label {
        self ^= rhs;
        self
    }
}

impl BitXorAssign for Label {
    fn bitxor_assign(&mut self, rhs: Label) {
        for (a, b) in self.0.iter_mut().zip(rhs.0) {
            *a ^= b;
        }
    }
}

impl fmt::Debug for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl From<[u8; 16]> for Label {
    fn from(bytes: [u8; 16]) -> Label {
        Label(bytes)
    }
}

impl From<Label> for [u8; 16] {
    fn from(label: Label) -> [u8; 16] {
        label.0
    }
}

/// The global free-XOR offset `R`: `label_one = label_zero ^ R` for
/// every wire. The permute bit of `R` is forced to one so a label pair
/// always has complementary permute bits.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Delta(Label);

impl Delta {
    pub fn random(rng: &mut impl Rng) -> Delta {
        let mut label = Label::random(rng);
        label.0[0] |= 1;
        Delta(label)
    }

    #[inline]
    pub fn label(&self) -> Label {
        self.0
    }

    /// The one-label of a pair given its zero-label.
    #[inline]
    pub fn one_label(&self, zero: Label) -> Label {
        zero ^ self.0
    }

    /// Select the label for a concrete bit value.
    #[inline]
    pub fn select(&self, zero: Label, bit: bool) -> Label {
        if bit {
            self.one_label(zero)
        } else {
            zero
        }
    }
}

impl fmt::Debug for Delta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Delta({:?})", self.0)
    }
}
