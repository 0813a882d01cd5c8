//! Circuit input and output argument lists.

use std::fmt;
use std::ops::Deref;

use bitvec::prelude::*;
use num_bigint::{BigInt, BigUint, Sign};
use num_traits::{Num, Signed, Zero};

use crate::circuit::CircuitError;
use crate::types::Type;

/// One named circuit input or output argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IoArg {
    pub name: String,
    pub typ: Type,
}

impl IoArg {
    pub fn new(name: impl Into<String>, typ: Type) -> IoArg {
        IoArg {
            name: name.into(),
            typ,
        }
    }
}

impl fmt::Display for IoArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() {
            write!(f, "{}", self.typ)
        } else {
            write!(f, "{}:{}", self.name, self.typ)
        }
    }
}

/// Ordered sequence of circuit arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IO(pub Vec<IoArg>);

impl IO {
    pub fn new() -> IO {
        IO::default()
    }

    /// Total size of the arguments in bits.
    pub fn size(&self) -> u32 {
        self.0.iter().map(|a| a.typ.bits()).sum()
    }

    /// Per-argument widths in bits.
    pub fn sizes(&self) -> Vec<u32> {
        self.0.iter().map(|a| a.typ.bits()).collect()
    }

    /// Split a flat bit image into per-argument values. Signed argument
    /// types decode as two's complement.
    pub fn split(&self, bits: &BitSlice) -> Vec<BigInt> {
        let mut result = Vec::with_capacity(self.0.len());
        let mut at = 0usize;
        for arg in &self.0 {
            let width = arg.typ.bits() as usize;
            let mut value = BigUint::zero();
            for (i, bit) in bits[at..at + width].iter().enumerate() {
                if *bit {
                    value.set_bit(i as u64, true);
                }
            }
            at += width;
            result.push(decode_value(value, &arg.typ));
        }
        result
    }

    /// Pack per-argument values into a flat bit image, LSB first per
    /// argument. Negative values wrap to two's complement at the
    /// argument width.
    pub fn join(&self, values: &[BigInt]) -> Result<BitVec, CircuitError> {
        if values.len() != self.0.len() {
            return Err(CircuitError::InvalidInput(format!(
                "expected {} arguments, got {}",
                self.0.len(),
                values.len()
            )));
        }
        let mut bits = BitVec::repeat(false, self.size() as usize);
        let mut at = 0usize;
        for (arg, value) in self.0.iter().zip(values) {
            let width = arg.typ.bits() as usize;
            let image = encode_value(value, width);
            for i in 0..width {
                bits.set(at + i, image.bit(i as u64));
            }
            at += width;
        }
        Ok(bits)
    }

    /// Parse command-line input strings into argument values.
    pub fn parse(&self, inputs: &[String]) -> Result<Vec<BigInt>, CircuitError> {
        if inputs.len() != self.0.len() {
            return Err(CircuitError::InvalidInput(format!(
                "expected {} input values, got {}",
                self.0.len(),
                inputs.len()
            )));
        }
        inputs.iter().map(|s| parse_value(s)).collect()
    }
}

impl Deref for IO {
    type Target = [IoArg];

    fn deref(&self) -> &[IoArg] {
        &self.0
    }
}

impl fmt::Display for IO {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, arg) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{arg}")?;
        }
        Ok(())
    }
}

/// Parse one input value: decimal, `0x` hex, `0b` binary, or a bool
/// literal.
pub fn parse_value(s: &str) -> Result<BigInt, CircuitError> {
    let parsed = match s {
        "true" => Ok(BigInt::from(1)),
        "false" => Ok(BigInt::from(0)),
        _ => {
            let (digits, radix) = if let Some(hex) = s.strip_prefix("0x") {
                (hex, 16)
            } else if let Some(bin) = s.strip_prefix("0b") {
                (bin, 2)
            } else {
                (s, 10)
            };
            BigInt::from_str_radix(digits, radix)
                .map_err(|_| CircuitError::InvalidInput(format!("malformed input value '{s}'")))
        }
    }?;
    Ok(parsed)
}

/// Bit lengths of the argument input values, as exchanged during
/// session establishment.
pub fn input_sizes(inputs: &[String]) -> Result<Vec<u64>, CircuitError> {
    let values = inputs
        .iter()
        .map(|s| parse_value(s))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(value_sizes(&values))
}

/// Bit lengths of already-parsed input values.
pub fn value_sizes(values: &[BigInt]) -> Vec<u64> {
    values
        .iter()
        .map(|value| {
            // Negative inputs need the sign bit on top of the
            // magnitude.
            let bits = value.magnitude().bits() + u64::from(value.is_negative());
            bits.max(1)
        })
        .collect()
}

/// LSB-first bit image of a value at the given width; negative values
/// wrap to two's complement.
pub fn value_bits(value: &BigInt, width: u32) -> BitVec {
    let image = encode_value(value, width as usize);
    let mut bits = BitVec::repeat(false, width as usize);
    for i in 0..width as u64 {
        bits.set(i as usize, image.bit(i));
    }
    bits
}

/// Decode an LSB-first bit image as an unsigned value.
pub fn bits_value(bits: &BitSlice) -> BigUint {
    let mut value = BigUint::zero();
    for (i, bit) in bits.iter().enumerate() {
        if *bit {
            value.set_bit(i as u64, true);
        }
    }
    value
}

fn decode_value(raw: BigUint, typ: &Type) -> BigInt {
    let width = typ.bits() as usize;
    if typ.is_signed() && width > 0 && raw.bit(width as u64 - 1) {
        let modulus = BigUint::from(1u8) << width;
        BigInt::from_biguint(Sign::Minus, modulus - raw)
    } else {
        BigInt::from(raw)
    }
}

fn encode_value(value: &BigInt, width: usize) -> BigUint {
    if value.is_negative() {
        let modulus = BigInt::from(1u8) << width;
        (value + modulus).magnitude().clone()
    } else {
        value.magnitude().clone()
    }
}
