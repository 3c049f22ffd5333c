//! Fixed-width two's-complement integers stored as explicit bit vectors,
//! most significant bit first. Every operation is built from per-bit gates:
//! addition is a ripple-carry adder, negation is invert-plus-one,
//! multiplication is shift-and-add and division is restoring binary long
//! division. The board uses these exclusively, which keeps the simulation
//! bit-exact; overflow wraps modulo the width.

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};

use crate::constants::BYTE_WIDTH;

#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Num8 {
    bits: [bool; BYTE_WIDTH],
}

impl Num8 {
    pub const ZERO: Num8 = Num8::from_u8(0);
    pub const MAX: Num8 = Num8::from_u8(0xFF);

    pub const fn from_u8(value: u8) -> Num8 {
        let mut bits = [false; BYTE_WIDTH];
        let mut i = 0;
        while i < BYTE_WIDTH {
            bits[i] = (value >> (BYTE_WIDTH - 1 - i)) & 1 == 1;
            i += 1;
        }
        Num8 { bits }
    }

    pub fn to_u8(self) -> u8 {
        let mut result = 0u8;
        for bit in &self.bits {
            result <<= 1;
            if *bit {
                result |= 1;
            }
        }
        result
    }

    pub fn bit(self, index: usize) -> bool {
        self.bits[index]
    }

    pub fn set_bit(&mut self, index: usize, value: bool) {
        self.bits[index] = value;
    }

    /// Ripple-carry addition of one byte, returning the sum byte and the
    /// outgoing carry.
    pub fn add_with_carry(self, other: Num8, mut carry: bool) -> (Num8, bool) {
        let mut result = Num8::ZERO;
        for i in (0..BYTE_WIDTH).rev() {
            let a = self.bits[i];
            let b = other.bits[i];
            result.bits[i] = (a && !b && !carry)
                || (!a && b && !carry)
                || (!a && !b && carry)
                || (a && b && carry);
            carry = (a && b) || (a && carry) || (b && carry);
        }
        (result, carry)
    }

    pub fn invert(self) -> Num8 {
        let mut result = Num8::ZERO;
        for i in 0..BYTE_WIDTH {
            result.bits[i] = !self.bits[i];
        }
        result
    }

    /// Bitwise lexicographic comparison, most significant bit first.
    pub fn compare_bits(self, other: Num8) -> Ordering {
        for i in 0..BYTE_WIDTH {
            if self.bits[i] != other.bits[i] {
                return if other.bits[i] {
                    Ordering::Less
                } else {
                    Ordering::Greater
                };
            }
        }
        Ordering::Equal
    }
}

impl fmt::Debug for Num8 {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Num8({})", self.to_u8())
    }
}

const NUM32_BYTES: usize = 4;
const NUM32_BITS: usize = NUM32_BYTES * BYTE_WIDTH;

#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Num32 {
    bytes: [Num8; NUM32_BYTES],
}

impl Num32 {
    pub const ZERO: Num32 = Num32::from_u32(0);
    pub const ONE: Num32 = Num32::from_u32(1);
    pub const TWO: Num32 = Num32::from_u32(2);
    pub const THREE: Num32 = Num32::from_u32(3);
    pub const FOUR: Num32 = Num32::from_u32(4);
    pub const FIVE: Num32 = Num32::from_u32(5);

    pub const fn from_u32(value: u32) -> Num32 {
        Num32 {
            bytes: [
                Num8::from_u8((value >> 24) as u8),
                Num8::from_u8((value >> 16) as u8),
                Num8::from_u8((value >> 8) as u8),
                Num8::from_u8(value as u8),
            ],
        }
    }

    pub const fn from_i32(value: i32) -> Num32 {
        Num32::from_u32(value as u32)
    }

    pub fn from_bytes(bytes: [Num8; NUM32_BYTES]) -> Num32 {
        Num32 { bytes }
    }

    pub fn to_u32(self) -> u32 {
        let mut result = 0u32;
        for byte in &self.bytes {
            result = (result << BYTE_WIDTH) | u32::from(byte.to_u8());
        }
        result
    }

    pub fn to_i32(self) -> i32 {
        self.to_u32() as i32
    }

    pub fn byte(self, index: usize) -> Num8 {
        self.bytes[index]
    }

    /// Bit access with global index 0 = most significant (sign) bit.
    pub fn bit(self, index: usize) -> bool {
        self.bytes[index / BYTE_WIDTH].bit(index % BYTE_WIDTH)
    }

    pub fn with_bit(mut self, index: usize, value: bool) -> Num32 {
        self.bytes[index / BYTE_WIDTH].set_bit(index % BYTE_WIDTH, value);
        self
    }

    pub fn is_zero(self) -> bool {
        self == Num32::ZERO
    }

    pub fn is_negative(self) -> bool {
        self.bit(0)
    }

    /// Logical left shift; bits shifted past the sign position are lost.
    pub fn shifted_left(self, count: usize) -> Num32 {
        let mut result = Num32::ZERO;
        for i in 0..NUM32_BITS.saturating_sub(count) {
            result = result.with_bit(i, self.bit(i + count));
        }
        result
    }

    /// Signed comparison: the sign bit dominates, magnitudes compare
    /// lexicographically.
    pub fn is_less(self, other: Num32) -> bool {
        if self == other {
            return false;
        }
        if self.bit(0) != other.bit(0) {
            return self.bit(0);
        }
        if self.bit(0) {
            return (-other).is_less(-self);
        }
        for i in 0..NUM32_BYTES {
            match self.bytes[i].compare_bits(other.bytes[i]) {
                Ordering::Less => return true,
                Ordering::Greater => return false,
                Ordering::Equal => {}
            }
        }
        false
    }

    /// Restoring binary long division. Returns `None` when the divisor is
    /// zero. The quotient is truncated towards zero.
    pub fn checked_div(self, other: Num32) -> Option<Num32> {
        let negative = self.bit(0) ^ other.bit(0);
        let mut dividend = if self.bit(0) { -self } else { self };
        let divisor = if other.bit(0) { -other } else { other };

        let mut highest_bit = None;
        for i in 0..NUM32_BITS {
            if divisor.bit(i) {
                highest_bit = Some(i);
                break;
            }
        }
        let highest_bit = highest_bit?;

        let mut result = Num32::ZERO;
        for shift in (0..highest_bit).rev() {
            result = result.shifted_left(1);
            let shifted = divisor.shifted_left(shift);
            if !dividend.is_less(shifted) {
                dividend = dividend - shifted;
                result = result + Num32::ONE;
            }
        }
        Some(if negative { -result } else { result })
    }
}

impl Add for Num32 {
    type Output = Num32;

    fn add(self, other: Num32) -> Num32 {
        let mut result = Num32::ZERO;
        let mut carry = false;
        for i in (0..NUM32_BYTES).rev() {
            let (byte, next) = self.bytes[i].add_with_carry(other.bytes[i], carry);
            result.bytes[i] = byte;
            carry = next;
        }
        result
    }
}

impl Neg for Num32 {
    type Output = Num32;

    fn neg(self) -> Num32 {
        let mut result = Num32::ZERO;
        for i in 0..NUM32_BYTES {
            result.bytes[i] = self.bytes[i].invert();
        }
        result + Num32::ONE
    }
}

impl Sub for Num32 {
    type Output = Num32;

    fn sub(self, other: Num32) -> Num32 {
        self + (-other)
    }
}

impl Mul for Num32 {
    type Output = Num32;

    fn mul(self, other: Num32) -> Num32 {
        let mut result = Num32::ZERO;
        for i in 0..NUM32_BITS {
            result = result.shifted_left(1);
            if other.bit(i) {
                result = result + self;
            }
        }
        result
    }
}

impl fmt::Debug for Num32 {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Num32({})", self.to_i32())
    }
}

const NUM64_BYTES: usize = 8;

/// Instruction-register width container. The board only ever assembles and
/// inspects its bytes, so no arithmetic is defined.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Num64 {
    bytes: [Num8; NUM64_BYTES],
}

impl Num64 {
    pub const ZERO: Num64 = Num64 {
        bytes: [Num8::ZERO; NUM64_BYTES],
    };

    pub fn from_bytes(bytes: [Num8; NUM64_BYTES]) -> Num64 {
        Num64 { bytes }
    }

    pub fn byte(self, index: usize) -> Num8 {
        self.bytes[index]
    }
}
