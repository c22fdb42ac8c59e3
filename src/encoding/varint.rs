//! Variable-length and fixed-width integer primitives.
//!
//! Every encoding exposes the same contract: `length_of(value)` computes the encoded size, and
//! `write(buffer, offset, value, length)` stores the value in exactly `length` bytes. The caller
//! must pass the length computed by `length_of` (or a larger one for the flex encodings, which
//! tolerate padding); the writers do not re-check it.
//!
//! ## Layout
//!
//! - **FlexUInt**: the number of trailing zero bits in the encoding, plus one, is the total length
//!   in bytes. The value occupies the remaining `7 * length` bits, least significant first. Lengths
//!   of nine and above start with one or more all-zero bytes.
//! - **FlexInt**: the same length scheme, with a two's complement payload.
//! - **FixedUInt** / **FixedInt**: plain little-endian bytes, with a sign bit for `FixedInt`.

use bigdecimal::num_bigint::{BigInt, BigUint, Sign};
use num_traits::{One, Signed, Zero};

use crate::{err_msg, IonResult};

/// Number of bits needed to hold `value` as an unsigned magnitude (at least one).
#[inline]
fn unsigned_bits(value: u64) -> usize {
    (64 - value.leading_zeros() as usize).max(1)
}

/// Number of bits needed to hold `value` in two's complement, sign bit included.
#[inline]
fn signed_bits(value: i64) -> usize {
    let magnitude = if value < 0 { !value } else { value };
    64 - magnitude.leading_zeros() as usize + 1
}

fn big_signed_bits(value: &BigInt) -> usize {
    if value.is_negative() {
        // !v == -v - 1 for two's complement
        let complement: BigInt = -value - BigInt::one();
        complement.bits() as usize + 1
    } else {
        value.bits() as usize + 1
    }
}

/// Counts the encoded length of a flex integer from its leading bytes.
fn flex_length(bytes: &[u8], offset: usize) -> IonResult<usize> {
    let mut length = 0;
    for byte in bytes.iter().skip(offset) {
        if *byte != 0 {
            return Ok(length + byte.trailing_zeros() as usize + 1);
        }
        length += 8;
    }
    Err(err_msg!(Encoding, "incomplete flex integer at offset {}", offset))
}

fn require(bytes: &[u8], offset: usize, length: usize, what: &str) -> IonResult<()> {
    if offset + length > bytes.len() {
        return Err(err_msg!(
            Encoding,
            "incomplete {}: needed {} bytes at offset {}, found {}",
            what,
            length,
            offset,
            bytes.len().saturating_sub(offset)
        ));
    }
    Ok(())
}

fn copy_padded(buffer: &mut [u8], offset: usize, bytes: &[u8], length: usize, pad: u8) {
    let target = &mut buffer[offset..offset + length];
    let used = bytes.len().min(length);
    target[..used].copy_from_slice(&bytes[..used]);
    target[used..].fill(pad);
}

// ============================================================================
// FLEXUINT
// ============================================================================

pub struct FlexUInt;

impl FlexUInt {
    #[inline]
    pub fn length_of(value: u64) -> usize {
        unsigned_bits(value).div_ceil(7)
    }

    pub fn length_of_big(value: &BigUint) -> usize {
        (value.bits() as usize).max(1).div_ceil(7)
    }

    /// Writes `value` into `buffer[offset..offset + length]`.
    #[inline]
    pub fn write(buffer: &mut [u8], offset: usize, value: u64, length: usize) {
        debug_assert!((1..=10).contains(&length));
        let encoded = ((value as u128) << length) | (1u128 << (length - 1));
        buffer[offset..offset + length].copy_from_slice(&encoded.to_le_bytes()[..length]);
    }

    pub fn write_big(buffer: &mut [u8], offset: usize, value: &BigUint, length: usize) {
        let encoded = (value << length) | (BigUint::one() << (length - 1));
        copy_padded(buffer, offset, &encoded.to_bytes_le(), length, 0);
    }

    /// Encodes `value` into a fresh vector.
    pub fn encode(value: u64) -> Vec<u8> {
        let length = Self::length_of(value);
        let mut bytes = vec![0u8; length];
        Self::write(&mut bytes, 0, value, length);
        bytes
    }

    /// Reads a FlexUInt, returning `(value, bytes_consumed)`.
    pub fn read(bytes: &[u8], offset: usize) -> IonResult<(u64, usize)> {
        let length = flex_length(bytes, offset)?;
        require(bytes, offset, length, "FlexUInt")?;
        if length > 10 {
            return Err(err_msg!(Encoding, "FlexUInt of {} bytes does not fit in 64 bits", length));
        }
        let mut raw = [0u8; 16];
        raw[..length].copy_from_slice(&bytes[offset..offset + length]);
        let value = u128::from_le_bytes(raw) >> length;
        let value = u64::try_from(value)
            .map_err(|_| err_msg!(Encoding, "FlexUInt value does not fit in 64 bits"))?;
        Ok((value, length))
    }

    pub fn read_big(bytes: &[u8], offset: usize) -> IonResult<(BigUint, usize)> {
        let length = flex_length(bytes, offset)?;
        require(bytes, offset, length, "FlexUInt")?;
        let raw = BigUint::from_bytes_le(&bytes[offset..offset + length]);
        Ok((raw >> length, length))
    }
}

// ============================================================================
// FLEXINT
// ============================================================================

pub struct FlexInt;

impl FlexInt {
    #[inline]
    pub fn length_of(value: i64) -> usize {
        signed_bits(value).div_ceil(7)
    }

    pub fn length_of_big(value: &BigInt) -> usize {
        big_signed_bits(value).div_ceil(7)
    }

    #[inline]
    pub fn write(buffer: &mut [u8], offset: usize, value: i64, length: usize) {
        debug_assert!((1..=10).contains(&length));
        let encoded = ((value as i128) << length) | (1i128 << (length - 1));
        buffer[offset..offset + length].copy_from_slice(&encoded.to_le_bytes()[..length]);
    }

    pub fn write_big(buffer: &mut [u8], offset: usize, value: &BigInt, length: usize) {
        let encoded: BigInt = (value << length) + (BigInt::one() << (length - 1));
        let pad = if encoded.is_negative() { 0xFF } else { 0x00 };
        copy_padded(buffer, offset, &encoded.to_signed_bytes_le(), length, pad);
    }

    pub fn encode(value: i64) -> Vec<u8> {
        let length = Self::length_of(value);
        let mut bytes = vec![0u8; length];
        Self::write(&mut bytes, 0, value, length);
        bytes
    }

    pub fn read(bytes: &[u8], offset: usize) -> IonResult<(i64, usize)> {
        let length = flex_length(bytes, offset)?;
        require(bytes, offset, length, "FlexInt")?;
        if length > 10 {
            return Err(err_msg!(Encoding, "FlexInt of {} bytes does not fit in 64 bits", length));
        }
        let mut raw = [0u8; 16];
        raw[..length].copy_from_slice(&bytes[offset..offset + length]);
        let shift = 128 - 8 * length as u32;
        // Sign-extend from the encoded width, then drop the length bits.
        let extended = ((u128::from_le_bytes(raw) << shift) as i128) >> shift;
        let value = extended >> length;
        let value = i64::try_from(value)
            .map_err(|_| err_msg!(Encoding, "FlexInt value does not fit in 64 bits"))?;
        Ok((value, length))
    }

    pub fn read_big(bytes: &[u8], offset: usize) -> IonResult<(BigInt, usize)> {
        let length = flex_length(bytes, offset)?;
        require(bytes, offset, length, "FlexInt")?;
        let raw = BigInt::from_signed_bytes_le(&bytes[offset..offset + length]);
        // Arithmetic shift: floor division by 2^length.
        let value = floor_shift(raw, length);
        Ok((value, length))
    }
}

fn floor_shift(value: BigInt, bits: usize) -> BigInt {
    if value.is_negative() {
        let divisor = BigInt::one() << bits;
        let (quotient, remainder) = (&value / &divisor, &value % &divisor);
        if remainder.is_zero() {
            quotient
        } else {
            quotient - 1
        }
    } else {
        value >> bits
    }
}

// ============================================================================
// FIXEDUINT / FIXEDINT
// ============================================================================

pub struct FixedUInt;

impl FixedUInt {
    #[inline]
    pub fn length_of(value: u64) -> usize {
        unsigned_bits(value).div_ceil(8)
    }

    pub fn length_of_big(value: &BigUint) -> usize {
        (value.bits() as usize).max(1).div_ceil(8)
    }

    #[inline]
    pub fn write(buffer: &mut [u8], offset: usize, value: u64, length: usize) {
        debug_assert!(length <= 8);
        buffer[offset..offset + length].copy_from_slice(&value.to_le_bytes()[..length]);
    }

    pub fn write_big(buffer: &mut [u8], offset: usize, value: &BigUint, length: usize) {
        copy_padded(buffer, offset, &value.to_bytes_le(), length, 0);
    }

    pub fn read(bytes: &[u8], offset: usize, length: usize) -> IonResult<u64> {
        if length > 8 {
            return Err(err_msg!(Encoding, "FixedUInt of {} bytes does not fit in 64 bits", length));
        }
        require(bytes, offset, length, "FixedUInt")?;
        let mut raw = [0u8; 8];
        raw[..length].copy_from_slice(&bytes[offset..offset + length]);
        Ok(u64::from_le_bytes(raw))
    }
}

pub struct FixedInt;

impl FixedInt {
    #[inline]
    pub fn length_of(value: i64) -> usize {
        signed_bits(value).div_ceil(8)
    }

    pub fn length_of_big(value: &BigInt) -> usize {
        big_signed_bits(value).div_ceil(8)
    }

    #[inline]
    pub fn write(buffer: &mut [u8], offset: usize, value: i64, length: usize) {
        debug_assert!(length <= 8);
        buffer[offset..offset + length].copy_from_slice(&value.to_le_bytes()[..length]);
    }

    pub fn write_big(buffer: &mut [u8], offset: usize, value: &BigInt, length: usize) {
        let pad = if value.sign() == Sign::Minus { 0xFF } else { 0x00 };
        copy_padded(buffer, offset, &value.to_signed_bytes_le(), length, pad);
    }

    pub fn read(bytes: &[u8], offset: usize, length: usize) -> IonResult<i64> {
        if length == 0 {
            return Ok(0);
        }
        if length > 8 {
            return Err(err_msg!(Encoding, "FixedInt of {} bytes does not fit in 64 bits", length));
        }
        require(bytes, offset, length, "FixedInt")?;
        let mut raw = [0u8; 8];
        raw[..length].copy_from_slice(&bytes[offset..offset + length]);
        let shift = 64 - 8 * length as u32;
        Ok((i64::from_le_bytes(raw) << shift) >> shift)
    }

    pub fn read_big(bytes: &[u8], offset: usize, length: usize) -> IonResult<BigInt> {
        require(bytes, offset, length, "FixedInt")?;
        if length == 0 {
            return Ok(BigInt::zero());
        }
        Ok(BigInt::from_signed_bytes_le(&bytes[offset..offset + length]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn golden_vectors() {
        assert_eq!(FlexUInt::encode(0), vec![0x01]);
        assert_eq!(FlexUInt::encode(63), vec![0x7F]);
        assert_eq!(FlexUInt::encode(64), vec![0x02, 0x01]);
        assert_eq!(FlexUInt::encode(127), vec![0xFF]);
        assert_eq!(FlexUInt::encode(128), vec![0x02, 0x02]);
        assert_eq!(FlexInt::encode(-1), vec![0xFF]);
        assert_eq!(FlexInt::encode(0), vec![0x01]);
        assert_eq!(FlexInt::encode(63), vec![0x7F]);
        assert_eq!(FlexInt::encode(64), vec![0x02, 0x01]);
        assert_eq!(FlexInt::encode(-64), vec![0x81]);
    }

    #[test]
    fn zero_always_takes_one_byte() {
        assert_eq!(FlexUInt::length_of(0), 1);
        assert_eq!(FlexInt::length_of(0), 1);
        assert_eq!(FixedUInt::length_of(0), 1);
        assert_eq!(FixedInt::length_of(0), 1);
    }

    #[test]
    fn nine_and_ten_byte_forms_start_with_a_zero_byte() {
        let nine = FlexUInt::encode(1 << 56);
        assert_eq!(nine.len(), 9);
        assert_eq!(nine[0], 0x00);
        assert_eq!(nine[1] & 0x01, 0x01);
        let ten = FlexUInt::encode(u64::MAX);
        assert_eq!(ten.len(), 10);
        assert_eq!(ten[0], 0x00);
        assert_eq!(ten[1] & 0x03, 0x02);
        assert_eq!(FlexUInt::read(&ten, 0).unwrap(), (u64::MAX, 10));
        let min = FlexInt::encode(i64::MIN);
        assert_eq!(min.len(), 10);
        assert_eq!(FlexInt::read(&min, 0).unwrap(), (i64::MIN, 10));
    }

    #[test]
    fn big_and_small_paths_agree() {
        for value in [0i64, 1, -1, 63, 64, -65, 8191, -8192, i64::MAX, i64::MIN] {
            let big = BigInt::from(value);
            let length = FlexInt::length_of(value);
            assert_eq!(FlexInt::length_of_big(&big), length, "FlexInt length of {value}");
            let mut small_bytes = vec![0; length];
            let mut big_bytes = vec![0; length];
            FlexInt::write(&mut small_bytes, 0, value, length);
            FlexInt::write_big(&mut big_bytes, 0, &big, length);
            assert_eq!(small_bytes, big_bytes, "FlexInt bytes of {value}");
            assert_eq!(FlexInt::read_big(&big_bytes, 0).unwrap(), (big.clone(), length));

            let fixed_length = FixedInt::length_of(value);
            assert_eq!(FixedInt::length_of_big(&big), fixed_length, "FixedInt length of {value}");
            let mut fixed = vec![0; fixed_length];
            FixedInt::write_big(&mut fixed, 0, &big, fixed_length);
            assert_eq!(FixedInt::read(&fixed, 0, fixed_length).unwrap(), value);
        }
    }

    #[test]
    fn values_beyond_64_bits() {
        let value = BigUint::one() << 100u32;
        let length = FlexUInt::length_of_big(&value);
        assert_eq!(length, 15);
        let mut bytes = vec![0; length];
        FlexUInt::write_big(&mut bytes, 0, &value, length);
        assert_eq!(&bytes[..1], &[0x00]);
        assert_eq!(FlexUInt::read_big(&bytes, 0).unwrap(), (value, 15));
        assert!(FlexUInt::read(&bytes, 0).is_err());
    }

    #[test]
    fn truncated_input_is_an_error() {
        assert!(FlexUInt::read(&[0x02], 0).is_err());
        assert!(FlexUInt::read(&[], 0).is_err());
        assert!(FixedUInt::read(&[0x01], 0, 2).is_err());
    }

    #[test]
    fn fixed_widths() {
        assert_eq!(FixedUInt::length_of(255), 1);
        assert_eq!(FixedUInt::length_of(256), 2);
        assert_eq!(FixedInt::length_of(127), 1);
        assert_eq!(FixedInt::length_of(128), 2);
        assert_eq!(FixedInt::length_of(-128), 1);
        assert_eq!(FixedInt::length_of(-129), 2);
        let mut bytes = [0u8; 2];
        FixedInt::write(&mut bytes, 0, -129, 2);
        assert_eq!(bytes, [0x7F, 0xFF]);
        assert_eq!(FixedInt::read(&bytes, 0, 2).unwrap(), -129);
    }
}
