use bigdecimal::num_bigint::{BigInt, BigUint};
use ion11::encoding::{FixedInt, FixedUInt, FlexInt, FlexUInt, WriteBuffer};
use proptest::prelude::*;

#[test]
fn flex_uint_known_vectors() {
    assert_eq!(FlexUInt::encode(0), vec![0x01]);
    assert_eq!(FlexUInt::encode(127), vec![0xFF]);
    assert_eq!(FlexUInt::encode(128), vec![0x02, 0x02]);
    assert_eq!(FlexUInt::encode(729), vec![0x66, 0x0B]);
}

#[test]
fn flex_int_known_vectors() {
    assert_eq!(FlexInt::encode(0), vec![0x01]);
    assert_eq!(FlexInt::encode(-1), vec![0xFF]);
    assert_eq!(FlexInt::encode(63), vec![0x7F]);
    assert_eq!(FlexInt::encode(64), vec![0x02, 0x01]);
    assert_eq!(FlexInt::encode(-64), vec![0x81]);
}

#[test]
fn truncated_input_is_an_error() {
    assert!(FlexUInt::read(&[0x02], 0).is_err());
    assert!(FixedInt::read(&[0x01], 0, 2).is_err());
}

#[test]
fn big_values_extend_past_64_bits() {
    let value = BigUint::from(u64::MAX) * 4u32;
    let mut buffer = WriteBuffer::new();
    let length = buffer.write_flex_uint_big(&value);
    assert_eq!(length, FlexUInt::length_of_big(&value));
    let (read, consumed) = FlexUInt::read_big(&buffer.to_vec(), 0).unwrap();
    assert_eq!(read, value);
    assert_eq!(consumed, length);
}

proptest! {
    #[test]
    fn flex_uint_round_trips(value in any::<u64>()) {
        let bytes = FlexUInt::encode(value);
        prop_assert_eq!(bytes.len(), FlexUInt::length_of(value));
        prop_assert_eq!(FlexUInt::read(&bytes, 0).unwrap(), (value, bytes.len()));
    }

    #[test]
    fn flex_int_round_trips(value in any::<i64>()) {
        let bytes = FlexInt::encode(value);
        prop_assert_eq!(bytes.len(), FlexInt::length_of(value));
        prop_assert_eq!(FlexInt::read(&bytes, 0).unwrap(), (value, bytes.len()));
    }

    #[test]
    fn fixed_int_round_trips(value in any::<i64>()) {
        let length = FixedInt::length_of(value);
        let mut bytes = vec![0u8; length];
        FixedInt::write(&mut bytes, 0, value, length);
        prop_assert_eq!(FixedInt::read(&bytes, 0, length).unwrap(), value);
    }

    #[test]
    fn fixed_uint_round_trips(value in any::<u64>()) {
        let length = FixedUInt::length_of(value);
        let mut bytes = vec![0u8; length];
        FixedUInt::write(&mut bytes, 0, value, length);
        prop_assert_eq!(FixedUInt::read(&bytes, 0, length).unwrap(), value);
    }

    #[test]
    fn big_flex_int_agrees_with_small(value in any::<i64>()) {
        let mut buffer = WriteBuffer::new();
        buffer.write_flex_int_big(&BigInt::from(value));
        prop_assert_eq!(buffer.to_vec(), FlexInt::encode(value));
    }
}
