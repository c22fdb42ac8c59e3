mod common;

use common::{raw_writer, table_with, written};
use ion11::encoding::{Presence, PresenceBitmap};
use ion11::macros::{Cardinality, MacroRef, MacroTable, Parameter, SystemMacro};
use ion11::model::{Decimal, Element, IonType, SymbolToken};
use ion11::ErrorType;
use serde_json::json;

fn bools(count: usize) -> Vec<u8> {
    vec![0x6E; count]
}

#[test]
fn empty_list_is_a_single_opcode() {
    assert_eq!(written(1, |w| {
        w.step_in_list(false)?;
        w.step_out()
    }), vec![0xB0]);
}

#[test]
fn short_list_length_moves_into_the_opcode() {
    let bytes = written(1, |w| {
        w.step_in_list(false)?;
        w.write_bool(true)?;
        w.write_bool(true)?;
        w.step_out()
    });
    assert_eq!(bytes, vec![0xB2, 0x6E, 0x6E]);
}

#[test]
fn long_list_uses_a_patch_point() {
    let mut writer = raw_writer(1);
    writer.step_in_list(false).unwrap();
    for _ in 0..128 {
        writer.write_bool(true).unwrap();
    }
    writer.step_out().unwrap();
    assert_eq!(writer.patch_point_count(), 1);
    let bytes = writer.close().unwrap();

    let mut expected = vec![0xFB, 0x02, 0x02];
    expected.extend(bools(128));
    assert_eq!(bytes, expected);
}

#[test]
fn exact_preallocation_is_backfilled_in_place() {
    let mut writer = raw_writer(2);
    writer.step_in_list(false).unwrap();
    for _ in 0..128 {
        writer.write_bool(true).unwrap();
    }
    writer.step_out().unwrap();
    assert_eq!(writer.patch_point_count(), 0);
    let bytes = writer.close().unwrap();
    assert_eq!(&bytes[..3], &[0xFB, 0x02, 0x02]);
    assert_eq!(bytes.len(), 3 + 128);
}

#[test]
fn nested_patch_points_account_for_grown_prefixes() {
    let mut writer = raw_writer(1);
    writer.step_in_list(false).unwrap();
    writer.step_in_list(false).unwrap();
    for _ in 0..128 {
        writer.write_bool(true).unwrap();
    }
    writer.step_out().unwrap();
    writer.step_out().unwrap();
    assert_eq!(writer.patch_point_count(), 2);
    let bytes = writer.close().unwrap();

    // The inner list is 1 + 2 + 128 = 131 bytes.
    let mut expected = vec![0xFB, 0x0E, 0x02, 0xFB, 0x02, 0x02];
    expected.extend(bools(128));
    assert_eq!(bytes, expected);
}

#[test]
fn zero_preallocation_patches_every_long_container() {
    let bytes = written(0, |w| {
        w.step_in_sexp(false)?;
        w.write_string(&"x".repeat(20))?;
        w.step_out()
    });
    assert_eq!(&bytes[..4], &[0xFC, 0x2D, 0xF9, 0x29]);
    assert_eq!(bytes.len(), 2 + 2 + 20);
}

#[test]
fn nested_empty_prefixed_lists_compact() {
    let bytes = written(1, |w| {
        w.step_in_list(false)?;
        w.step_in_list(false)?;
        w.step_in_list(false)?;
        w.step_out()?;
        w.step_out()?;
        w.step_out()
    });
    assert_eq!(bytes, vec![0xB2, 0xB1, 0xB0]);
}

#[test]
fn nested_empty_delimited_lists() {
    let bytes = written(1, |w| {
        w.step_in_list(true)?;
        w.step_in_list(true)?;
        w.step_in_list(true)?;
        w.step_out()?;
        w.step_out()?;
        w.step_out()
    });
    assert_eq!(bytes, vec![0xF1, 0xF1, 0xB0, 0xF0, 0xF0]);
}

#[test]
fn scalars_and_annotations_in_a_struct() {
    let bytes = written(1, |w| {
        w.write_ivm()?;
        w.step_in_struct(false)?;
        w.write_field_name_sid(10)?;
        w.add_annotation_text("t");
        w.write_decimal(&Decimal::new(15i64, -1))?;
        w.step_out()
    });
    assert_eq!(
        bytes,
        vec![0xE0, 0x01, 0x01, 0xEA, 0xD7, 0x15, 0xE7, 0xFF, b't', 0x72, 0xFF, 0x0F]
    );
}

#[test]
fn typed_nulls_and_lobs() {
    let bytes = written(1, |w| {
        w.write_null(IonType::Null)?;
        w.write_null(IonType::String)?;
        w.write_blob(&[1, 2])?;
        w.write_clob(b"")
    });
    assert_eq!(bytes, vec![0xEA, 0xEB, 0x05, 0xFE, 0x05, 0x01, 0x02, 0xFF, 0x01]);
}

#[test]
fn write_element_matches_manual_calls() {
    let element = Element::structure([("a", Element::list([Element::int(1), Element::symbol("b")]))]);
    let from_element = written(1, |w| w.write_element(&element));
    let manual = written(1, |w| {
        w.step_in_struct(false)?;
        w.write_field_name(&SymbolToken::text("a"))?;
        w.step_in_list(false)?;
        w.write_i64(1)?;
        w.write_symbol_text("b")?;
        w.step_out()?;
        w.step_out()
    });
    assert_eq!(from_element, manual);
}

#[test]
fn presence_bitmap_packs_two_bits_per_parameter() {
    let signature = vec![Parameter::tagged("a", Cardinality::Any); 4];
    let mut bitmap = PresenceBitmap::new(&signature).unwrap();
    bitmap.set(0, Presence::Group);
    bitmap.set(2, Presence::Group);
    let mut bytes = Vec::new();
    bitmap.write_to(&mut bytes);
    assert_eq!(bytes, vec![0x22]);
}

#[test]
fn eexp_with_a_presence_bitmap() {
    let table = table_with(&[json!(["macro", "m", ["a", "*", "b", "*", "c", "*"], ["values", "a"]])]).unwrap();
    let invoked = table.get(&MacroRef::Address(0)).unwrap();
    let bytes = written(1, |w| {
        w.step_in_eexp(0, false, &invoked)?;
        w.write_i64(1)?;
        w.write_absent_argument()?;
        w.step_in_expression_group(false)?;
        w.write_i64(2)?;
        w.write_i64(3)?;
        w.step_out()?;
        w.step_out()
    });
    assert_eq!(bytes, vec![0x00, 0x21, 0x61, 0x01, 0x09, 0x61, 0x02, 0x61, 0x03]);
}

#[test]
fn empty_group_with_a_bitmap_is_void() {
    let table = table_with(&[json!(["macro", "m", ["a*", "b*", "c*"], ["values", "a"]])]).unwrap();
    let invoked = table.get(&MacroRef::Address(0)).unwrap();
    let bytes = written(1, |w| {
        w.step_in_eexp(0, false, &invoked)?;
        w.step_in_expression_group(true)?;
        w.step_out()?;
        w.step_out()
    });
    assert_eq!(bytes, vec![0x00, 0x00]);
}

#[test]
fn tagless_arguments_are_range_checked() {
    let table = table_with(&[json!(["macro", "m", ["uint8::x"], "x"])]).unwrap();
    let invoked = table.get(&MacroRef::Address(0)).unwrap();

    let mut writer = raw_writer(1);
    writer.step_in_eexp(0, false, &invoked).unwrap();
    let err = writer.write_tagless_int(300i64).unwrap_err();
    assert_eq!(err.error_type(), ErrorType::Encoding);
    assert!(writer.write_i64(7).is_err(), "tagged value for a tagless parameter");
    writer.write_tagless_int(7i64).unwrap();
    writer.step_out().unwrap();
    assert_eq!(writer.close().unwrap(), vec![0x00, 0x07]);
}

#[test]
fn missing_required_argument_is_reported() {
    let mut writer = raw_writer(1);
    writer.step_in_system_eexp(SystemMacro::Repeat).unwrap();
    let err = writer.step_out().unwrap_err();
    assert_eq!(err.error_type(), ErrorType::Encoding);
    assert_eq!(writer.depth(), 1);
}

#[test]
fn eexp_cannot_be_annotated() {
    let mut writer = raw_writer(1);
    writer.add_annotation_sid(4);
    assert!(writer.step_in_system_eexp(SystemMacro::None).is_err());
}

#[test]
fn presence_bitmap_skips_single_value_slots() {
    let signature = vec![
        Parameter::tagged("a", Cardinality::Any),
        Parameter::tagged("b", Cardinality::AtMostOne),
        Parameter::tagged("c", Cardinality::One),
        Parameter::tagged("d", Cardinality::Any),
    ];
    let mut bitmap = PresenceBitmap::new(&signature).unwrap();
    bitmap.set(0, Presence::Group);
    bitmap.set(1, Presence::Void);
    bitmap.set(3, Presence::Group);
    bitmap.validate().unwrap();
    let mut bytes = Vec::new();
    bitmap.write_to(&mut bytes);
    assert_eq!(bytes, vec![0x22]);

    let mut decoded = PresenceBitmap::new(&signature).unwrap();
    assert_eq!(decoded.read_from(&bytes, 0).unwrap(), 1);
    let slots: Vec<Presence> = (0..4).map(|i| decoded.get(i)).collect();
    assert_eq!(slots, vec![Presence::Group, Presence::Void, Presence::Expression, Presence::Group]);
}

#[test]
fn presence_bitmap_rejects_slots_the_cardinality_forbids() {
    let signature = vec![
        Parameter::tagged("a", Cardinality::AtLeastOne),
        Parameter::tagged("b", Cardinality::AtMostOne),
        Parameter::tagged("c", Cardinality::Any),
    ];
    let mut bitmap = PresenceBitmap::new(&signature).unwrap();
    bitmap.set(0, Presence::Expression);
    bitmap.set(1, Presence::Group);
    let err = bitmap.validate().unwrap_err();
    assert_eq!(err.error_type(), ErrorType::Encoding);
    bitmap.set(1, Presence::Void);
    bitmap.validate().unwrap();
}

#[test]
fn failed_group_close_leaves_the_group_open() {
    let table = table_with(&[json!(["macro", "m", ["a+"], ["values", "a"]])]).unwrap();
    let invoked = table.get(&MacroRef::Address(0)).unwrap();
    let mut writer = raw_writer(1);
    writer.step_in_eexp(0, false, &invoked).unwrap();
    writer.step_in_expression_group(false).unwrap();
    let err = writer.step_out().unwrap_err();
    assert_eq!(err.error_type(), ErrorType::Encoding);
    assert_eq!(writer.depth(), 2);

    writer.write_i64(1).unwrap();
    writer.step_out().unwrap();
    assert_eq!(writer.depth(), 1);
    writer.step_out().unwrap();
    assert_eq!(writer.depth(), 0);
}

#[test]
fn field_names_switch_the_struct_to_flex_sym_mode() {
    let bytes = written(1, |w| {
        w.step_in_struct(false)?;
        w.write_field_name_sid(4)?;
        w.write_bool(true)?;
        w.write_field_name_text("a")?;
        w.write_bool(true)?;
        w.step_out()
    });
    assert_eq!(bytes, vec![0xD6, 0x09, 0x6E, 0x01, 0xFF, 0x61, 0x6E]);

    let mut writer = raw_writer(1);
    let err = writer.write_field_name_text("a").unwrap_err();
    assert_eq!(err.error_type(), ErrorType::Encoding);
}
