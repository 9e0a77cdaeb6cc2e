//! End-to-end tests for the typed value surface.
//!
//! Each test builds a map against a `MemoryPort`, then exercises the
//! public accessors: build -> finalize -> get/set -> verify device bytes.

use std::sync::Arc;

use pretty_assertions::assert_eq;

use genapi_rs::{
    BooleanDef, CommandDef, Endianness, EnumEntryDef, EnumerationDef, FloatDef, FloatSource,
    IntSource, IntegerDef, MemoryPort, NodeMapBuilder, Port, RegisterDef, Representation,
    StrSource, StringDef, Value,
};

// ============================================================================
// 1. Literal integer: write then read back
// ============================================================================

#[test]
fn test_literal_int_round_trip() {
    let mut b = NodeMapBuilder::new("Device");
    let gain = b
        .add_integer(IntegerDef::new("Gain", IntSource::Value(0)).with_range(0, 1023))
        .unwrap();
    let map = b.finalize().unwrap();

    map.set_int(gain, 42, true).unwrap();
    assert_eq!(map.int_value(gain).unwrap(), 42);
    assert_eq!(map.value(gain).unwrap(), Value::Int(42));
}

// ============================================================================
// 2. Register-backed integer: endianness and sign
// ============================================================================

#[test]
fn test_register_int_little_endian() {
    let port = Arc::new(MemoryPort::new(0x100));
    let mut b = NodeMapBuilder::new("Device");
    let width = b
        .add_integer(
            IntegerDef::new("Width", IntSource::register(&port, 0x10, 4, Endianness::Little))
                .with_range(0, 4096),
        )
        .unwrap();
    let map = b.finalize().unwrap();

    map.set_int(width, 640, true).unwrap();

    let mut bytes = [0u8; 4];
    port.read(&mut bytes, 0x10).unwrap();
    assert_eq!(bytes, [0x80, 0x02, 0x00, 0x00]);
    assert_eq!(map.int_value(width).unwrap(), 640);
}

#[test]
fn test_register_int_big_endian_signed() {
    let port = Arc::new(MemoryPort::new(0x100));
    // Device already holds -2 in a signed 16-bit big-endian register.
    port.write(&[0xFF, 0xFE], 0x20).unwrap();

    let mut b = NodeMapBuilder::new("Device");
    let offset = b
        .add_integer(IntegerDef::new(
            "OffsetX",
            IntSource::Register(
                genapi_rs::RegisterRef::new(&port, 0x20, 2, Endianness::Big).with_signed(true),
            ),
        ))
        .unwrap();
    let map = b.finalize().unwrap();

    assert_eq!(map.int_value(offset).unwrap(), -2);
}

// ============================================================================
// 3. Integer increment and imposed range
// ============================================================================

#[test]
fn test_int_min_max_inc() {
    let mut b = NodeMapBuilder::new("Device");
    let width = b
        .add_integer(
            IntegerDef::new("Width", IntSource::Value(64))
                .with_range(16, 4096)
                .with_inc(16),
        )
        .unwrap();
    let map = b.finalize().unwrap();

    assert_eq!(map.int_min(width).unwrap(), 16);
    assert_eq!(map.int_max(width).unwrap(), 4096);
    assert_eq!(map.int_inc(width).unwrap(), 16);

    map.set_int(width, 640, true).unwrap();
    assert_eq!(map.int_value(width).unwrap(), 640);
}

#[test]
fn test_imposed_range_clamps_natural_bounds() {
    let mut b = NodeMapBuilder::new("Device");
    let gain = b
        .add_integer(IntegerDef::new("Gain", IntSource::Value(50)).with_range(0, 1023))
        .unwrap();
    let map = b.finalize().unwrap();

    map.impose_int_range(gain, Some(10), Some(100)).unwrap();
    assert_eq!(map.int_min(gain).unwrap(), 10);
    assert_eq!(map.int_max(gain).unwrap(), 100);

    assert!(map.set_int(gain, 500, true).is_err());
    map.set_int(gain, 90, true).unwrap();
}

#[test]
fn test_value_list_constrains_and_lists() {
    let mut b = NodeMapBuilder::new("Device");
    let binning = b
        .add_integer(
            IntegerDef::new("Binning", IntSource::Value(1))
                .with_range(1, 8)
                .with_value_list(vec![1, 2, 4, 8, 16]),
        )
        .unwrap();
    let map = b.finalize().unwrap();

    // 16 is in the list but outside the range.
    assert_eq!(map.int_valid_values(binning).unwrap(), vec![1, 2, 4, 8]);
    assert!(map.set_int(binning, 3, true).is_err());
    map.set_int(binning, 4, true).unwrap();
}

// ============================================================================
// 4. Float register and text round trip
// ============================================================================

#[test]
fn test_float_register_round_trip() {
    let port = Arc::new(MemoryPort::new(0x100));
    let mut b = NodeMapBuilder::new("Device");
    let exposure = b
        .add_float(
            FloatDef::new(
                "ExposureTime",
                FloatSource::register(&port, 0x30, 8, Endianness::Little),
            )
            .with_range(0.0, 1e6),
        )
        .unwrap();
    let map = b.finalize().unwrap();

    map.set_float(exposure, 1234.5, true).unwrap();
    assert_eq!(map.float_value(exposure).unwrap(), 1234.5);
    assert_eq!(map.float_min(exposure).unwrap(), 0.0);
    assert_eq!(map.float_max(exposure).unwrap(), 1e6);
}

#[test]
fn test_float_text_round_trip_within_precision() {
    let mut b = NodeMapBuilder::new("Device");
    let gamma = b
        .add_float(
            FloatDef::new("Gamma", FloatSource::Value(1.0))
                .with_range(0.0, 4.0)
                .with_notation(genapi_rs::model::DisplayNotation::Fixed, Some(3)),
        )
        .unwrap();
    let map = b.finalize().unwrap();

    map.set_float(gamma, 1.2345, true).unwrap();
    let text = map.to_text(gamma).unwrap();
    map.from_text(gamma, &text, true).unwrap();
    let reparsed = map.float_value(gamma).unwrap();
    assert!((reparsed - 1.2345).abs() <= 0.001, "text {text} reparsed {reparsed}");
}

// ============================================================================
// 5. Boolean over a register bit byte
// ============================================================================

#[test]
fn test_boolean_round_trip() {
    let port = Arc::new(MemoryPort::new(0x100));
    let mut b = NodeMapBuilder::new("Device");
    let enabled = b
        .add_boolean(BooleanDef::new(
            "AcquisitionEnable",
            IntSource::register(&port, 0x40, 1, Endianness::Little),
        ))
        .unwrap();
    let map = b.finalize().unwrap();

    map.set_bool(enabled, true, true).unwrap();
    assert!(map.bool_value(enabled).unwrap());

    let mut byte = [0u8; 1];
    port.read(&mut byte, 0x40).unwrap();
    assert_eq!(byte[0], 1);

    map.set_bool(enabled, false, true).unwrap();
    assert!(!map.bool_value(enabled).unwrap());
}

// ============================================================================
// 6. Enumeration: symbolic and integer selection
// ============================================================================

#[test]
fn test_enum_symbolic_round_trip() {
    let port = Arc::new(MemoryPort::new(0x100));
    let mut b = NodeMapBuilder::new("Device");
    let mode = b
        .add_enumeration(
            EnumerationDef::new(
                "AcquisitionMode",
                IntSource::register(&port, 0x50, 4, Endianness::Little),
            )
            .with_entries(vec![
                EnumEntryDef::new("Continuous", 0),
                EnumEntryDef::new("SingleFrame", 1),
                EnumEntryDef::new("MultiFrame", 2),
            ]),
        )
        .unwrap();
    let map = b.finalize().unwrap();

    map.set_enum(mode, "MultiFrame", true).unwrap();
    assert_eq!(map.enum_value(mode).unwrap(), "MultiFrame");
    assert_eq!(map.enum_int_value(mode).unwrap(), 2);

    map.set_enum_int(mode, 1, true).unwrap();
    assert_eq!(map.enum_value(mode).unwrap(), "SingleFrame");

    assert_eq!(
        map.enum_symbolics(mode).unwrap(),
        vec!["Continuous", "SingleFrame", "MultiFrame"]
    );
    assert!(map.set_enum(mode, "Bogus", true).is_err());
}

// ============================================================================
// 7. String over a fixed-length register
// ============================================================================

#[test]
fn test_string_register_round_trip() {
    let port = Arc::new(MemoryPort::new(0x100));
    let mut b = NodeMapBuilder::new("Device");
    let id = b
        .add_string(StringDef::new("DeviceID", StrSource::register(&port, 0x60, 16)))
        .unwrap();
    let map = b.finalize().unwrap();

    map.set_str(id, "Camera01", true).unwrap();
    assert_eq!(map.str_value(id).unwrap(), "Camera01");

    // NUL padding after the payload.
    let mut bytes = [0u8; 16];
    port.read(&mut bytes, 0x60).unwrap();
    assert_eq!(&bytes[..8], b"Camera01");
    assert_eq!(bytes[8], 0);

    // Over capacity.
    let err = map.set_str(id, "a string longer than sixteen bytes", true).unwrap_err();
    assert!(matches!(err, genapi_rs::Error::OutOfRange(_)));
}

// ============================================================================
// 8. Raw register bytes
// ============================================================================

#[test]
fn test_raw_register_round_trip() {
    let port = Arc::new(MemoryPort::new(0x100));
    let mut b = NodeMapBuilder::new("Device");
    let lut = b.add_register(RegisterDef::new("LUTValue", &port, 0x70, 4)).unwrap();
    let map = b.finalize().unwrap();

    map.set_register(lut, &[0xDE, 0xAD, 0xBE, 0xEF]).unwrap();
    assert_eq!(map.get_register(lut, false).unwrap(), vec![0xDE, 0xAD, 0xBE, 0xEF]);

    // Length mismatch is a range error.
    assert!(matches!(
        map.set_register(lut, &[1, 2]),
        Err(genapi_rs::Error::OutOfRange(_))
    ));
}

// ============================================================================
// 9. Command execute and completion
// ============================================================================

#[test]
fn test_command_execute_and_is_done() {
    let port = Arc::new(MemoryPort::new(0x100));
    let mut b = NodeMapBuilder::new("Device");
    let start = b
        .add_command(
            CommandDef::new(
                "AcquisitionStart",
                IntSource::register(&port, 0x80, 4, Endianness::Little),
            )
            .with_command_value(1),
        )
        .unwrap();
    let map = b.finalize().unwrap();

    map.execute(start, true).unwrap();

    // Device still shows the command value: not done yet.
    assert!(!map.is_done(start).unwrap());

    // Device self-resets the register: done.
    port.write(&[0, 0, 0, 0], 0x80).unwrap();
    assert!(map.is_done(start).unwrap());
}

// ============================================================================
// 10. Representation-aware text conversion
// ============================================================================

#[test]
fn test_hex_representation_text() {
    let mut b = NodeMapBuilder::new("Device");
    let mask = b
        .add_integer(
            IntegerDef::new("PixelMask", IntSource::Value(0x2A))
                .with_representation(Representation::HexNumber),
        )
        .unwrap();
    let map = b.finalize().unwrap();

    assert_eq!(map.to_text(mask).unwrap(), "0x2A");
    map.from_text(mask, "0x30", true).unwrap();
    assert_eq!(map.int_value(mask).unwrap(), 48);
}

#[test]
fn test_ipv4_representation_text() {
    let mut b = NodeMapBuilder::new("Device");
    let addr = b
        .add_integer(
            IntegerDef::new("GevCurrentIPAddress", IntSource::Value(0))
                .with_representation(Representation::Ipv4Address),
        )
        .unwrap();
    let map = b.finalize().unwrap();

    map.from_text(addr, "192.168.0.1", true).unwrap();
    assert_eq!(map.int_value(addr).unwrap(), 0xC0A80001u32 as i64);
    assert_eq!(map.to_text(addr).unwrap(), "192.168.0.1");
}

// ============================================================================
// 11. Delegated value (pValue-style node reference)
// ============================================================================

#[test]
fn test_node_delegation() {
    let mut b = NodeMapBuilder::new("Device");
    let raw = b
        .add_integer(IntegerDef::new("GainRaw", IntSource::Value(7)).with_range(0, 255))
        .unwrap();
    let alias = b
        .add_integer(IntegerDef::new("Gain", IntSource::Node(raw)).with_range(0, 255))
        .unwrap();
    let map = b.finalize().unwrap();

    assert_eq!(map.int_value(alias).unwrap(), 7);
    map.set_int(alias, 9, true).unwrap();
    assert_eq!(map.int_value(raw).unwrap(), 9);
}
