//! End-to-end tests for computed features: read-only formula nodes and
//! bidirectional converters.

use std::sync::Arc;

use pretty_assertions::assert_eq;

use genapi_rs::formula::Program;
use genapi_rs::{
    AccessMode, Endianness, Error, FloatDef, FloatSource, IntSource, IntegerDef, MemoryPort,
    NodeMapBuilder,
};

// ============================================================================
// 1. Read-only formula node over two integers
// ============================================================================

#[test]
fn test_formula_node_computes_and_is_read_only() {
    let mut b = NodeMapBuilder::new("Device");
    let width = b.add_integer(IntegerDef::new("Width", IntSource::Value(640))).unwrap();
    let height = b.add_integer(IntegerDef::new("Height", IntSource::Value(480))).unwrap();
    let payload = b
        .add_integer(IntegerDef::new(
            "PayloadSize",
            IntSource::formula(
                Program::parse("WIDTH * HEIGHT * 2").unwrap(),
                vec![("WIDTH".into(), width), ("HEIGHT".into(), height)],
            ),
        ))
        .unwrap();
    let map = b.finalize().unwrap();

    assert_eq!(map.access_mode(payload).unwrap(), AccessMode::RO);
    assert_eq!(map.int_value(payload).unwrap(), 640 * 480 * 2);
    assert!(matches!(map.set_int(payload, 1, true), Err(Error::Access(_))));
}

// ============================================================================
// 2. Conditional formula with hex masks
// ============================================================================

#[test]
fn test_formula_with_ternary_and_masks() {
    let mut b = NodeMapBuilder::new("Device");
    let status = b.add_integer(IntegerDef::new("Status", IntSource::Value(0x8002))).unwrap();
    let error_bit = b
        .add_integer(IntegerDef::new(
            "ErrorFlag",
            IntSource::formula(
                Program::parse("(STATUS & 0x8000) <> 0 ? 1 : 0").unwrap(),
                vec![("STATUS".into(), status)],
            ),
        ))
        .unwrap();
    let map = b.finalize().unwrap();

    assert_eq!(map.int_value(error_bit).unwrap(), 1);
    map.set_int(status, 0x0002, true).unwrap();
    assert_eq!(map.int_value(error_bit).unwrap(), 0);
}

// ============================================================================
// 3. Float converter over an integer register (classic Gain/GainRaw)
// ============================================================================

#[test]
fn test_float_converter_over_raw_register() {
    let port = Arc::new(MemoryPort::new(0x100));
    let mut b = NodeMapBuilder::new("Device");
    let raw = b
        .add_integer(
            IntegerDef::new("GainRaw", IntSource::register(&port, 0x10, 4, Endianness::Little))
                .with_range(0, 1023),
        )
        .unwrap();
    let gain = b
        .add_float(
            FloatDef::new(
                "Gain",
                FloatSource::converter(
                    Program::parse("TO / 10.0").unwrap(),
                    Program::parse("FROM * 10.0").unwrap(),
                    raw,
                    vec![],
                ),
            )
            .with_range(0.0, 102.3),
        )
        .unwrap();
    let map = b.finalize().unwrap();

    map.set_float(gain, 4.2, true).unwrap();
    assert_eq!(map.int_value(raw).unwrap(), 42);
    assert_eq!(map.float_value(gain).unwrap(), 4.2);

    // Writing the raw side is visible through the converter.
    map.set_int(raw, 100, true).unwrap();
    assert_eq!(map.float_value(gain).unwrap(), 10.0);
}

// ============================================================================
// 4. Integer converter applies its inverse pair
// ============================================================================

#[test]
fn test_int_converter_shifts() {
    let mut b = NodeMapBuilder::new("Device");
    let raw = b
        .add_integer(IntegerDef::new("ExposureRaw", IntSource::Value(0)).with_range(0, 1 << 20))
        .unwrap();
    // Device counts in 16-tick units; the feature exposes microseconds.
    let exposure = b
        .add_integer(IntegerDef::new(
            "ExposureTime",
            IntSource::converter(
                Program::parse("TO * 16").unwrap(),
                Program::parse("FROM / 16").unwrap(),
                raw,
                vec![],
            ),
        ))
        .unwrap();
    let map = b.finalize().unwrap();

    map.set_int(exposure, 1600, true).unwrap();
    assert_eq!(map.int_value(raw).unwrap(), 100);
    assert_eq!(map.int_value(exposure).unwrap(), 1600);
}

// ============================================================================
// 5. Converter write cascades exactly one invalidation sweep
// ============================================================================

#[test]
fn test_converter_write_fires_dependents_once() {
    use genapi_rs::CallbackPhase;
    use std::sync::atomic::{AtomicUsize, Ordering};

    let mut b = NodeMapBuilder::new("Device");
    let raw = b
        .add_integer(IntegerDef::new("GainRaw", IntSource::Value(0)).with_range(0, 1023))
        .unwrap();
    let gain = b
        .add_float(
            FloatDef::new(
                "Gain",
                FloatSource::converter(
                    Program::parse("TO / 10.0").unwrap(),
                    Program::parse("FROM * 10.0").unwrap(),
                    raw,
                    vec![],
                ),
            )
            .with_range(0.0, 102.3),
        )
        .unwrap();
    let map = b.finalize().unwrap();

    let raw_fired = Arc::new(AtomicUsize::new(0));
    let gain_fired = Arc::new(AtomicUsize::new(0));
    let f = raw_fired.clone();
    map.register_callback(raw, CallbackPhase::OutsideLock, move |_| {
        f.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();
    let f = gain_fired.clone();
    map.register_callback(gain, CallbackPhase::OutsideLock, move |_| {
        f.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();

    // One logical write through the converter touches both nodes once.
    map.set_float(gain, 5.0, true).unwrap();
    assert_eq!(raw_fired.load(Ordering::SeqCst), 1);
    assert_eq!(gain_fired.load(Ordering::SeqCst), 1);
}

// ============================================================================
// 6. Formula evaluation failures surface as Runtime errors
// ============================================================================

#[test]
fn test_division_by_zero_is_runtime_error() {
    let mut b = NodeMapBuilder::new("Device");
    let divisor = b.add_integer(IntegerDef::new("Divisor", IntSource::Value(0))).unwrap();
    let quotient = b
        .add_integer(IntegerDef::new(
            "FrameInterval",
            IntSource::formula(
                Program::parse("1000000 / FPS").unwrap(),
                vec![("FPS".into(), divisor)],
            ),
        ))
        .unwrap();
    let map = b.finalize().unwrap();

    assert!(matches!(map.int_value(quotient), Err(Error::Runtime(_))));

    map.set_int(divisor, 25, true).unwrap();
    assert_eq!(map.int_value(quotient).unwrap(), 40_000);
}

// ============================================================================
// 7. Converter bindings expose extra graph variables
// ============================================================================

#[test]
fn test_converter_with_extra_bindings() {
    let mut b = NodeMapBuilder::new("Device");
    let raw = b
        .add_integer(IntegerDef::new("GainRaw", IntSource::Value(0)).with_range(0, 4095))
        .unwrap();
    let scale = b.add_integer(IntegerDef::new("GainScale", IntSource::Value(4))).unwrap();
    let gain = b
        .add_integer(IntegerDef::new(
            "Gain",
            IntSource::converter(
                Program::parse("TO / SCALE").unwrap(),
                Program::parse("FROM * SCALE").unwrap(),
                raw,
                vec![("SCALE".into(), scale)],
            ),
        ))
        .unwrap();
    let map = b.finalize().unwrap();

    map.set_int(gain, 100, true).unwrap();
    assert_eq!(map.int_value(raw).unwrap(), 400);
    assert_eq!(map.int_value(gain).unwrap(), 100);

    // Changing the scale invalidates the converter's cached value.
    map.set_int(scale, 8, true).unwrap();
    assert_eq!(map.int_value(gain).unwrap(), 50);
}
