//! End-to-end tests for selector digit sweeps.

use std::collections::HashSet;

use pretty_assertions::assert_eq;

use genapi_rs::{
    BooleanDef, EnumEntryDef, EnumerationDef, IntSource, IntegerDef, NodeMapBuilder, Ref,
    SelectorDigit, SelectorSet,
};

fn selector_map() -> (genapi_rs::NodeMap, genapi_rs::NodeId, genapi_rs::NodeId) {
    let mut b = NodeMapBuilder::new("Device");
    let channel = b
        .add_enumeration(
            EnumerationDef::new("GainSelector", IntSource::Value(0)).with_entries(vec![
                EnumEntryDef::new("All", 0),
                EnumEntryDef::new("Red", 1),
                EnumEntryDef::new("Blue", 2),
            ]),
        )
        .unwrap();
    let tap = b
        .add_integer(
            IntegerDef::new("TapSelector", IntSource::Value(0))
                .with_range(0, 2)
                .with_inc(1),
        )
        .unwrap();
    (b.finalize().unwrap(), channel, tap)
}

// ============================================================================
// 1. Full sweep visits the cartesian product exactly once
// ============================================================================

#[test]
fn test_full_sweep_visits_nine_combinations() {
    let (map, channel, tap) = selector_map();

    let mut set = SelectorSet::new(vec![
        SelectorDigit::enum_digit(&map, channel).unwrap(),
        SelectorDigit::int_digit(&map, tap).unwrap(),
    ]);

    let mut visited = Vec::new();
    assert!(set.set_first(&map).unwrap());
    loop {
        visited.push((
            map.enum_int_value(channel).unwrap(),
            map.int_value(tap).unwrap(),
        ));
        if !set.set_next(&map).unwrap() {
            break;
        }
    }

    assert_eq!(visited.len(), 9);
    let unique: HashSet<_> = visited.iter().collect();
    assert_eq!(unique.len(), 9, "every combination exactly once");
}

// ============================================================================
// 2. Restore puts both selectors back
// ============================================================================

#[test]
fn test_restore_after_sweep() {
    let (map, channel, tap) = selector_map();

    // Non-default starting point, captured at digit construction.
    map.set_enum(channel, "Red", true).unwrap();
    map.set_int(tap, 2, true).unwrap();

    let mut set = SelectorSet::new(vec![
        SelectorDigit::enum_digit(&map, channel).unwrap(),
        SelectorDigit::int_digit(&map, tap).unwrap(),
    ]);

    assert!(set.set_first(&map).unwrap());
    while set.set_next(&map).unwrap() {}
    set.restore(&map).unwrap();

    assert_eq!(map.enum_value(channel).unwrap(), "Red");
    assert_eq!(map.int_value(tap).unwrap(), 2);
}

// ============================================================================
// 3. Integer digit honors the increment
// ============================================================================

#[test]
fn test_int_digit_honors_increment() {
    let mut b = NodeMapBuilder::new("Device");
    let tap = b
        .add_integer(
            IntegerDef::new("TapSelector", IntSource::Value(0))
                .with_range(0, 8)
                .with_inc(4),
        )
        .unwrap();
    let map = b.finalize().unwrap();

    let mut digit = SelectorDigit::int_digit(&map, tap).unwrap();
    let mut values = Vec::new();
    assert!(digit.set_first(&map).unwrap());
    values.push(map.int_value(tap).unwrap());
    while digit.set_next(&map, true).unwrap() {
        values.push(map.int_value(tap).unwrap());
    }
    assert_eq!(values, vec![0, 4, 8]);
}

// ============================================================================
// 4. Enum digit skips unavailable entries
// ============================================================================

#[test]
fn test_enum_digit_skips_unavailable_entries() {
    let mut b = NodeMapBuilder::new("Device");
    let color_mode = b
        .add_boolean(BooleanDef::new("ColorMode", IntSource::Value(0)))
        .unwrap();
    let channel = b
        .add_enumeration(
            EnumerationDef::new("GainSelector", IntSource::Value(0)).with_entries(vec![
                EnumEntryDef::new("All", 0),
                EnumEntryDef::new("Red", 1).with_availability(Ref::Node(color_mode)),
                EnumEntryDef::new("Blue", 2).with_availability(Ref::Node(color_mode)),
            ]),
        )
        .unwrap();
    let map = b.finalize().unwrap();

    let mut digit = SelectorDigit::enum_digit(&map, channel).unwrap();
    let mut values = Vec::new();
    assert!(digit.set_first(&map).unwrap());
    values.push(map.enum_int_value(channel).unwrap());
    while digit.set_next(&map, true).unwrap() {
        values.push(map.enum_int_value(channel).unwrap());
    }
    // Monochrome: only "All" is reachable.
    assert_eq!(values, vec![0]);

    // Color mode on: the full declaration order.
    map.set_bool(color_mode, true, true).unwrap();
    let mut digit = SelectorDigit::enum_digit(&map, channel).unwrap();
    let mut values = Vec::new();
    assert!(digit.set_first(&map).unwrap());
    values.push(map.enum_int_value(channel).unwrap());
    while digit.set_next(&map, true).unwrap() {
        values.push(map.enum_int_value(channel).unwrap());
    }
    assert_eq!(values, vec![0, 1, 2]);
}

// ============================================================================
// 5. Peek (tick = false) advances the cursor but not the device
// ============================================================================

#[test]
fn test_peek_does_not_touch_device() {
    let (map, channel, _tap) = selector_map();

    let mut digit = SelectorDigit::enum_digit(&map, channel).unwrap();
    assert!(digit.set_first(&map).unwrap());
    assert_eq!(map.enum_int_value(channel).unwrap(), 0);

    assert!(digit.set_next(&map, false).unwrap());
    // Device value unchanged by the peek.
    assert_eq!(map.enum_int_value(channel).unwrap(), 0);
}

// ============================================================================
// 6. Incremental selector list names only the digits that moved
// ============================================================================

#[test]
fn test_incremental_selector_list() {
    let (map, channel, tap) = selector_map();

    let mut set = SelectorSet::new(vec![
        SelectorDigit::enum_digit(&map, channel).unwrap(),
        SelectorDigit::int_digit(&map, tap).unwrap(),
    ]);

    assert!(set.set_first(&map).unwrap());
    assert_eq!(set.selector_list(false).len(), 2);

    // First advance moves only the least significant digit.
    assert!(set.set_next(&map).unwrap());
    assert_eq!(set.selector_list(true), vec![channel]);

    // Two more advances wrap the enum digit and carry into the int digit.
    assert!(set.set_next(&map).unwrap());
    assert!(set.set_next(&map).unwrap());
    let changed = set.selector_list(true);
    assert!(changed.contains(&channel));
    assert!(changed.contains(&tap));
}

// ============================================================================
// 7. Empty digit aborts the sweep
// ============================================================================

#[test]
fn test_empty_digit_returns_false() {
    let mut b = NodeMapBuilder::new("Device");
    let off = b.add_boolean(BooleanDef::new("Off", IntSource::Value(0))).unwrap();
    let channel = b
        .add_enumeration(
            EnumerationDef::new("GainSelector", IntSource::Value(0)).with_entries(vec![
                EnumEntryDef::new("All", 0).with_availability(Ref::Node(off)),
            ]),
        )
        .unwrap();
    let map = b.finalize().unwrap();

    let mut set = SelectorSet::new(vec![SelectorDigit::enum_digit(&map, channel).unwrap()]);
    assert!(!set.set_first(&map).unwrap());
}
