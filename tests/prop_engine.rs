//! Property tests for the formula engine and the access-mode algebra.

use proptest::prelude::*;

use genapi_rs::formula::{EmptyResolver, Program};
use genapi_rs::AccessMode;

fn any_access_mode() -> impl Strategy<Value = AccessMode> {
    prop_oneof![
        Just(AccessMode::NI),
        Just(AccessMode::NA),
        Just(AccessMode::WO),
        Just(AccessMode::RO),
        Just(AccessMode::RW),
    ]
}

proptest! {
    #[test]
    fn prop_int_addition_matches_wrapping(a in -1_000_000i64..1_000_000, b in -1_000_000i64..1_000_000) {
        let src = format!("({a}) + ({b})");
        let p = Program::parse(&src).unwrap();
        prop_assert_eq!(p.eval_int(&mut EmptyResolver).unwrap(), a.wrapping_add(b));
    }

    #[test]
    fn prop_int_mod_matches_native(a in -1_000_000_000_000i64..1_000_000_000_000, b in 1i64..10_000) {
        let src = format!("({a}) % {b}");
        let p = Program::parse(&src).unwrap();
        prop_assert_eq!(p.eval_int(&mut EmptyResolver).unwrap(), a.wrapping_rem(b));
    }

    #[test]
    fn prop_parenthesization_is_neutral(a in -10_000i64..10_000, b in -10_000i64..10_000, c in -10_000i64..10_000) {
        let plain = Program::parse(&format!("({a}) + ({b}) * ({c})")).unwrap();
        let parens = Program::parse(&format!("({a}) + (({b}) * ({c}))")).unwrap();
        prop_assert_eq!(
            plain.eval_int(&mut EmptyResolver).unwrap(),
            parens.eval_int(&mut EmptyResolver).unwrap()
        );
    }

    #[test]
    fn prop_float_literals_round_trip(v in -1e12f64..1e12) {
        let p = Program::parse(&format!("({v})")).unwrap();
        let out = p.eval_float(&mut EmptyResolver).unwrap();
        prop_assert!((out - v).abs() <= v.abs() * 1e-12);
    }

    #[test]
    fn prop_combine_is_commutative(a in any_access_mode(), b in any_access_mode()) {
        prop_assert_eq!(a.combine(b), b.combine(a));
    }

    #[test]
    fn prop_combine_is_idempotent(a in any_access_mode()) {
        prop_assert_eq!(a.combine(a), a);
    }

    #[test]
    fn prop_ni_dominates(a in any_access_mode()) {
        prop_assert_eq!(AccessMode::NI.combine(a), AccessMode::NI);
    }
}
