//! Property-based round trips through the public read and write entry points.

use chrono::{DateTime, TimeZone, Utc};
use frameconv::{from_str, to_string, Describe, Number, Value, ValueMap};
use num_bigint::BigInt;
use proptest::prelude::*;
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

fn roundtrip<T: Describe + PartialEq + std::fmt::Debug>(value: &T) -> bool {
    match to_string(value) {
        Ok(text) => match from_str::<T>(&text) {
            Ok(back) => *value == back,
            Err(e) => {
                eprintln!("read failed: {e}");
                eprintln!("text was: {text}");
                false
            }
        },
        Err(e) => {
            eprintln!("write failed: {e}");
            false
        }
    }
}

/// Value trees whose numbers survive a trip through JSON text unchanged.
fn arb_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|i| Value::Number(Number::Integer(i))),
        (-1.0e9f64..1.0e9)
            .prop_filter("fractional", |f| f.fract() != 0.0)
            .prop_map(|f| Value::Number(Number::Float(f))),
        "[ -~\\n\\t\"\\\\é😀]{0,10}".prop_map(Value::String),
    ];
    leaf.prop_recursive(4, 48, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::vec(("[a-z_]{0,5}", inner), 0..6).prop_map(|entries| {
                let mut map = ValueMap::new();
                for (key, value) in entries {
                    map.insert(key, value);
                }
                Value::Object(map)
            }),
        ]
    })
}

proptest! {
    #[test]
    fn prop_i32(n in any::<i32>()) {
        prop_assert!(roundtrip(&n));
    }

    #[test]
    fn prop_u64(n in any::<u64>()) {
        prop_assert!(roundtrip(&n));
    }

    #[test]
    fn prop_f64(f in any::<f64>().prop_filter("finite", |f| f.is_finite())) {
        prop_assert!(roundtrip(&f));
    }

    #[test]
    fn prop_char(c in any::<char>()) {
        prop_assert!(roundtrip(&c));
    }

    #[test]
    fn prop_string(s in any::<String>()) {
        prop_assert!(roundtrip(&s));
    }

    #[test]
    fn prop_big_int(digits in "-?[1-9][0-9]{0,40}") {
        let n: BigInt = digits.parse().unwrap();
        prop_assert!(roundtrip(&n));
    }

    #[test]
    fn prop_uuid(bits in any::<u128>()) {
        prop_assert!(roundtrip(&Uuid::from_u128(bits)));
    }

    #[test]
    fn prop_date_time(secs in 0i64..4_000_000_000, nanos in 0u32..1_000_000_000) {
        let date: DateTime<Utc> = Utc.timestamp_opt(secs, nanos).unwrap();
        prop_assert!(roundtrip(&date));
    }

    #[test]
    fn prop_nested_options(v in prop::collection::vec(proptest::option::of(any::<i16>()), 0..16)) {
        prop_assert!(roundtrip(&v));
    }

    #[test]
    fn prop_string_keyed_map(m in prop::collection::hash_map(any::<String>(), any::<bool>(), 0..8)) {
        prop_assert!(roundtrip(&m));
    }

    #[test]
    fn prop_integer_keyed_map(m in prop::collection::btree_map(any::<i32>(), "[a-z]{0,4}", 0..8)) {
        prop_assert!(roundtrip(&m));
    }

    #[test]
    fn prop_value_tree(value in arb_value()) {
        prop_assert!(roundtrip(&value));
    }

    #[test]
    fn prop_output_is_valid_json(value in arb_value()) {
        let text = to_string(&value).unwrap();
        prop_assert!(serde_json::from_str::<serde_json::Value>(&text).is_ok(), "{}", text);
    }
}

#[test]
fn test_nested_map_of_vectors() {
    let mut data: HashMap<String, Vec<BTreeMap<String, u8>>> = HashMap::new();
    let mut inner = BTreeMap::new();
    inner.insert("k".to_string(), 1);
    data.insert("outer".to_string(), vec![inner, BTreeMap::new()]);
    assert!(roundtrip(&data));
}
