use frameconv::{
    from_str, from_value, to_string, to_string_with_options, to_value, value, ConvertOptions,
    Number, Value,
};
use std::collections::BTreeMap;

#[test]
fn test_value_macro_scalars() {
    assert_eq!(value!(null), Value::Null);
    assert_eq!(value!(false), Value::Bool(false));
    assert_eq!(value!(-123), Value::Number(Number::Integer(-123)));
    assert_eq!(value!(""), Value::String(String::new()));
}

#[test]
fn test_value_macro_keeps_member_order() {
    let v = value!({
        "zeta": 1,
        "alpha": [true, null],
        "mid": {}
    });
    assert_eq!(to_string(&v).unwrap(), r#"{"zeta":1,"alpha":[true,null],"mid":{}}"#);
}

#[test]
fn test_numbers_keep_their_form() {
    let v: Value = from_str("[1, -0.5, 1e3, 18446744073709551616]").unwrap();
    let items = v.as_array().unwrap();
    assert_eq!(items[0], Value::Number(Number::Integer(1)));
    assert_eq!(items[1], Value::Number(Number::Float(-0.5)));
    assert_eq!(items[2], Value::Number(Number::Float(1000.0)));
    assert!(matches!(items[3], Value::Number(Number::Big(_))));
    assert_eq!(
        to_string(&items[3]).unwrap(),
        "18446744073709551616"
    );
}

#[test]
fn test_duplicate_members_keep_the_last() {
    let v: Value = from_str(r#"{"a": 1, "b": 2, "a": 3}"#).unwrap();
    let map = v.as_object().unwrap();
    assert_eq!(map.len(), 2);
    assert_eq!(map.get("a").and_then(Value::as_i64), Some(3));
}

#[test]
fn test_typed_and_untyped_views_agree() {
    let mut typed = BTreeMap::new();
    typed.insert("x".to_string(), vec![1u8, 2]);
    let tree = to_value(&typed).unwrap();
    assert_eq!(tree, value!({ "x": [1, 2] }));
    assert_eq!(from_value::<BTreeMap<String, Vec<u8>>>(&tree).unwrap(), typed);
}

#[test]
fn test_value_as_a_member_type() {
    let rows: Vec<BTreeMap<String, Value>> =
        from_str(r#"[{"id": 1, "meta": {"tags": ["a"]}}, {"id": 2, "meta": null}]"#).unwrap();
    assert_eq!(rows[0]["meta"], value!({ "tags": ["a"] }));
    assert_eq!(rows[1]["meta"], Value::Null);
}

#[test]
fn test_non_finite_floats_are_rejected() {
    assert!(to_string(&Value::Number(Number::Float(f64::NAN))).is_err());
    assert!(to_string(&f64::INFINITY).is_err());
}

#[test]
fn test_deep_trees_hit_the_depth_limit_when_written() {
    let mut tree = Value::Null;
    for _ in 0..200 {
        tree = Value::Array(vec![tree]);
    }
    let err = to_string(&tree).unwrap_err();
    assert!(err.is_capacity());

    let options = ConvertOptions::new().with_max_depth(256);
    let text = to_string_with_options(&tree, &options).unwrap();
    assert_eq!(text.len(), 2 * 200 + 4);
    assert!(from_str::<Value>(&text).unwrap_err().is_capacity());
}
