use frameconv::{
    from_slice_with_options, from_str, to_string, to_string_with_options, CollectionShape,
    ConvertOptions, Describe, Error, ReferenceHandling, Registry, Result, TypeDescriptor,
};
use indexmap::IndexMap;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::rc::Rc;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq)]
enum Level {
    Low,
    High,
}

impl Describe for Level {
    fn describe(_: &Registry) -> Result<TypeDescriptor> {
        Ok(TypeDescriptor::unit_enum(
            "Level",
            &[("low", Level::Low), ("high", Level::High)],
        ))
    }
}

/// Collection whose builder refuses additions once sealed.
#[derive(Debug)]
struct Sealed(Vec<u8>);

impl CollectionShape for Sealed {
    type Element = u8;
    type Builder = (bool, Vec<u8>);

    fn create(_capacity: usize) -> Self::Builder {
        (true, Vec::new())
    }

    fn add(builder: &mut Self::Builder, element: u8) -> Result<()> {
        builder.1.push(element);
        Ok(())
    }

    fn finish(builder: Self::Builder) -> Result<Self> {
        Ok(Sealed(builder.1))
    }

    fn is_read_only(builder: &Self::Builder) -> bool {
        builder.0
    }

    fn elements(&self) -> Box<dyn Iterator<Item = &u8> + '_> {
        Box::new(self.0.iter())
    }
}

impl Describe for Sealed {
    fn describe(_: &Registry) -> Result<TypeDescriptor> {
        Ok(TypeDescriptor::enumerable::<Sealed>())
    }
}

#[test]
fn test_sequences() {
    let nested: Vec<Vec<i16>> = from_str("[[1, -2], [], [3]]").unwrap();
    assert_eq!(nested, vec![vec![1, -2], vec![], vec![3]]);
    assert_eq!(to_string(&nested).unwrap(), "[[1,-2],[],[3]]");

    let queue: VecDeque<String> = from_str(r#"["a", "b"]"#).unwrap();
    assert_eq!(queue.front().map(String::as_str), Some("a"));

    let set: BTreeSet<u8> = from_str("[3, 1, 3, 2]").unwrap();
    assert_eq!(to_string(&set).unwrap(), "[1,2,3]");

    let hashed: HashSet<char> = from_str(r#"["x", "y", "x"]"#).unwrap();
    assert_eq!(hashed.len(), 2);

    let boxed: Box<[bool]> = from_str("[true, false]").unwrap();
    assert_eq!(&*boxed, &[true, false]);
}

#[test]
fn test_options_and_enums_as_elements() {
    let levels: Vec<Option<Level>> = from_str(r#"["high", null, "low"]"#).unwrap();
    assert_eq!(levels, vec![Some(Level::High), None, Some(Level::Low)]);
    assert_eq!(to_string(&levels).unwrap(), r#"["high",null,"low"]"#);

    let err = from_str::<Vec<Level>>(r#"["medium"]"#).unwrap_err();
    assert_eq!(err.path(), Some("$[0]"));
}

#[test]
fn test_read_only_collection_is_rejected() {
    let err = from_str::<Sealed>("[1]").unwrap_err();
    assert!(matches!(err.inner(), Error::ReadOnlyCollection(_)));
    assert_eq!(to_string(&Sealed(vec![4, 5])).unwrap(), "[4,5]");
}

#[test]
fn test_dictionaries() {
    let map: HashMap<String, Vec<u8>> = from_str(r#"{"a": [1], "b": []}"#).unwrap();
    assert_eq!(map["a"], vec![1]);
    assert!(map["b"].is_empty());

    let ordered: IndexMap<String, i32> = from_str(r#"{"z": 1, "a": 2, "z": 3}"#).unwrap();
    assert_eq!(ordered.keys().collect::<Vec<_>>(), vec!["z", "a"]);
    assert_eq!(ordered["z"], 3);

    let numeric: BTreeMap<u32, bool> = from_str(r#"{"10": false, "2": true}"#).unwrap();
    assert_eq!(to_string(&numeric).unwrap(), r#"{"2":true,"10":false}"#);

    let err = from_str::<BTreeMap<u32, bool>>(r#"{"ten": true}"#).unwrap_err();
    assert!(err.to_string().contains("ten"));
}

#[test]
fn test_uuid_keys_round_trip() {
    let id = Uuid::from_u128(0x0123_4567_89ab_cdef_0123_4567_89ab_cdef);
    let mut counts = HashMap::new();
    counts.insert(id, 7);

    let json = to_string(&counts).unwrap();
    assert_eq!(json, r#"{"01234567-89ab-cdef-0123-456789abcdef":7}"#);
    let back: HashMap<Uuid, i32> = from_str(&json).unwrap();
    assert_eq!(back, counts);
}

#[test]
fn test_preserved_collection_uses_values_wrapper() {
    let shared = Rc::new(vec![1u8, 2]);
    let pair = vec![shared.clone(), shared];
    let options = ConvertOptions::new().with_reference_handling(ReferenceHandling::Preserve);

    let json = to_string_with_options(&pair, &options).unwrap();
    assert_eq!(json, r#"[{"$id":"1","$values":[1,2]},{"$ref":"1"}]"#);

    let back: Vec<Rc<Vec<u8>>> = from_slice_with_options(json.as_bytes(), &options).unwrap();
    assert_eq!(*back[0], vec![1, 2]);
    assert!(Rc::ptr_eq(&back[0], &back[1]));
}

#[test]
fn test_values_wrapper_must_close() {
    let options = ConvertOptions::new().with_reference_handling(ReferenceHandling::Preserve);
    let err = from_slice_with_options::<Rc<Vec<u8>>>(br#"{"$id": "1", "$values": [1], "x": 2}"#, &options)
        .unwrap_err();
    assert!(err.is_syntax() || err.is_binding());
}

#[test]
fn test_plain_array_under_preserve() {
    let options = ConvertOptions::new().with_reference_handling(ReferenceHandling::Preserve);
    let value: Rc<Vec<u8>> = from_slice_with_options(b"[7]", &options).unwrap();
    assert_eq!(*value, vec![7]);
}
