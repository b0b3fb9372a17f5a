use frameconv::reader::TokenReader;
use frameconv::{
    from_str, to_string, to_vec, try_read, ConvertOptions, Error, ReadStack, StreamDeserializer,
    StreamSerializer, Value,
};
use proptest::prelude::*;
use std::collections::BTreeMap;

fn read_with_splits<T: frameconv::Describe>(input: &[u8], splits: &[usize]) -> frameconv::Result<T> {
    let mut stream = StreamDeserializer::<T>::new(ConvertOptions::default())?;
    let mut start = 0;
    for &split in splits {
        let end = split.clamp(start, input.len());
        stream.feed(&input[start..end])?;
        start = end;
    }
    stream.feed(&input[start..])?;
    stream.finish()
}

fn write_in_steps<T: frameconv::Describe>(value: &T, threshold: usize) -> Vec<u8> {
    let options = ConvertOptions::new().with_flush_threshold(threshold);
    let mut serializer = StreamSerializer::new(value, options).unwrap();
    let mut output = Vec::new();
    while !serializer.write_step().unwrap() {
        output.extend(serializer.take_output());
    }
    output.extend(serializer.take_output());
    output
}

#[test]
fn test_suspended_read_keeps_partial_token() {
    let options = ConvertOptions::default();
    let descriptor = options.registry.get::<Vec<String>>().unwrap();
    let mut stack = ReadStack::new(options);

    let input = br#"["alpha", "beta"]"#;
    let mut reader = TokenReader::new(&input[..10], false);
    assert!(try_read(&descriptor, &mut reader, &mut stack).unwrap().is_none());
    assert!(stack.frame_count() > 0);
    let consumed = reader.bytes_consumed();
    assert_eq!(consumed, 8);
    let state = reader.into_state();

    let mut reader = TokenReader::with_state(&input[consumed..], true, state);
    let value = try_read(&descriptor, &mut reader, &mut stack).unwrap().unwrap();
    assert_eq!(
        *value.downcast::<Vec<String>>().unwrap(),
        vec!["alpha".to_string(), "beta".to_string()]
    );
    assert_eq!(stack.frame_count(), 0);
}

#[test]
fn test_value_subtree_waits_until_buffered() {
    let input = br#"[{"a": [1, 2, {"b": null}]}, "tail"]"#;
    let value: Vec<Value> = read_with_splits(input, &[3, 9, 17, 25]).unwrap();
    assert_eq!(value, from_str::<Vec<Value>>(std::str::from_utf8(input).unwrap()).unwrap());
}

#[test]
fn test_error_is_terminal_and_located() {
    let mut stream = StreamDeserializer::<Vec<u8>>::new(ConvertOptions::default()).unwrap();
    assert!(!stream.feed(b"[1,\n2,").unwrap());
    let err = stream.feed(b" 300]").unwrap_err();
    assert_eq!(err.path(), Some("$[2]"));
    match err {
        Error::Annotated { line, offset, .. } => {
            assert_eq!(line, Some(2));
            assert!(offset.unwrap() > 6);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_depth_limit() {
    let deep = format!("{}{}", "[".repeat(10), "]".repeat(10));
    let options = ConvertOptions::new().with_max_depth(4);
    let err = frameconv::from_slice_with_options::<Value>(deep.as_bytes(), &options).unwrap_err();
    assert!(err.is_capacity() || err.is_syntax());

    let nested: Vec<Vec<Vec<Vec<Vec<u8>>>>> = vec![vec![vec![vec![vec![1]]]]];
    let err = frameconv::to_vec_with_options(&nested, &options).unwrap_err();
    assert!(err.is_capacity());
}

#[test]
fn test_writer_threshold_of_one_matches_whole_write() {
    let mut data = BTreeMap::new();
    data.insert("numbers".to_string(), vec![1i64, -2, 3]);
    data.insert("empty".to_string(), vec![]);
    assert_eq!(write_in_steps(&data, 1), to_vec(&data).unwrap());
}

proptest! {
    #[test]
    fn prop_any_split_reads_the_same(
        data in prop::collection::btree_map("[a-z\\\\\"é]{0,6}", prop::collection::vec(any::<i64>(), 0..6), 0..6),
        splits in prop::collection::vec(0usize..200, 0..8),
    ) {
        let json = to_string(&data).unwrap();
        let mut splits = splits;
        splits.sort_unstable();
        let back: BTreeMap<String, Vec<i64>> = read_with_splits(json.as_bytes(), &splits).unwrap();
        prop_assert_eq!(back, data);
    }

    #[test]
    fn prop_one_byte_chunks(values in prop::collection::vec(proptest::option::of(any::<u32>()), 0..12)) {
        let json = to_vec(&values).unwrap();
        let splits: Vec<usize> = (1..json.len()).collect();
        let back: Vec<Option<u32>> = read_with_splits(&json, &splits).unwrap();
        prop_assert_eq!(back, values);
    }

    #[test]
    fn prop_any_threshold_writes_the_same(
        values in prop::collection::vec("[ -~]{0,8}", 0..10),
        threshold in 1usize..64,
    ) {
        prop_assert_eq!(write_in_steps(&values, threshold), to_vec(&values).unwrap());
    }
}
