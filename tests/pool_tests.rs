use frameconv::descriptor::Boxed;
use frameconv::pool::{ArrayPool, BufferPool, BufferedProperty, FoundProperty};
use frameconv::reader::TokenReader;
use frameconv::{
    try_read, ConvertOptions, Describe, ObjectBuilder, ReadStack, Registry, Result,
    StreamDeserializer, TypeDescriptor,
};
use std::cell::Cell;
use std::rc::Rc;

/// Counts rentals and returns on top of an [`ArrayPool`].
#[derive(Default)]
struct TrackingPool {
    inner: ArrayPool,
    rented: Cell<usize>,
    returned: Cell<usize>,
}

impl TrackingPool {
    fn outstanding(&self) -> usize {
        self.rented.get() - self.returned.get()
    }

    fn rent(&self) {
        self.rented.set(self.rented.get() + 1);
    }

    fn give_back(&self) {
        self.returned.set(self.returned.get() + 1);
    }
}

impl BufferPool for TrackingPool {
    fn rent_slots(&self, capacity: usize) -> Vec<Option<Boxed>> {
        self.rent();
        self.inner.rent_slots(capacity)
    }

    fn return_slots(&self, slots: Vec<Option<Boxed>>) {
        assert!(slots.is_empty());
        self.give_back();
        self.inner.return_slots(slots);
    }

    fn rent_found(&self) -> Vec<FoundProperty> {
        self.rent();
        self.inner.rent_found()
    }

    fn return_found(&self, found: Vec<FoundProperty>) {
        assert!(found.is_empty());
        self.give_back();
        self.inner.return_found(found);
    }

    fn rent_buffered(&self) -> Vec<BufferedProperty> {
        self.rent();
        self.inner.rent_buffered()
    }

    fn return_buffered(&self, buffered: Vec<BufferedProperty>) {
        assert!(buffered.is_empty());
        self.give_back();
        self.inner.return_buffered(buffered);
    }
}

#[derive(Debug, PartialEq)]
struct Record {
    a: u8,
    b: u8,
    c: u8,
    d: u8,
    e: u8,
    label: String,
}

impl Describe for Record {
    fn describe(_: &Registry) -> Result<TypeDescriptor> {
        ObjectBuilder::<Record>::new("Record")
            .read_only::<u8>("a", |r| &r.a)
            .read_only::<u8>("b", |r| &r.b)
            .read_only::<u8>("c", |r| &r.c)
            .read_only::<u8>("d", |r| &r.d)
            .read_only::<u8>("e", |r| &r.e)
            .property::<String>("label", |r| &r.label, |r, v| r.label = v)
            .parameter::<u8>("a")
            .parameter::<u8>("b")
            .parameter::<u8>("c")
            .parameter::<u8>("d")
            .parameter::<u8>("e")
            .constructor(|args| {
                Ok(Record {
                    a: args.take(0)?,
                    b: args.take(1)?,
                    c: args.take(2)?,
                    d: args.take(3)?,
                    e: args.take(4)?,
                    label: String::new(),
                })
            })
            .build()
    }
}

const COMPLETE: &[u8] = br#"{"label": "x", "a": 1, "b": 2, "c": 3, "d": 4, "e": 5}"#;
const MISSING_E: &[u8] = br#"{"label": "x", "a": 1, "b": 2, "c": 3, "d": 4}"#;

fn read_whole(input: &[u8], pool: &Rc<TrackingPool>) -> Result<Option<Boxed>> {
    let options = ConvertOptions::default();
    let descriptor = options.registry.get::<Record>()?;
    let mut stack = ReadStack::with_pool(options, pool.clone());
    let mut reader = TokenReader::new(input, true);
    try_read(&descriptor, &mut reader, &mut stack)
}

fn read_streamed(input: &[u8], pool: &Rc<TrackingPool>) -> Result<Record> {
    let mut stream = StreamDeserializer::<Record>::with_pool(ConvertOptions::default(), pool.clone())?;
    for byte in input {
        stream.feed(std::slice::from_ref(byte))?;
    }
    stream.finish()
}

#[test]
fn test_fast_path_returns_every_buffer() {
    let pool = Rc::new(TrackingPool::default());
    let value = read_whole(COMPLETE, &pool).unwrap().unwrap();
    let record = value.downcast::<Record>().unwrap();
    assert_eq!(record.label, "x");
    assert_eq!(record.e, 5);
    assert_eq!(pool.rented.get(), 2);
    assert_eq!(pool.outstanding(), 0);

    assert!(read_whole(MISSING_E, &pool).is_err());
    assert_eq!(pool.outstanding(), 0);
}

#[test]
fn test_resumable_path_returns_every_buffer() {
    let pool = Rc::new(TrackingPool::default());
    let record = read_streamed(COMPLETE, &pool).unwrap();
    assert_eq!(record.label, "x");
    assert_eq!(pool.rented.get(), 2);
    assert_eq!(pool.outstanding(), 0);

    assert!(read_streamed(MISSING_E, &pool).is_err());
    assert_eq!(pool.outstanding(), 0);
}

#[test]
fn test_abandoned_stream_returns_buffers() {
    let pool = Rc::new(TrackingPool::default());
    let mut stream = StreamDeserializer::<Record>::with_pool(ConvertOptions::default(), pool.clone()).unwrap();
    stream.feed(&COMPLETE[..30]).unwrap();
    assert!(pool.outstanding() > 0);
    drop(stream);
    assert_eq!(pool.outstanding(), 0);
}

#[test]
fn test_small_constructors_do_not_rent() {
    #[derive(Debug)]
    struct Pair(u8, u8);

    impl Describe for Pair {
        fn describe(_: &Registry) -> Result<TypeDescriptor> {
            ObjectBuilder::<Pair>::new("Pair")
                .read_only::<u8>("l", |p| &p.0)
                .read_only::<u8>("r", |p| &p.1)
                .parameter::<u8>("l")
                .parameter::<u8>("r")
                .constructor(|args| Ok(Pair(args.take(0)?, args.take(1)?)))
                .build()
        }
    }

    let pool = Rc::new(TrackingPool::default());
    let options = ConvertOptions::default();
    let descriptor = options.registry.get::<Pair>().unwrap();
    let mut stack = ReadStack::with_pool(options, pool.clone());
    let mut reader = TokenReader::new(br#"{"r": 2, "l": 1}"#, true);
    let value = try_read(&descriptor, &mut reader, &mut stack).unwrap().unwrap();
    let pair = value.downcast::<Pair>().unwrap();
    assert_eq!((pair.0, pair.1), (1, 2));
    assert_eq!(pool.rented.get(), 0);
}
