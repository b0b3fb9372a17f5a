use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use frameconv::{
    from_slice, from_str, to_string, to_string_with_options, to_vec, ConvertOptions, Describe,
    ObjectBuilder, ReferenceHandling, Registry, Result, StreamDeserializer, StreamSerializer,
    TypeDescriptor, Value,
};
use std::rc::Rc;

#[derive(Clone, Default)]
struct User {
    id: u32,
    name: String,
    email: String,
    active: bool,
}

impl Describe for User {
    fn describe(_: &Registry) -> Result<TypeDescriptor> {
        ObjectBuilder::<User>::new("User")
            .with_default()
            .property::<u32>("id", |u| &u.id, |u, v| u.id = v)
            .property::<String>("name", |u| &u.name, |u, v| u.name = v)
            .property::<String>("email", |u| &u.email, |u, v| u.email = v)
            .property::<bool>("active", |u| &u.active, |u, v| u.active = v)
            .build()
    }
}

#[derive(Clone)]
struct Product {
    sku: String,
    name: String,
    price: f64,
    quantity: u32,
}

impl Describe for Product {
    fn describe(_: &Registry) -> Result<TypeDescriptor> {
        ObjectBuilder::<Product>::new("Product")
            .read_only::<String>("sku", |p| &p.sku)
            .read_only::<String>("name", |p| &p.name)
            .read_only::<f64>("price", |p| &p.price)
            .read_only::<u32>("quantity", |p| &p.quantity)
            .parameter::<String>("sku")
            .parameter::<String>("name")
            .parameter::<f64>("price")
            .parameter::<u32>("quantity")
            .constructor(|args| {
                Ok(Product {
                    sku: args.take(0)?,
                    name: args.take(1)?,
                    price: args.take(2)?,
                    quantity: args.take(3)?,
                })
            })
            .build()
    }
}

fn products(size: u32) -> Vec<Product> {
    (0..size)
        .map(|i| Product {
            sku: format!("SKU{}", i),
            name: format!("Product {}", i),
            price: 9.99 + f64::from(i),
            quantity: i,
        })
        .collect()
}

fn sample_user() -> User {
    User {
        id: 123,
        name: "Alice".to_string(),
        email: "alice@example.com".to_string(),
        active: true,
    }
}

fn read_in_chunks<T: Describe>(input: &[u8], chunk: usize) -> T {
    let mut stream = StreamDeserializer::<T>::new(ConvertOptions::default()).unwrap();
    for piece in input.chunks(chunk) {
        stream.feed(piece).unwrap();
    }
    stream.finish().unwrap()
}

fn write_in_steps<T: Describe>(value: &T, threshold: usize) -> usize {
    let options = ConvertOptions::new().with_flush_threshold(threshold);
    let mut serializer = StreamSerializer::new(value, options).unwrap();
    let mut written = 0;
    while !serializer.write_step().unwrap() {
        written += serializer.take_output().len();
    }
    written + serializer.take_output().len()
}

fn benchmark_simple_object(c: &mut Criterion) {
    let user = sample_user();
    let json = to_string(&user).unwrap();

    c.bench_function("write_simple_object", |b| {
        b.iter(|| to_string(black_box(&user)))
    });
    c.bench_function("read_simple_object", |b| {
        b.iter(|| from_str::<User>(black_box(&json)))
    });
}

fn benchmark_constructor_array(c: &mut Criterion) {
    let mut group = c.benchmark_group("constructor_array");

    for size in [10, 100, 500] {
        let input = to_vec(&products(size)).unwrap();
        group.bench_with_input(BenchmarkId::new("fast", size), &input, |b, input| {
            b.iter(|| from_slice::<Vec<Product>>(black_box(input)))
        });
        group.bench_with_input(BenchmarkId::new("chunked_4k", size), &input, |b, input| {
            b.iter(|| read_in_chunks::<Vec<Product>>(black_box(input), 4096))
        });
        group.bench_with_input(BenchmarkId::new("chunked_16", size), &input, |b, input| {
            b.iter(|| read_in_chunks::<Vec<Product>>(black_box(input), 16))
        });
    }
    group.finish();
}

fn benchmark_writer_thresholds(c: &mut Criterion) {
    let mut group = c.benchmark_group("writer_threshold");
    let data = products(500);

    group.bench_function("whole", |b| b.iter(|| to_vec(black_box(&data))));
    for threshold in [64, 1024, 16 * 1024] {
        group.bench_with_input(BenchmarkId::from_parameter(threshold), &threshold, |b, &t| {
            b.iter(|| write_in_steps(black_box(&data), t))
        });
    }
    group.finish();
}

fn benchmark_reference_preservation(c: &mut Criterion) {
    let shared = Rc::new(sample_user());
    let users: Vec<Rc<User>> = (0..200).map(|_| shared.clone()).collect();
    let preserve = ConvertOptions::new().with_reference_handling(ReferenceHandling::Preserve);

    let mut group = c.benchmark_group("references");
    group.bench_function("ignore", |b| b.iter(|| to_string(black_box(&users))));
    group.bench_function("preserve", |b| {
        b.iter(|| to_string_with_options(black_box(&users), &preserve))
    });
    group.finish();
}

fn benchmark_value_tree(c: &mut Criterion) {
    let input = to_string(&products(100)).unwrap();
    let mut group = c.benchmark_group("value_tree");

    group.bench_function("frameconv", |b| {
        b.iter(|| from_str::<Value>(black_box(&input)))
    });
    group.bench_function("serde_json", |b| {
        b.iter(|| serde_json::from_str::<Value>(black_box(&input)))
    });
    group.finish();
}

criterion_group!(
    benches,
    benchmark_simple_object,
    benchmark_constructor_array,
    benchmark_writer_thresholds,
    benchmark_reference_preservation,
    benchmark_value_tree
);
criterion_main!(benches);
