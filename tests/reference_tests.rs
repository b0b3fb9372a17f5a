use frameconv::{
    from_slice_with_options, from_str, to_string, to_string_with_options, ConvertOptions, Describe,
    Error, ObjectBuilder, ReferenceHandling, Registry, Result, StreamDeserializer, TypeDescriptor,
};
use std::rc::Rc;

#[derive(Debug, Default, PartialEq)]
struct Person {
    name: String,
}

impl Describe for Person {
    fn describe(_: &Registry) -> Result<TypeDescriptor> {
        ObjectBuilder::<Person>::new("Person")
            .with_default()
            .property::<String>("name", |p| &p.name, |p, v| p.name = v)
            .build()
    }
}

#[derive(Debug, Default)]
struct Team {
    lead: Option<Rc<Person>>,
    members: Vec<Rc<Person>>,
}

impl Describe for Team {
    fn describe(_: &Registry) -> Result<TypeDescriptor> {
        ObjectBuilder::<Team>::new("Team")
            .with_default()
            .property::<Option<Rc<Person>>>("lead", |t| &t.lead, |t, v| t.lead = v)
            .property::<Vec<Rc<Person>>>("members", |t| &t.members, |t, v| t.members = v)
            .build()
    }
}

#[derive(Debug, Default, PartialEq)]
struct Circle {
    radius: f64,
}

#[derive(Debug, Default, PartialEq)]
struct Square {
    side: f64,
}

#[derive(Debug, PartialEq)]
enum Shape {
    Circle(Circle),
    Square(Square),
}

impl Describe for Circle {
    fn describe(_: &Registry) -> Result<TypeDescriptor> {
        ObjectBuilder::<Circle>::new("Circle")
            .with_default()
            .property::<f64>("radius", |c| &c.radius, |c, v| c.radius = v)
            .build()
    }
}

impl Describe for Square {
    fn describe(_: &Registry) -> Result<TypeDescriptor> {
        ObjectBuilder::<Square>::new("Square")
            .with_default()
            .property::<f64>("side", |s| &s.side, |s, v| s.side = v)
            .build()
    }
}

impl Describe for Shape {
    fn describe(_: &Registry) -> Result<TypeDescriptor> {
        ObjectBuilder::<Shape>::new("Shape")
            .derived::<Circle>("circle", Shape::Circle, |s| match s {
                Shape::Circle(c) => Some(c),
                _ => None,
            })
            .derived::<Square>("square", Shape::Square, |s| match s {
                Shape::Square(q) => Some(q),
                _ => None,
            })
            .build()
    }
}

fn preserve() -> ConvertOptions {
    ConvertOptions::new().with_reference_handling(ReferenceHandling::Preserve)
}

fn sample_team() -> Team {
    let ann = Rc::new(Person { name: "Ann".to_string() });
    let bob = Rc::new(Person { name: "Bob".to_string() });
    Team {
        lead: Some(ann.clone()),
        members: vec![ann, bob],
    }
}

#[test]
fn test_shared_instances_are_written_once() {
    let json = to_string_with_options(&sample_team(), &preserve()).unwrap();
    assert_eq!(
        json,
        r#"{"lead":{"$id":"1","name":"Ann"},"members":[{"$ref":"1"},{"$id":"2","name":"Bob"}]}"#
    );
}

#[test]
fn test_references_restore_identity() {
    let json = to_string_with_options(&sample_team(), &preserve()).unwrap();
    for team in [
        from_slice_with_options::<Team>(json.as_bytes(), &preserve()).unwrap(),
        {
            let mut stream = StreamDeserializer::<Team>::new(preserve()).unwrap();
            for byte in json.as_bytes() {
                stream.feed(std::slice::from_ref(byte)).unwrap();
            }
            stream.finish().unwrap()
        },
    ] {
        let lead = team.lead.as_ref().unwrap();
        assert!(Rc::ptr_eq(lead, &team.members[0]));
        assert!(!Rc::ptr_eq(lead, &team.members[1]));
        assert_eq!(team.members[1].name, "Bob");
    }
}

#[test]
fn test_without_preservation_values_are_duplicated() {
    let json = to_string(&sample_team()).unwrap();
    assert_eq!(
        json,
        r#"{"lead":{"name":"Ann"},"members":[{"name":"Ann"},{"name":"Bob"}]}"#
    );
    let team: Team = from_str(&json).unwrap();
    assert!(!Rc::ptr_eq(team.lead.as_ref().unwrap(), &team.members[0]));
}

#[test]
fn test_dangling_and_duplicate_ids() {
    let err = from_slice_with_options::<Team>(br#"{"lead": {"$ref": "9"}}"#, &preserve()).unwrap_err();
    assert!(matches!(err.inner(), Error::ReferenceNotFound(id) if id == "9"));
    assert_eq!(err.path(), Some("$.lead"));

    let input = br#"{"members": [{"$id": "1", "name": "A"}, {"$id": "1", "name": "B"}]}"#;
    let err = from_slice_with_options::<Team>(input, &preserve()).unwrap_err();
    assert!(matches!(err.inner(), Error::DuplicateReferenceId(_)));
}

#[test]
fn test_reference_must_stand_alone() {
    let input = br#"{"lead": {"$id": "1", "name": "A"}, "members": [{"$ref": "1", "name": "B"}]}"#;
    let err = from_slice_with_options::<Team>(input, &preserve()).unwrap_err();
    assert!(matches!(err.inner(), Error::UnexpectedMetadata { .. }));
}

#[test]
fn test_metadata_names_are_ordinary_without_preservation() {
    let person: Person = from_str(r#"{"$id": "1", "name": "Cy"}"#).unwrap();
    assert_eq!(person.name, "Cy");
}

#[test]
fn test_polymorphic_round_trip() {
    let shapes = vec![
        Shape::Circle(Circle { radius: 1.5 }),
        Shape::Square(Square { side: 2.0 }),
    ];
    let json = to_string(&shapes).unwrap();
    assert_eq!(
        json,
        r#"[{"$type":"circle","radius":1.5},{"$type":"square","side":2}]"#
    );
    let back: Vec<Shape> = from_str(&json).unwrap();
    assert_eq!(back, shapes);
}

#[test]
fn test_discriminator_errors() {
    let err = from_str::<Shape>(r#"{"$type": "hexagon"}"#).unwrap_err();
    assert!(matches!(err.inner(), Error::UnknownDiscriminator { .. }));

    let err = from_str::<Shape>(r#"{"radius": 1}"#).unwrap_err();
    assert!(err.to_string().contains("abstract"));
}

#[test]
fn test_late_metadata_is_rejected() {
    let err = from_slice_with_options::<Team>(br#"{"members": [], "$id": "1"}"#, &preserve()).unwrap_err();
    assert!(matches!(err.inner(), Error::UnexpectedMetadata { name, .. } if name == "$id"));
}
