use pioneer_link::memento::*;

const MODES: &[&str] = &["hold", "track", "survey"];

#[derive(Debug, Default, Clone, PartialEq)]
struct Profile {
    a: i64,
    b: String,
    gain: f64,
    enabled: bool,
    mode: usize,
}

fn profile_table() -> MementoTable<Profile> {
    let mut table = MementoTable::<Profile>::new();
    table
        .add("a", Accessor::integer(-10, 10, |p: &Profile| p.a, |p: &mut Profile, v| p.a = v))
        .unwrap()
        .default_value("1");
    table
        .add("b", Accessor::text(|p: &Profile| p.b.clone(), |p: &mut Profile, v| p.b = v))
        .unwrap()
        .default_value("none");
    table
        .add("gain", Accessor::float(|p: &Profile| p.gain, |p: &mut Profile, v| p.gain = v))
        .unwrap();
    table
        .add("enabled", Accessor::boolean(|p: &Profile| p.enabled, |p: &mut Profile, v| p.enabled = v))
        .unwrap();
    table
        .add("mode", Accessor::enumerated(MODES, |p: &Profile| p.mode, |p: &mut Profile, v| p.mode = v))
        .unwrap();
    table
}

#[test]
fn test_fill_write_fill_round_trip() {
    let mut first = profile_table();
    let mut source = Profile::default();
    let report = first.fill(&mut source, "a=5,b=hello");
    assert!(report.is_clean());
    assert_eq!(report.applied, 2);

    let tuples = first.write_tuples();
    assert_eq!(tuples, "a=5,b=hello");

    // A fresh table and target decode the same values
    let mut second = profile_table();
    let mut restored = Profile::default();
    assert!(second.fill(&mut restored, &tuples).is_clean());
    assert_eq!(restored.a, 5);
    assert_eq!(restored.b, "hello");
}

#[test]
fn test_duplicate_and_invalid_names_rejected() {
    let mut table = profile_table();
    let err = table
        .add("a", Accessor::integer(0, 1, |p: &Profile| p.a, |p: &mut Profile, v| p.a = v))
        .unwrap_err();
    assert_eq!(err, MementoError::DuplicateName("a".to_string()));

    for name in ["", "x=y", "x,y", " padded", "a_name_that_is_far_too_long_for_the_table"] {
        let result = table.add(name, Accessor::integer(0, 1, |p: &Profile| p.a, |p: &mut Profile, v| p.a = v));
        assert!(matches!(result, Err(MementoError::InvalidName(_))), "name {:?}", name);
    }

    // Failed adds leave the table untouched
    assert_eq!(table.len(), 5);
}

#[test]
fn test_names_keep_insertion_order() {
    let table = profile_table();
    let names: Vec<&str> = table.names().collect();
    assert_eq!(names, vec!["a", "b", "gain", "enabled", "mode"]);
}

#[test]
fn test_fill_is_best_effort() {
    let mut table = profile_table();
    let mut profile = Profile::default();

    let report = table.fill(&mut profile, "a=3,nope=1,gain=abc,enabled=yes,mode=track,junk");

    assert_eq!(report.applied, 2);
    assert_eq!(report.failures.len(), 4);
    assert!(report.failures.contains(&MementoError::UnknownName("nope".to_string())));
    assert!(report.failures.contains(&MementoError::MalformedTuple("junk".to_string())));
    assert!(report
        .failures
        .iter()
        .any(|e| matches!(e, MementoError::BadValue { name, .. } if name == "gain")));
    assert!(report
        .failures
        .iter()
        .any(|e| matches!(e, MementoError::BadValue { name, .. } if name == "enabled")));

    // Good entries landed, bad ones left the target alone
    assert_eq!(profile.a, 3);
    assert_eq!(profile.mode, 1);
    assert_eq!(profile.gain, 0.0);
    assert!(!profile.enabled);
}

#[test]
fn test_integer_bounds_enforced() {
    let mut table = profile_table();
    let mut profile = Profile::default();

    let report = table.fill(&mut profile, "a=11");
    assert_eq!(
        report.failures,
        vec![MementoError::OutOfRange {
            name: "a".to_string(),
            value: 11,
            min: -10,
            max: 10,
        }]
    );
    assert_eq!(profile.a, 0);

    assert!(table.fill(&mut profile, "a=-10").is_clean());
    assert_eq!(profile.a, -10);
}

#[test]
fn test_value_kinds_canonical_text() {
    let mut table = profile_table();
    let mut profile = Profile::default();

    let report = table.fill(&mut profile, "a= 7 ,gain=0.25,enabled=1,mode=survey");
    assert!(report.is_clean());

    assert_eq!(table.get("a").unwrap().value_text(), Some("7"));
    assert_eq!(table.get("gain").unwrap().value_text(), Some("0.25"));
    assert_eq!(table.get("enabled").unwrap().value_text(), Some("true"));
    assert_eq!(table.get("mode").unwrap().value_text(), Some("survey"));
    assert_eq!(table.get("mode").unwrap().kind(), ValueKind::Enumerated);

    // Non-finite floats are rejected
    assert!(!table.fill(&mut profile, "gain=inf").is_clean());
    assert_eq!(profile.gain, 0.25);
}

#[test]
fn test_write_skips_unknown_values() {
    let mut table = profile_table();
    assert_eq!(table.write_tuples(), "");

    let mut profile = Profile::default();
    table.fill(&mut profile, "enabled=false");
    assert_eq!(table.write_tuples(), "enabled=false");
}

#[test]
fn test_set_defaults_applies_declared_defaults() {
    let mut table = profile_table();
    let mut profile = Profile::default();

    let report = table.set_defaults(&mut profile);
    assert!(report.is_clean());
    assert_eq!(report.applied, 2);
    assert_eq!(profile.a, 1);
    assert_eq!(profile.b, "none");
    assert_eq!(table.write_tuples(), "a=1,b=none");
}

#[test]
fn test_uncast_all_tracks_external_changes() {
    let mut table = profile_table();
    let profile = Profile {
        a: -4,
        b: "deep".to_string(),
        gain: 1.5,
        enabled: true,
        mode: 2,
    };

    table.uncast_all(&profile);
    assert_eq!(table.write_tuples(), "a=-4,b=deep,gain=1.5,enabled=true,mode=survey");
}

#[test]
fn test_separators_in_text_round_trip() {
    let mut table = profile_table();
    let profile = Profile {
        b: r"x=1,y\2".to_string(),
        ..Profile::default()
    };
    table.uncast_all(&profile);

    let tuples = table.write_tuples();
    assert!(tuples.contains(r"b=x\=1\,y\\2"));

    let mut restored = Profile::default();
    let mut fresh = profile_table();
    assert!(fresh.fill(&mut restored, &tuples).is_clean());
    assert_eq!(restored, profile);
}

#[test]
fn test_table_capacity() {
    let mut table = MementoTable::<Profile>::new();
    for i in 0..MAX_MEMENTO_BINDINGS {
        table
            .add(&format!("p{}", i), Accessor::integer(0, 1, |p: &Profile| p.a, |p: &mut Profile, v| p.a = v))
            .unwrap();
    }
    let result = table.add("overflow", Accessor::integer(0, 1, |p: &Profile| p.a, |p: &mut Profile, v| p.a = v));
    assert_eq!(result.unwrap_err(), MementoError::TableFull);
}
