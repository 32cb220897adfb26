use pretty_assertions::assert_eq;
use sk_core::Value;
use sk_variables::{Change, GlobalVariables, VariableError, VariableName};
use std::time::Duration;

fn name(raw: &str) -> VariableName {
    VariableName::parse(raw).unwrap()
}

#[test]
fn test_save_and_load_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data").join("variables.json");

    let globals = GlobalVariables::new();
    globals.set(&name("greeting"), Value::from("hello")).unwrap();
    globals
        .set(&name("cooldown"), Value::from(Duration::from_secs(90)))
        .unwrap();
    globals
        .change(
            &name("scores::*"),
            &Change::Set(vec![Value::from(3.0), Value::from(1.0)]),
        )
        .unwrap();
    globals.save(&path).unwrap();

    let loaded = GlobalVariables::load(&path).unwrap();
    assert_eq!(loaded.snapshot(), globals.snapshot());
    assert_eq!(
        loaded.read(&name("scores::*")),
        vec![Value::from(3.0), Value::from(1.0)]
    );
    assert_eq!(
        loaded.get(&name("cooldown")),
        Some(Value::Timespan(Duration::from_secs(90)))
    );
}

#[test]
fn test_load_missing_file_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let loaded = GlobalVariables::load(&dir.path().join("missing.json")).unwrap();
    assert!(loaded.is_empty());
}

#[test]
fn test_load_corrupt_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("variables.json");
    std::fs::write(&path, "{ not json").unwrap();
    assert!(matches!(
        GlobalVariables::load(&path),
        Err(VariableError::Serialization { .. })
    ));
}

#[test]
fn test_empty_variables_are_not_saved() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("variables.json");

    let globals = GlobalVariables::new();
    globals.set(&name("temp"), Value::from(1.0)).unwrap();
    globals.change(&name("temp"), &Change::Delete).unwrap();
    globals.save(&path).unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    assert_eq!(content.trim(), "{}");
}
