use std::fs;
use harvester_engine::{ensure_output_dir, AtomicFileWriter};
use tempfile::TempDir;

#[test]
fn creates_missing_output_dir() {
    let temp = TempDir::new().unwrap();
    let new_dir = temp.path().join("out");
    assert!(!new_dir.exists());
    ensure_output_dir(&new_dir).unwrap();
    assert!(new_dir.is_dir());
}

#[test]
fn atomic_write_creates_parent_and_replaces_existing() {
    let temp = TempDir::new().unwrap();
    let target = temp.path().join("nested").join("events.csv");
    let writer = AtomicFileWriter::new(target.clone());

    let first = writer.write(b"first").unwrap();
    assert_eq!(first, target);
    assert_eq!(fs::read_to_string(&first).unwrap(), "first");

    let second = writer.write(b"second").unwrap();
    assert_eq!(first, second);
    assert_eq!(fs::read_to_string(&second).unwrap(), "second");

    let leftovers: Vec<_> = fs::read_dir(temp.path().join("nested"))
        .unwrap()
        .filter_map(|entry| entry.ok())
        .collect();
    assert_eq!(leftovers.len(), 1);
}

#[test]
fn no_partial_file_when_parent_is_a_file() {
    let temp = TempDir::new().unwrap();
    let file_path = temp.path().join("not_a_dir");
    fs::write(&file_path, "x").unwrap();

    let writer = AtomicFileWriter::new(file_path.join("events.csv"));
    let result = writer.write(b"data");
    assert!(result.is_err());
    assert_eq!(fs::read_to_string(&file_path).unwrap(), "x");
}
