//! Output Store Integration Tests

use assertflip::storage::OutputStore;
use tempfile::TempDir;

#[test]
fn test_save_twice_fails_second_time() {
    let dir = TempDir::new().unwrap();
    let store = OutputStore::new(dir.path().join("tests"), dir.path().join("results"), "af");

    let path = store.save_test("astropy-1", "def test_a(): pass").unwrap();
    assert!(path.ends_with("test_af_astropy-1.py"));

    let err = store.save_test("astropy-1", "def test_b(): pass").unwrap_err();
    assert!(err.is_already_exists());
    assert_eq!(std::fs::read_to_string(path).unwrap(), "def test_a(): pass");
}

#[test]
fn test_disabled_twin_blocks_save() {
    let dir = TempDir::new().unwrap();
    let store = OutputStore::new(dir.path(), dir.path().join("results"), "af");
    std::fs::write(dir.path().join("disabled_test_af_x.py"), "").unwrap();

    let err = store.save_test("x", "def test_x(): pass").unwrap_err();
    assert!(err.is_already_exists());
    assert!(!store.test_path("x").exists());
}
