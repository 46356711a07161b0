use std::fs;

use camino::Utf8PathBuf;

use typing_refs::integrity::{DEFAULT_MIN_FOLDER_BYTES, is_valid, is_valid_content};

fn temp_root() -> (tempfile::TempDir, Utf8PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    (temp, root)
}

#[test]
fn folder_validity_uses_byte_threshold() {
    let (_temp, root) = temp_root();
    fs::write(root.join("a"), vec![0u8; 99]).unwrap();
    assert!(!is_valid(&root, DEFAULT_MIN_FOLDER_BYTES));
    fs::write(root.join("b"), vec![0u8; 1]).unwrap();
    assert!(is_valid(&root, DEFAULT_MIN_FOLDER_BYTES));
    assert!(!is_valid(&root.join("missing"), DEFAULT_MIN_FOLDER_BYTES));
}

#[test]
fn markup_payload_fails_content_check() {
    let (_temp, root) = temp_root();
    let error_page = root.join("error.txt");
    fs::write(&error_page, "<?xml version=\"1.0\"?>\n<error>unknown scheme</error>\n").unwrap();
    let profile = root.join("profile.txt");
    fs::write(&profile, "ST\tadk\tfumC\n1\t1\t1\n").unwrap();
    let empty = root.join("empty.txt");
    fs::write(&empty, "").unwrap();

    assert!(!is_valid_content(&error_page));
    assert!(is_valid_content(&profile));
    assert!(!is_valid_content(&empty));
    assert!(!is_valid_content(&root.join("missing.txt")));
}
