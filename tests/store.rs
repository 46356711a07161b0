use std::fs;

use camino::Utf8PathBuf;

use typing_refs::domain::DatasetKind;
use typing_refs::store::Store;

fn temp_root() -> (tempfile::TempDir, Utf8PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    (temp, root)
}

#[test]
fn latest_folder_is_greatest_date() {
    let (_temp, root) = temp_root();
    for name in ["2021-01-01", "2021-03-05", "2020-12-31"] {
        fs::create_dir(root.join(name)).unwrap();
    }

    let latest = Store::find_latest_folder(&root, DatasetKind::Rmlst)
        .unwrap()
        .unwrap();
    assert_eq!(latest.name, "2021-03-05");
    assert_eq!(latest.path, root.join("2021-03-05"));
    assert_eq!(latest.date.map(|date| date.to_string()).as_deref(), Some("2021-03-05"));
}

#[test]
fn no_folders_means_not_found() {
    let (_temp, root) = temp_root();
    assert_eq!(Store::find_latest_folder(&root, DatasetKind::Mlst).unwrap(), None);
    let missing = root.join("does-not-exist");
    assert_eq!(Store::find_latest_folder(&missing, DatasetKind::Mlst).unwrap(), None);
}

#[test]
fn folder_size_counts_direct_files_only() {
    let (_temp, root) = temp_root();
    fs::write(root.join("a.tfa"), vec![0u8; 37]).unwrap();
    fs::write(root.join("b.txt"), vec![0u8; 63]).unwrap();
    fs::write(root.join("c"), vec![0u8; 5]).unwrap();
    let nested = root.join("nested");
    fs::create_dir(&nested).unwrap();
    fs::write(nested.join("big.tfa"), vec![0u8; 10_000]).unwrap();

    assert_eq!(Store::compute_folder_size(&root), 105);
}

#[test]
fn folder_size_of_missing_path_is_zero() {
    let (_temp, root) = temp_root();
    assert_eq!(Store::compute_folder_size(&root.join("missing")), 0);
    fs::write(root.join("file"), b"abc").unwrap();
    assert_eq!(Store::compute_folder_size(&root.join("file")), 0);
}

#[test]
fn latest_valid_folder_skips_small_ones() {
    let (_temp, root) = temp_root();
    fs::create_dir(root.join("2021-01-01")).unwrap();
    fs::write(root.join("2021-01-01").join("p.txt"), vec![b'1'; 150]).unwrap();
    fs::create_dir(root.join("2021-02-01")).unwrap();
    fs::write(root.join("2021-02-01").join("p.txt"), vec![b'1'; 99]).unwrap();

    let valid = Store::find_latest_valid_folder(&root, DatasetKind::Rmlst, 100)
        .unwrap()
        .unwrap();
    assert_eq!(valid.name, "2021-01-01");
}

#[test]
fn staged_folder_is_hidden_until_committed() {
    let (_temp, root) = temp_root();
    let date = "2024-05-20".parse().unwrap();
    let staged = Store::stage_folder(&root, date).unwrap();
    fs::write(staged.path().join("p.txt"), vec![b'1'; 200]).unwrap();

    assert_eq!(Store::find_latest_folder(&root, DatasetKind::Mlst).unwrap(), None);

    let committed = Store::commit_staged(staged, &root.join("2024-05-20")).unwrap();
    let latest = Store::find_latest_folder(&root, DatasetKind::Mlst)
        .unwrap()
        .unwrap();
    assert_eq!(latest.path, committed);
    assert_eq!(latest.total_bytes, 200);
}

#[test]
fn discarded_staging_leaves_nothing_behind() {
    let (_temp, root) = temp_root();
    let staged = Store::stage_folder(&root, "2024-05-20".parse().unwrap()).unwrap();
    fs::write(staged.path().join("p.txt"), b"<error/>").unwrap();
    staged.discard().unwrap();
    assert_eq!(fs::read_dir(&root).unwrap().count(), 0);
}

#[test]
fn delete_folder_removes_contents() {
    let (_temp, root) = temp_root();
    let folder = root.join("2024-01-01");
    fs::create_dir_all(folder.join("inner")).unwrap();
    fs::write(folder.join("inner").join("x"), b"x").unwrap();

    Store::delete_folder(&folder).unwrap();
    assert!(!folder.as_std_path().exists());
}
