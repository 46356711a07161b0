use std::fs;

use camino::Utf8PathBuf;

use typing_refs::fasta::{FastaReader, RMLST_COMBINED, merge_allele_files};

fn temp_root() -> (tempfile::TempDir, Utf8PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    (temp, root)
}

#[test]
fn merge_normalizes_ids_and_sequences() {
    let (_temp, root) = temp_root();
    fs::write(root.join("BACT000002.tfa"), ">BACT000002_1 allele one\nTTTT\n").unwrap();
    fs::write(root.join("BACT000001.tfa"), ">abc-1 a description\nAC-GTN\n").unwrap();

    let summary = merge_allele_files(&root, RMLST_COMBINED).unwrap();
    assert_eq!(summary.records, 2);
    assert_eq!(summary.output, Some(root.join(RMLST_COMBINED)));

    let merged = fs::read_to_string(root.join(RMLST_COMBINED)).unwrap();
    assert_eq!(merged, ">abc_1\nACGT\n>BACT000002_1\nTTTT\n");

    let records = FastaReader::new(merged.as_bytes())
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert_eq!(records[0].id, "abc_1");
    assert_eq!(records[0].sequence, "ACGT");
    assert!(records[0].description.is_empty());
}

#[test]
fn merge_ignores_other_files_and_empty_folders() {
    let (_temp, root) = temp_root();
    let summary = merge_allele_files(&root, RMLST_COMBINED).unwrap();
    assert_eq!(summary.output, None);
    assert!(!root.join(RMLST_COMBINED).as_std_path().exists());

    fs::write(root.join("profiles.txt"), "rST\tBACT000001\n").unwrap();
    fs::write(root.join("a.tfa"), ">x\nA\n").unwrap();
    let summary = merge_allele_files(&root, RMLST_COMBINED).unwrap();
    assert_eq!(summary.inputs, vec![root.join("a.tfa")]);
    assert_eq!(summary.records, 1);
}
