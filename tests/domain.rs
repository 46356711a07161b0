use assert_matches::assert_matches;

use typing_refs::domain::{DatasetName, Organism, builtin_scheme_alias};
use typing_refs::error::RefsError;

#[test]
fn parse_dataset_names() {
    assert_eq!("rMLST".parse::<DatasetName>().unwrap(), DatasetName::Rmlst);
    assert_matches!(
        "Listeria".parse::<DatasetName>().unwrap(),
        DatasetName::Organism(_)
    );
    assert_matches!(
        "".parse::<DatasetName>(),
        Err(RefsError::InvalidDatasetName(_))
    );
    assert_matches!(
        "Escherichia/coli".parse::<DatasetName>(),
        Err(RefsError::InvalidDatasetName(_))
    );
}

#[test]
fn shigella_and_escherichia_are_one_dataset() {
    let shigella: DatasetName = "Shigella".parse().unwrap();
    let escherichia: DatasetName = "Escherichia".parse().unwrap();
    let listeria: DatasetName = "Listeria".parse().unwrap();
    assert!(shigella.same_dataset(&escherichia));
    assert!(!shigella.same_dataset(&listeria));
    assert!(!DatasetName::Rmlst.same_dataset(&listeria));
}

#[test]
fn builtin_aliases() {
    let campylobacter: Organism = "Campylobacter".parse().unwrap();
    let unknown: Organism = "Staphylococcus".parse().unwrap();
    assert_eq!(builtin_scheme_alias(&campylobacter), Some("Campylobacter jejuni"));
    assert_eq!(builtin_scheme_alias(&unknown), None);
}
