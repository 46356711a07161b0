use std::fmt;
use std::str::FromStr;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::error::RefsError;

pub const RMLST_NAME: &str = "rMLST";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetKind {
    Rmlst,
    Mlst,
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatasetKind::Rmlst => write!(f, "rMLST"),
            DatasetKind::Mlst => write!(f, "MLST"),
        }
    }
}

/// A genus name as used for MLST folder names and registry keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Organism(String);

impl Organism {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The organism whose dataset is shared with this one. Shigella is typed
    /// with the Escherichia scheme.
    pub fn dataset_organism(&self) -> Organism {
        if self.0 == "Shigella" {
            Organism("Escherichia".to_string())
        } else {
            self.clone()
        }
    }
}

impl fmt::Display for Organism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Organism {
    type Err = RefsError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim();
        let is_valid = !normalized.is_empty()
            && !normalized.starts_with('.')
            && normalized
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '.'));
        if !is_valid || normalized.eq_ignore_ascii_case(RMLST_NAME) {
            return Err(RefsError::InvalidDatasetName(value.to_string()));
        }
        Ok(Self(normalized.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DatasetName {
    Rmlst,
    Organism(Organism),
}

impl DatasetName {
    /// Two names select the same dataset when they resolve to the same folder.
    pub fn same_dataset(&self, other: &DatasetName) -> bool {
        match (self, other) {
            (DatasetName::Rmlst, DatasetName::Rmlst) => true,
            (DatasetName::Organism(a), DatasetName::Organism(b)) => {
                a.dataset_organism() == b.dataset_organism()
            }
            _ => false,
        }
    }
}

impl fmt::Display for DatasetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatasetName::Rmlst => write!(f, "{RMLST_NAME}"),
            DatasetName::Organism(organism) => write!(f, "{organism}"),
        }
    }
}

impl FromStr for DatasetName {
    type Err = RefsError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.trim().eq_ignore_ascii_case(RMLST_NAME) {
            return Ok(DatasetName::Rmlst);
        }
        Ok(DatasetName::Organism(value.parse()?))
    }
}

/// Scheme aliases used when an organism has several schemes at the remote
/// authority or is published under its full species name.
pub fn builtin_scheme_alias(organism: &Organism) -> Option<&'static str> {
    match organism.as_str() {
        "Escherichia" | "Shigella" => Some("Escherichia coli#1"),
        "Vibrio" => Some("Vibrio parahaemolyticus"),
        "Campylobacter" => Some("Campylobacter jejuni"),
        "Listeria" => Some("Listeria monocytogenes"),
        "Bacillus" => Some("Bacillus cereus"),
        "Klebsiella" => Some("Klebsiella pneumoniae"),
        _ => None,
    }
}

/// One tracked reference collection. Built once per run and not changed
/// while the updater works on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataset {
    pub kind: DatasetKind,
    pub name: String,
    pub root_path: Utf8PathBuf,
    pub scheme_alias: String,
    pub update_requested: bool,
}

impl Dataset {
    pub fn rmlst(root_path: Utf8PathBuf, update_requested: bool) -> Self {
        Self {
            kind: DatasetKind::Rmlst,
            name: RMLST_NAME.to_string(),
            root_path,
            scheme_alias: RMLST_NAME.to_string(),
            update_requested,
        }
    }

    pub fn mlst(
        organism: &Organism,
        root_path: Utf8PathBuf,
        scheme_alias: String,
        update_requested: bool,
    ) -> Self {
        Self {
            kind: DatasetKind::Mlst,
            name: organism.as_str().to_string(),
            root_path,
            scheme_alias,
            update_requested,
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn shigella_shares_escherichia_dataset() {
        let shigella: Organism = "Shigella".parse().unwrap();
        assert_eq!(shigella.dataset_organism().as_str(), "Escherichia");
        assert_eq!(builtin_scheme_alias(&shigella), Some("Escherichia coli#1"));
    }

    #[test]
    fn rejects_path_like_organism() {
        let err = "../etc".parse::<Organism>().unwrap_err();
        assert_matches!(err, RefsError::InvalidDatasetName(_));
    }

    #[test]
    fn rmlst_name_is_case_insensitive() {
        let name: DatasetName = "rmlst".parse().unwrap();
        assert_eq!(name, DatasetName::Rmlst);
    }
}
