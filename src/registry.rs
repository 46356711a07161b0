use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};

use crate::domain::{DatasetName, Organism, builtin_scheme_alias};
use crate::error::RefsError;
use crate::store::Store;

/// Persisted set of tracked datasets and their scheme aliases. The updater
/// only reads it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateSetRegistry {
    #[serde(default)]
    pub organism_to_scheme_alias: BTreeMap<String, String>,
    #[serde(default)]
    pub datasets_to_update: BTreeSet<String>,
}

impl UpdateSetRegistry {
    /// A missing file is an empty registry; a malformed one is fatal.
    pub fn load(path: &Utf8Path) -> Result<Self, RefsError> {
        let content = match fs::read_to_string(path.as_std_path()) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(_) => return Err(RefsError::ConfigRead(path.to_path_buf().into_std_path_buf())),
        };
        let registry: Self = serde_json::from_str(&content)
            .map_err(|err| RefsError::ConfigParse(format!("{path}: {err}")))?;
        registry.tracked()?;
        Ok(registry)
    }

    pub fn save(&self, path: &Utf8Path) -> Result<(), RefsError> {
        let content = serde_json::to_vec_pretty(self)
            .map_err(|err| RefsError::Filesystem(err.to_string()))?;
        Store::write_bytes_atomic(path, &content)
    }

    pub fn tracked(&self) -> Result<Vec<DatasetName>, RefsError> {
        self.datasets_to_update
            .iter()
            .map(|name| {
                name.parse::<DatasetName>()
                    .map_err(|_| RefsError::ConfigParse(format!("invalid dataset in registry: {name}")))
            })
            .collect()
    }

    /// Registry entry first, then the dataset organism's entry, then the
    /// built-in table, then the organism name itself.
    pub fn scheme_alias(&self, organism: &Organism) -> String {
        let dataset_organism = organism.dataset_organism();
        self.organism_to_scheme_alias
            .get(organism.as_str())
            .or_else(|| self.organism_to_scheme_alias.get(dataset_organism.as_str()))
            .cloned()
            .or_else(|| builtin_scheme_alias(organism).map(str::to_string))
            .unwrap_or_else(|| organism.as_str().to_string())
    }

    pub fn track(&mut self, name: &DatasetName, alias: Option<String>) {
        self.datasets_to_update.insert(name.to_string());
        if let (DatasetName::Organism(organism), Some(alias)) = (name, alias) {
            self.organism_to_scheme_alias
                .insert(organism.as_str().to_string(), alias);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alias_falls_back_through_builtin_table() {
        let mut registry = UpdateSetRegistry::default();
        let listeria: Organism = "Listeria".parse().unwrap();
        let salmonella: Organism = "Salmonella".parse().unwrap();
        assert_eq!(registry.scheme_alias(&listeria), "Listeria monocytogenes");
        assert_eq!(registry.scheme_alias(&salmonella), "Salmonella");

        registry.track(
            &DatasetName::Organism(salmonella.clone()),
            Some("Salmonella enterica".to_string()),
        );
        assert_eq!(registry.scheme_alias(&salmonella), "Salmonella enterica");
        assert!(registry.datasets_to_update.contains("Salmonella"));
    }
}
