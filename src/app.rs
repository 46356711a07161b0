use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use chrono::NaiveDate;
use serde::Serialize;

use crate::config::Settings;
use crate::domain::{Dataset, DatasetKind, DatasetName};
use crate::error::RefsError;
use crate::integrity;
use crate::pubmlst::{SchemeClient, SchemeRequest};
use crate::registry::UpdateSetRegistry;
use crate::rmlst::RmlstClient;
use crate::staleness::{self, Freshness};
use crate::store::{StagedFolder, Store, VersionFolder};

/// The folder a dataset resolves to after a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "path", rename_all = "snake_case")]
pub enum Selection {
    Folder(Utf8PathBuf),
    NoDataAvailable,
}

impl Selection {
    pub fn path(&self) -> Option<&Utf8PathBuf> {
        match self {
            Selection::Folder(path) => Some(path),
            Selection::NoDataAvailable => None,
        }
    }

    fn from_folder(folder: Option<VersionFolder>) -> Self {
        folder
            .map(|folder| Selection::Folder(folder.path))
            .unwrap_or(Selection::NoDataAvailable)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// No update requested; the latest valid folder is used as is.
    Cached,
    UpToDate,
    Committed,
    RolledBack,
    /// The dataset's cycle hit an error; the selection is the fallback.
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetReport {
    pub dataset: String,
    pub kind: DatasetKind,
    pub outcome: Outcome,
    pub selection: Selection,
    pub age_days: Option<i64>,
    pub command: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateReport {
    pub today: NaiveDate,
    pub items: Vec<DatasetReport>,
}

impl UpdateReport {
    pub fn failures(&self) -> usize {
        self.items
            .iter()
            .filter(|item| item.outcome == Outcome::Failed)
            .count()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetStatus {
    pub dataset: String,
    pub kind: DatasetKind,
    pub root_path: Utf8PathBuf,
    pub versions: usize,
    pub latest: Option<VersionFolder>,
    pub latest_valid: bool,
    pub freshness: Freshness,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub dataset: String,
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// Which datasets a run may fetch for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum UpdateSelection {
    #[default]
    None,
    All,
    Only(Vec<DatasetName>),
}

impl UpdateSelection {
    pub fn requests(&self, name: &DatasetName) -> bool {
        match self {
            UpdateSelection::None => false,
            UpdateSelection::All => true,
            UpdateSelection::Only(names) => names.iter().any(|item| item.same_dataset(name)),
        }
    }
}

/// Datasets in scope for a run: rMLST, the registry's tracked set and any
/// extra names, one entry per dataset folder.
pub fn plan_datasets(
    store: &Store,
    registry: &UpdateSetRegistry,
    extra: &[DatasetName],
    updates: &UpdateSelection,
) -> Result<Vec<Dataset>, RefsError> {
    let mut names = vec![DatasetName::Rmlst];
    let listed: &[DatasetName] = match updates {
        UpdateSelection::Only(only) => only,
        _ => &[],
    };
    for name in registry
        .tracked()?
        .into_iter()
        .chain(extra.iter().cloned())
        .chain(listed.iter().cloned())
    {
        if !names.iter().any(|known| known.same_dataset(&name)) {
            names.push(name);
        }
    }

    Ok(names
        .iter()
        .map(|name| match name {
            DatasetName::Rmlst => Dataset::rmlst(store.rmlst_dir(), updates.requests(name)),
            DatasetName::Organism(organism) => Dataset::mlst(
                &organism.dataset_organism(),
                store.mlst_dir(organism),
                registry.scheme_alias(organism),
                updates.requests(name),
            ),
        })
        .collect())
}

/// Read-only view of each dataset's newest folder. Never fetches.
pub fn inspect(
    datasets: &[Dataset],
    settings: &Settings,
    today: NaiveDate,
) -> Result<Vec<DatasetStatus>, RefsError> {
    datasets
        .iter()
        .map(|dataset| {
            let folders = Store::list_version_folders(&dataset.root_path, dataset.kind)?;
            let latest = folders.first().cloned();
            let freshness = staleness::evaluate(
                latest.as_ref().and_then(|folder| folder.date),
                today,
                settings.staleness_days,
            );
            Ok(DatasetStatus {
                dataset: dataset.name.clone(),
                kind: dataset.kind,
                root_path: dataset.root_path.clone(),
                versions: folders.len(),
                latest_valid: latest
                    .as_ref()
                    .map(|folder| folder.is_valid(settings.min_folder_bytes))
                    .unwrap_or(false),
                latest,
                freshness,
            })
        })
        .collect()
}

#[derive(Clone)]
pub struct App<R: RmlstClient, S: SchemeClient> {
    settings: Settings,
    rmlst: R,
    schemes: S,
}

impl<R: RmlstClient, S: SchemeClient> App<R, S> {
    pub fn new(settings: Settings, rmlst: R, schemes: S) -> Self {
        Self {
            settings,
            rmlst,
            schemes,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Runs every dataset in order. A failure in one dataset is logged and
    /// reported; the rest still run.
    pub fn update_all(
        &self,
        datasets: &[Dataset],
        today: NaiveDate,
        sink: &dyn ProgressSink,
    ) -> UpdateReport {
        let items = datasets
            .iter()
            .map(|dataset| match self.update_dataset(dataset, today, sink) {
                Ok(report) => report,
                Err(err) => {
                    tracing::error!(dataset = %dataset.name, error = %err, "dataset update failed");
                    let selection = self
                        .fallback(dataset)
                        .unwrap_or(Selection::NoDataAvailable);
                    DatasetReport {
                        dataset: dataset.name.clone(),
                        kind: dataset.kind,
                        outcome: Outcome::Failed,
                        selection,
                        age_days: None,
                        command: None,
                        message: Some(err.to_string()),
                    }
                }
            })
            .collect();
        UpdateReport { today, items }
    }

    pub fn update_dataset(
        &self,
        dataset: &Dataset,
        today: NaiveDate,
        sink: &dyn ProgressSink,
    ) -> Result<DatasetReport, RefsError> {
        let min_bytes = self.settings.min_folder_bytes;
        let root = &dataset.root_path;

        let swept = Store::sweep_staging(root)?;
        if swept > 0 {
            tracing::warn!(dataset = %dataset.name, swept, "removed staging folders from an interrupted run");
        }

        emit(sink, dataset, "phase=Inspect; locating current folder", None);
        let current = Store::find_latest_folder(root, dataset.kind)?;
        let freshness = staleness::evaluate(
            current.as_ref().and_then(|folder| folder.date),
            today,
            self.settings.staleness_days,
        );
        let report = |outcome: Outcome,
                      selection: Selection,
                      command: Option<String>,
                      message: Option<String>| DatasetReport {
            dataset: dataset.name.clone(),
            kind: dataset.kind,
            outcome,
            selection,
            age_days: current.as_ref().map(|_| freshness.age_days),
            command,
            message,
        };

        if !dataset.update_requested {
            let selection = self.fallback(dataset)?;
            return Ok(report(Outcome::Cached, selection, None, None));
        }

        if let Some(folder) = current
            .as_ref()
            .filter(|folder| !freshness.stale && folder.is_valid(min_bytes))
        {
            tracing::info!(
                dataset = %dataset.name,
                age_days = freshness.age_days,
                path = %folder.path,
                "dataset is up to date"
            );
            let selection = Selection::Folder(folder.path.clone());
            return Ok(report(Outcome::UpToDate, selection, None, None));
        }

        match &current {
            Some(folder) => tracing::info!(
                dataset = %dataset.name,
                age_days = freshness.age_days,
                bytes = folder.total_bytes,
                "last update was {} days ago, updating",
                freshness.age_days
            ),
            None => tracing::info!(dataset = %dataset.name, "no cached copy, downloading"),
        }

        let staged = Store::stage_folder(root, today)?;
        emit(sink, dataset, "phase=Fetch; running download", None);
        let start = Instant::now();
        let command = self.fetch_into(dataset, &staged);
        emit(sink, dataset, "phase=Fetch; download returned", Some(start.elapsed()));

        emit(sink, dataset, "phase=Verify; validating folder", None);
        match self.validate(dataset, &staged) {
            Ok(bytes) => {
                let dest = root.join(today.to_string());
                let path = Store::commit_staged(staged, &dest)?;
                tracing::info!(dataset = %dataset.name, bytes, path = %path, "committed new version");
                Ok(report(
                    Outcome::Committed,
                    Selection::Folder(path),
                    command,
                    None,
                ))
            }
            Err(reason) => {
                tracing::warn!(dataset = %dataset.name, reason = %reason, "discarding fetched folder");
                if let Err(err) = staged.discard() {
                    tracing::warn!(dataset = %dataset.name, error = %err, "staging folder not removed");
                }
                let selection = self.fallback(dataset)?;
                match selection.path() {
                    Some(path) => {
                        tracing::info!(dataset = %dataset.name, path = %path, "rolled back to previous version")
                    }
                    None => tracing::warn!(dataset = %dataset.name, "no data available"),
                }
                Ok(report(Outcome::RolledBack, selection, command, Some(reason)))
            }
        }
    }

    /// Runs the adapter for the dataset's kind. Its result is only logged;
    /// the folder contents decide success.
    fn fetch_into(&self, dataset: &Dataset, staged: &StagedFolder) -> Option<String> {
        match dataset.kind {
            DatasetKind::Rmlst => {
                let command = self.rmlst.command_line(staged.path());
                if let Err(err) = self.rmlst.download(staged.path()) {
                    tracing::warn!(dataset = %dataset.name, error = %err, "rMLST download reported an error");
                }
                Some(command)
            }
            DatasetKind::Mlst => {
                let result = SchemeRequest::new(
                    &dataset.scheme_alias,
                    &self.settings.catalog_url,
                    staged.path(),
                    false,
                )
                .and_then(|request| self.schemes.download_scheme(&request));
                match result {
                    Ok(download) => tracing::debug!(
                        dataset = %dataset.name,
                        species = %download.species,
                        files = download.files.len(),
                        "scheme download finished"
                    ),
                    Err(err) => tracing::warn!(
                        dataset = %dataset.name,
                        error = %err,
                        "scheme download reported an error"
                    ),
                }
                None
            }
        }
    }

    fn validate(&self, dataset: &Dataset, staged: &StagedFolder) -> Result<u64, String> {
        let min_bytes = self.settings.min_folder_bytes;
        let bytes = Store::compute_folder_size(staged.path());
        if bytes < min_bytes {
            return Err(format!("fetched {bytes} bytes, expected at least {min_bytes}"));
        }
        if dataset.kind == DatasetKind::Mlst {
            let content_ok = integrity::find_profile_file(staged.path())
                .map(|profile| integrity::is_valid_content(&profile))
                .unwrap_or(false);
            if !content_ok {
                return Err("profile table is missing or holds an error document".to_string());
            }
        }
        Ok(bytes)
    }

    fn fallback(&self, dataset: &Dataset) -> Result<Selection, RefsError> {
        let folder = Store::find_latest_valid_folder(
            &dataset.root_path,
            dataset.kind,
            self.settings.min_folder_bytes,
        )?;
        Ok(Selection::from_folder(folder))
    }
}

fn emit(sink: &dyn ProgressSink, dataset: &Dataset, message: &str, elapsed: Option<Duration>) {
    sink.event(ProgressEvent {
        dataset: dataset.name.clone(),
        message: message.to_string(),
        elapsed,
    });
}
