use checkin_client_instrumented::prelude::{TeamId, Token};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Failed to read catalog {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed catalog {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Catalog {path} has no entries")]
    Empty { path: PathBuf },
    #[error("Catalog {path} has more than one entry for `{label}`")]
    DuplicateLabel { path: PathBuf, label: String },
}

/// A user of the backend, as listed in a credentials file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CredentialRecord {
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub token: Option<Token>,
    #[serde(default)]
    pub user_id: Option<u64>,
    #[serde(default)]
    pub team_name: Option<String>,
}

impl CredentialRecord {
    /// The team this user creates, their own `team_name` or one derived from the username.
    pub fn team_name(&self) -> String {
        self.team_name
            .clone()
            .unwrap_or_else(|| format!("{}-team", self.username))
    }
}

/// A successful login, as written out after a login run.
///
/// A file of these is itself a credentials catalog, so later runs can act as these users.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoginResult {
    pub username: String,
    pub user_id: Option<u64>,
    pub token: Token,
}

/// A team, as listed in a teams file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TeamDescriptor {
    pub team_name: String,
    #[serde(default)]
    pub team_id: Option<TeamId>,
    #[serde(default)]
    pub member_target: Option<usize>,
}

fn load_entries<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, CatalogError> {
    let content = std::fs::read_to_string(path).map_err(|source| CatalogError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let entries: Vec<T> =
        serde_json::from_str(&content).map_err(|source| CatalogError::Malformed {
            path: path.to_path_buf(),
            source,
        })?;

    if entries.is_empty() {
        return Err(CatalogError::Empty {
            path: path.to_path_buf(),
        });
    }

    Ok(entries)
}

/// The users available to a run, loaded once and shared read-only by every worker.
///
/// Entries are addressed by their position in the file, or by username through the label table.
#[derive(Debug, Clone)]
pub struct CredentialCatalog {
    records: Vec<CredentialRecord>,
    by_label: HashMap<String, usize>,
}

impl CredentialCatalog {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        Self::from_records(load_entries(path)?, path)
    }

    fn from_records(records: Vec<CredentialRecord>, path: &Path) -> Result<Self, CatalogError> {
        let mut by_label = HashMap::with_capacity(records.len());
        for (index, record) in records.iter().enumerate() {
            if by_label.insert(record.username.clone(), index).is_some() {
                return Err(CatalogError::DuplicateLabel {
                    path: path.to_path_buf(),
                    label: record.username.clone(),
                });
            }
        }

        Ok(Self { records, by_label })
    }

    pub fn get(&self, index: usize) -> Option<&CredentialRecord> {
        self.records.get(index)
    }

    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.by_label.get(label).copied()
    }

    pub fn by_label(&self, label: &str) -> Option<&CredentialRecord> {
        self.index_of(label).and_then(|index| self.get(index))
    }

    /// Pick an entry uniformly at random, with replacement.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&CredentialRecord> {
        self.records.choose(rng)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CredentialRecord> {
        self.records.iter()
    }
}

#[derive(Debug, Clone)]
pub struct TeamCatalog {
    teams: Vec<TeamDescriptor>,
}

impl TeamCatalog {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        Ok(Self {
            teams: load_entries(path.as_ref())?,
        })
    }

    pub fn get(&self, index: usize) -> Option<&TeamDescriptor> {
        self.teams.get(index)
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&TeamDescriptor> {
        self.teams.choose(rng)
    }

    pub fn len(&self) -> usize {
        self.teams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.teams.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TeamDescriptor> {
        self.teams.iter()
    }
}
