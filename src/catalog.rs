use clap::ValueEnum;
use include_dir::{include_dir, Dir};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

static CATALOG_DIR: Dir = include_dir!("src/catalog");

const BUILTIN_CATALOG: &str = "default.json";

pub const MIN_OPTIONS: usize = 2;
pub const MAX_OPTIONS: usize = 4;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

/// Difficulty restriction chosen on the menu before a session starts
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    ValueEnum,
    strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
pub enum DifficultyFilter {
    #[default]
    All,
    Easy,
    Medium,
    Hard,
}

impl DifficultyFilter {
    pub const ALL: [DifficultyFilter; 4] = [
        DifficultyFilter::All,
        DifficultyFilter::Easy,
        DifficultyFilter::Medium,
        DifficultyFilter::Hard,
    ];

    pub fn matches(&self, difficulty: Difficulty) -> bool {
        match self {
            DifficultyFilter::All => true,
            DifficultyFilter::Easy => difficulty == Difficulty::Easy,
            DifficultyFilter::Medium => difficulty == Difficulty::Medium,
            DifficultyFilter::Hard => difficulty == Difficulty::Hard,
        }
    }

    pub fn next(self) -> Self {
        let idx = Self::ALL.iter().position(|f| *f == self).unwrap_or(0);
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }

    pub fn prev(self) -> Self {
        let idx = Self::ALL.iter().position(|f| *f == self).unwrap_or(0);
        Self::ALL[(idx + Self::ALL.len() - 1) % Self::ALL.len()]
    }
}

/// A single scenario with its options and time allowance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub id: u32,
    pub category: String,
    pub scenario: String,
    pub options: Vec<String>,
    /// seconds allotted to decide
    pub time_limit: u32,
    pub difficulty: Difficulty,
}

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to read catalog: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse catalog: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Built-in catalog '{0}' is missing")]
    Missing(String),

    #[error("Decision {id} has {count} options, expected 2 to 4")]
    OptionCount { id: u32, count: usize },

    #[error("Decision {id} lists option '{option}' more than once")]
    DuplicateOption { id: u32, option: String },

    #[error("Decision {0} has an empty option label")]
    EmptyOption(u32),

    #[error("Decision {0} has a zero time limit")]
    ZeroTimeLimit(u32),

    #[error("Decision id {0} is used more than once")]
    DuplicateId(u32),
}

/// Ordered, read-only collection of decisions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    pub name: String,
    pub decisions: Vec<Decision>,
}

impl Catalog {
    /// Load the catalog compiled into the binary
    pub fn builtin() -> Result<Self, CatalogError> {
        let file = CATALOG_DIR
            .get_file(BUILTIN_CATALOG)
            .ok_or_else(|| CatalogError::Missing(BUILTIN_CATALOG.to_string()))?;

        let contents = file
            .contents_utf8()
            .ok_or_else(|| CatalogError::Missing(BUILTIN_CATALOG.to_string()))?;

        Self::from_json_str(contents)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, CatalogError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        let catalog: Catalog = serde_json::from_str(json)?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn validate(&self) -> Result<(), CatalogError> {
        let mut seen_ids = HashSet::new();

        for decision in &self.decisions {
            if !seen_ids.insert(decision.id) {
                return Err(CatalogError::DuplicateId(decision.id));
            }

            let count = decision.options.len();
            if !(MIN_OPTIONS..=MAX_OPTIONS).contains(&count) {
                return Err(CatalogError::OptionCount {
                    id: decision.id,
                    count,
                });
            }

            if decision.options.iter().any(|o| o.trim().is_empty()) {
                return Err(CatalogError::EmptyOption(decision.id));
            }

            if let Some(option) = decision.options.iter().duplicates().next() {
                return Err(CatalogError::DuplicateOption {
                    id: decision.id,
                    option: option.clone(),
                });
            }

            if decision.time_limit == 0 {
                return Err(CatalogError::ZeroTimeLimit(decision.id));
            }
        }

        Ok(())
    }

    pub fn len(&self) -> usize {
        self.decisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decisions.is_empty()
    }

    /// Decisions matching the filter, in catalog order
    pub fn filtered(&self, filter: DifficultyFilter) -> Vec<&Decision> {
        self.decisions
            .iter()
            .filter(|d| filter.matches(d.difficulty))
            .collect()
    }

    pub fn count_matching(&self, filter: DifficultyFilter) -> usize {
        self.decisions
            .iter()
            .filter(|d| filter.matches(d.difficulty))
            .count()
    }
}
