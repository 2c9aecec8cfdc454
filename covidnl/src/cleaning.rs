//! Rules folding alternate municipality spellings into one canonical name.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::CovidError;

const BUNDLED_MERGE_RULES: &str = include_str!("../data/municipality_merges.toml");

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MergeRule {
    pub duplicate: String,
    pub canonical: String,
}

#[derive(Serialize, Deserialize, Debug, Default)]
struct MergeRulesFile {
    #[serde(default)]
    rule: Vec<MergeRule>,
}

/// A validated set of merge rules. No name is both merged away and kept, so the order the
/// rules are applied in does not matter.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MergeRules(Vec<MergeRule>);

impl MergeRules {
    pub fn new(rules: Vec<MergeRule>) -> Result<Self> {
        let mut duplicates = HashSet::new();
        let canonicals: HashSet<&str> = rules.iter().map(|r| r.canonical.as_str()).collect();
        for rule in &rules {
            if rule.duplicate == rule.canonical {
                return Err(invalid(format!("'{}' is merged into itself", rule.duplicate)));
            }
            if !duplicates.insert(rule.duplicate.as_str()) {
                return Err(invalid(format!(
                    "'{}' is listed as a duplicate more than once",
                    rule.duplicate
                )));
            }
            if canonicals.contains(rule.duplicate.as_str()) {
                return Err(invalid(format!(
                    "'{}' is both a duplicate and a canonical name",
                    rule.duplicate
                )));
            }
        }
        Ok(Self(rules))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let file: MergeRulesFile =
            toml::from_str(contents).map_err(|err| invalid(err.to_string()))?;
        Self::new(file.rule)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read merge rules '{}'", path.display()))?;
        Self::from_toml(&contents)
    }

    /// The rules for the spellings seen in the RIVM reports.
    pub fn bundled() -> Result<Self> {
        Self::from_toml(BUNDLED_MERGE_RULES)
    }

    /// Loads `path` when given, the bundled rules otherwise.
    pub fn load_or_bundled(path: Option<&Path>) -> Result<Self> {
        path.map_or_else(Self::bundled, Self::load)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MergeRule> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn invalid(reason: String) -> anyhow::Error {
    CovidError::InvalidMergeRules(reason).into()
}
