//! Trigger catalog
//!
//! Validates raw trigger definitions into an ordered, immutable list of
//! [`Trigger`]s. Nothing here is global: callers build a
//! [`CatalogConfig`] and pass it to [`TriggerCatalog::load`].

use std::collections::HashSet;
use tracing::info;

use crate::config::{CatalogConfig, TriggerDef};
use crate::error::ConfigError;
use crate::types::{Trigger, TriggerCategory};

/// Severity weight used when a definition omits one
pub const DEFAULT_SEVERITY_WEIGHT: u32 = 1;

/// Ordered registry of defect triggers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerCatalog {
    triggers: Vec<Trigger>,
}

impl TriggerCatalog {
    /// Load and validate the catalog described by `config`
    pub fn load(config: &CatalogConfig) -> Result<Self, ConfigError> {
        let defs = config.resolve()?;
        let catalog = Self::from_defs(&defs)?;
        info!("Loaded {} trigger(s) into catalog", catalog.len());
        Ok(catalog)
    }

    /// Validate definitions in source order
    pub fn from_defs(defs: &[TriggerDef]) -> Result<Self, ConfigError> {
        if defs.is_empty() {
            return Err(ConfigError::EmptyCatalog);
        }

        let mut seen = HashSet::new();
        let mut triggers = Vec::with_capacity(defs.len());

        for (index, def) in defs.iter().enumerate() {
            let id = def
                .id
                .as_deref()
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .ok_or(ConfigError::MissingField { index, field: "id" })?;

            let raw_category = def
                .category
                .as_deref()
                .filter(|c| !c.trim().is_empty())
                .ok_or(ConfigError::MissingField {
                    index,
                    field: "category",
                })?;
            let category: TriggerCategory =
                raw_category
                    .parse()
                    .map_err(|_| ConfigError::UnknownCategory {
                        id: id.to_string(),
                        category: raw_category.to_string(),
                    })?;

            let workflow = def
                .workflow
                .as_deref()
                .map(str::trim)
                .filter(|w| !w.is_empty())
                .ok_or(ConfigError::MissingField {
                    index,
                    field: "workflow",
                })?;

            let severity_weight = def.severity_weight.unwrap_or(DEFAULT_SEVERITY_WEIGHT);
            if severity_weight == 0 {
                return Err(ConfigError::InvalidValue {
                    field: format!("{}.severity_weight", id),
                    reason: "must be at least 1".to_string(),
                });
            }

            if !seen.insert(id.to_string()) {
                return Err(ConfigError::DuplicateTrigger(id.to_string()));
            }

            triggers.push(Trigger {
                id: id.to_string(),
                category,
                description: def.description.trim().to_string(),
                workflow: workflow.to_string(),
                field: def
                    .field
                    .as_deref()
                    .map(str::trim)
                    .filter(|f| !f.is_empty())
                    .map(String::from),
                severity_weight,
                tags: def.tags.clone(),
            });
        }

        Ok(Self { triggers })
    }

    pub fn triggers(&self) -> &[Trigger] {
        &self.triggers
    }

    pub fn get(&self, id: &str) -> Option<&Trigger> {
        self.triggers.iter().find(|t| t.id == id)
    }

    pub fn by_category(&self, category: TriggerCategory) -> Vec<&Trigger> {
        self.triggers
            .iter()
            .filter(|t| t.category == category)
            .collect()
    }

    /// Drop triggers not matching `keep`, preserving order
    pub fn retain(&mut self, keep: impl FnMut(&Trigger) -> bool) {
        self.triggers.retain(keep);
    }

    pub fn len(&self) -> usize {
        self.triggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }
}
