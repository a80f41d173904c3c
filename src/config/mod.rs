//! Configuration data model: categories, naming variables and watcher timing.
//!
//! Every configuration is guaranteed to contain the reserved `General`
//! category and `original_name` variable; `validate_and_repair` re-inserts
//! them when absent and filters out malformed entries on load.

pub mod store;

pub use store::ConfigStore;

use crate::naming::Formatting;
use serde::{Deserialize, Serialize};

/// Reserved category every configuration must contain
pub const GENERAL_CATEGORY: &str = "General";

/// Reserved variable every configuration must contain
pub const ORIGINAL_NAME_VARIABLE: &str = "original_name";

/// A user-defined document category with its naming pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    pub description: String,
    /// Pattern containing `{variable}` placeholders
    pub naming_pattern: String,
}

impl Category {
    fn general() -> Self {
        Self {
            name: GENERAL_CATEGORY.to_string(),
            description: "Documents that do not match any other category".to_string(),
            naming_pattern: "{original_name}".to_string(),
        }
    }

    fn is_well_formed(&self) -> bool {
        !self.name.trim().is_empty()
            && !self.description.trim().is_empty()
            && !self.naming_pattern.trim().is_empty()
    }
}

/// A user-defined naming variable extracted from document text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub formatting: Formatting,
}

impl Variable {
    fn original_name() -> Self {
        Self {
            name: ORIGINAL_NAME_VARIABLE.to_string(),
            description: "The file's original name without extension".to_string(),
            formatting: Formatting::None,
        }
    }

    fn is_well_formed(&self) -> bool {
        !self.name.trim().is_empty() && !self.description.trim().is_empty()
    }
}

/// Watcher timing knobs. The defaults mirror the windows the pipeline was
/// designed around; they are configurable because a slow AI round-trip can
/// outlive the move-suppression window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatcherTimings {
    /// How long a file's size must stay stable before an event settles
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    /// How long a processed basename is remembered as "already seen"
    #[serde(default = "default_processed_ttl_secs")]
    pub processed_ttl_secs: u64,
    /// Self-move suppression window after an organizer rename
    #[serde(default = "default_moved_ttl_secs")]
    pub moved_ttl_secs: u64,
}

fn default_settle_ms() -> u64 {
    2_000
}

fn default_processed_ttl_secs() -> u64 {
    600
}

fn default_moved_ttl_secs() -> u64 {
    30
}

impl Default for WatcherTimings {
    fn default() -> Self {
        Self {
            settle_ms: default_settle_ms(),
            processed_ttl_secs: default_processed_ttl_secs(),
            moved_ttl_secs: default_moved_ttl_secs(),
        }
    }
}

/// Top-level application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Absolute root of the watched tree; empty means "not configured yet"
    #[serde(default)]
    pub watched_folder: String,
    /// When enabled, files are moved into `watched_folder/<category>/`
    #[serde(default)]
    pub enable_organization: bool,
    /// Free-text profile injected into categorization prompts
    #[serde(default)]
    pub expertise: String,
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub variables: Vec<Variable>,
    #[serde(default)]
    pub watcher: WatcherTimings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            watched_folder: String::new(),
            enable_organization: false,
            expertise: String::new(),
            categories: vec![Category::general()],
            variables: vec![Variable::original_name()],
            watcher: WatcherTimings::default(),
        }
    }
}

impl AppConfig {
    /// Look up a category by name
    pub fn find_category(&self, name: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.name == name)
    }

    /// Look up a variable by name
    pub fn find_variable(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.name == name)
    }

    /// The reserved fallback category, if present
    pub fn general_category(&self) -> Option<&Category> {
        self.find_category(GENERAL_CATEGORY)
    }

    /// Add a category, rejecting duplicates by name
    pub fn add_category(&mut self, category: Category) -> Result<(), String> {
        if !category.is_well_formed() {
            return Err("Category requires a name, description and naming pattern".to_string());
        }
        if self.find_category(&category.name).is_some() {
            return Err(format!("Category '{}' already exists", category.name));
        }
        self.categories.push(category);
        Ok(())
    }

    /// Remove a category. The reserved `General` category cannot be removed.
    pub fn remove_category(&mut self, name: &str) -> Result<(), String> {
        if name == GENERAL_CATEGORY {
            return Err("The General category cannot be deleted".to_string());
        }
        let before = self.categories.len();
        self.categories.retain(|c| c.name != name);
        if self.categories.len() == before {
            return Err(format!("Category '{}' not found", name));
        }
        Ok(())
    }

    /// Add a variable, rejecting duplicates by name
    pub fn add_variable(&mut self, variable: Variable) -> Result<(), String> {
        if !variable.is_well_formed() {
            return Err("Variable requires a name and description".to_string());
        }
        if self.find_variable(&variable.name).is_some() {
            return Err(format!("Variable '{}' already exists", variable.name));
        }
        self.variables.push(variable);
        Ok(())
    }

    /// Remove a variable. The reserved `original_name` variable cannot be
    /// removed.
    pub fn remove_variable(&mut self, name: &str) -> Result<(), String> {
        if name == ORIGINAL_NAME_VARIABLE {
            return Err("The original_name variable cannot be deleted".to_string());
        }
        let before = self.variables.len();
        self.variables.retain(|v| v.name != name);
        if self.variables.len() == before {
            return Err(format!("Variable '{}' not found", name));
        }
        Ok(())
    }

    /// Drop malformed entries and re-insert the reserved defaults when
    /// absent. Idempotent: repairing an already-repaired config is a no-op.
    pub fn validate_and_repair(mut self) -> Self {
        let dropped_categories = self.categories.len();
        self.categories.retain(Category::is_well_formed);
        let dropped_categories = dropped_categories - self.categories.len();
        if dropped_categories > 0 {
            tracing::warn!(
                "[Config] Dropped {} malformed category entries",
                dropped_categories
            );
        }

        let dropped_variables = self.variables.len();
        self.variables.retain(Variable::is_well_formed);
        let dropped_variables = dropped_variables - self.variables.len();
        if dropped_variables > 0 {
            tracing::warn!(
                "[Config] Dropped {} malformed variable entries",
                dropped_variables
            );
        }

        if self.general_category().is_none() {
            tracing::warn!("[Config] Reserved General category missing, restoring default");
            self.categories.insert(0, Category::general());
        }

        if self.find_variable(ORIGINAL_NAME_VARIABLE).is_none() {
            tracing::warn!("[Config] Reserved original_name variable missing, restoring default");
            self.variables.insert(0, Variable::original_name());
        }

        self
    }
}
