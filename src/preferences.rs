//! Persisted UI preferences.
//!
//! Only view state lives here; task data is always re-fetched. The editing
//! unlock is per browser and lives in the dashboard's session cookie instead.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::merge::DepartmentSelection;

/// View state remembered between sessions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Preferences {
    /// `None` means every department.
    pub selected_departments: Option<Vec<String>>,
    pub current_week_index: Option<usize>,
    pub scroll_position: Option<f64>,
    pub print_departments: Vec<String>,
}

impl Preferences {
    /// The remembered department selection.
    pub fn selection(&self) -> DepartmentSelection {
        match &self.selected_departments {
            Some(list) => DepartmentSelection::Only(list.clone()),
            None => DepartmentSelection::All,
        }
    }
}

/// Selection from an explicit parameter (`all` or a comma list), falling back
/// to the remembered one.
pub fn resolve_selection(param: Option<&str>, prefs: &Preferences) -> DepartmentSelection {
    match param.map(str::trim) {
        Some(raw) if raw.eq_ignore_ascii_case("all") => DepartmentSelection::All,
        Some(raw) => DepartmentSelection::from_query(Some(raw)),
        None => prefs.selection(),
    }
}

/// Value stored for a selection; `None` means every department.
pub fn stored_selection(selection: &DepartmentSelection) -> Option<Vec<String>> {
    match selection {
        DepartmentSelection::All => None,
        DepartmentSelection::Only(list) => Some(list.clone()),
    }
}

/// JSON file holding [`Preferences`].
///
/// Writes are serialized so concurrent updates never lose each other.
#[derive(Debug)]
pub struct PreferenceStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl PreferenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stored preferences, or defaults when the file is missing or unreadable.
    pub fn load(&self) -> Preferences {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Preferences::default(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read preferences");
                return Preferences::default();
            }
        };
        serde_json::from_str(&content).unwrap_or_else(|e| {
            warn!(path = %self.path.display(), error = %e, "Ignoring corrupt preferences file");
            Preferences::default()
        })
    }

    pub fn save(&self, prefs: &Preferences) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        self.write(prefs)
    }

    fn write(&self, prefs: &Preferences) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        // Readers never see a half-written file.
        let json = serde_json::to_string_pretty(prefs)?;
        let staged = self.path.with_extension("json.tmp");
        std::fs::write(&staged, json)
            .with_context(|| format!("Failed to write {}", staged.display()))?;
        std::fs::rename(&staged, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }

    /// Load, modify, and save as one step with respect to other writers.
    pub fn update(&self, f: impl FnOnce(&mut Preferences)) -> Result<Preferences> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut prefs = self.load();
        f(&mut prefs);
        self.write(&prefs)?;
        Ok(prefs)
    }
}
