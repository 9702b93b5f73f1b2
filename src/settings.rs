//! Workspace configuration sections stored as JSON in the `settings` table.
//!
//! Every section is a typed struct with defaults. Saved values are merged over
//! those defaults on load, so sections written by older builds keep working.

use crate::db;
use crate::grading::GradingConfig;
use crate::import::StudentCatalog;
use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub trait Section: Serialize + DeserializeOwned + Default {
    const KEY: &'static str;
    /// A malformed saved value is an error instead of falling back to
    /// defaults.
    const STRICT: bool = false;
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Store(#[from] anyhow::Error),
    #[error("saved {section} settings are invalid: {source}")]
    Invalid {
        section: &'static str,
        source: serde_json::Error,
    },
}

impl LoadError {
    pub fn code(&self) -> &'static str {
        match self {
            LoadError::Store(_) => "db_query_failed",
            LoadError::Invalid { .. } => "settings_invalid",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    #[default]
    System,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct GlobalNotification {
    pub enabled: bool,
    pub message: String,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SystemSettings {
    pub allow_student_registration: bool,
    pub global_notification: GlobalNotification,
    pub theme: Theme,
}

impl Default for SystemSettings {
    fn default() -> Self {
        Self {
            allow_student_registration: true,
            global_notification: GlobalNotification::default(),
            theme: Theme::System,
        }
    }
}

impl Section for SystemSettings {
    const KEY: &'static str = "system";
}

impl Section for GradingConfig {
    const KEY: &'static str = "grading";
    const STRICT: bool = true;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct ImportOptions {
    #[serde(flatten)]
    pub catalog: StudentCatalog,
    /// Refuse to apply an upload that has any rejected row.
    pub require_clean: bool,
}

impl Section for ImportOptions {
    const KEY: &'static str = "imports";
}

/// Loads a section, falling back to defaults when nothing is saved. A saved
/// value that no longer parses also falls back unless the section is strict.
pub fn load<T: Section>(conn: &Connection) -> Result<T, LoadError> {
    let Some(saved) = db::settings_get_json(conn, T::KEY)? else {
        return Ok(T::default());
    };
    match serde_json::from_value(saved) {
        Ok(v) => Ok(v),
        Err(source) if T::STRICT => {
            tracing::warn!(section = T::KEY, error = %source, "saved settings section is invalid");
            Err(LoadError::Invalid {
                section: T::KEY,
                source,
            })
        }
        Err(e) => {
            tracing::warn!(section = T::KEY, error = %e, "ignoring malformed settings section");
            Ok(T::default())
        }
    }
}

pub fn save<T: Section>(conn: &Connection, value: &T) -> anyhow::Result<()> {
    db::settings_set_json(conn, T::KEY, &serde_json::to_value(value)?)
}

/// Applies a partial update to `current`. Unknown keys are rejected and the
/// merged value must still deserialize, which runs any validation the type
/// carries.
pub fn apply_patch<T: Section>(current: &T, patch: &Map<String, Value>) -> Result<T, String> {
    let mut merged = serde_json::to_value(current).map_err(|e| e.to_string())?;
    let Some(obj) = merged.as_object_mut() else {
        return Err(format!("{} section is not an object", T::KEY));
    };
    for (k, v) in patch {
        if !obj.contains_key(k) {
            return Err(format!("unknown {} field: {}", T::KEY, k));
        }
        obj.insert(k.clone(), v.clone());
    }
    serde_json::from_value(merged).map_err(|e| format!("invalid {} settings: {}", T::KEY, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn patch(v: Value) -> Map<String, Value> {
        v.as_object().cloned().expect("object patch")
    }

    #[test]
    fn partial_saved_section_keeps_defaults() {
        let s: SystemSettings =
            serde_json::from_value(json!({ "theme": "dark" })).expect("parse");
        assert!(s.allow_student_registration);
        assert_eq!(s.theme, Theme::Dark);
        assert!(!s.global_notification.enabled);
    }

    #[test]
    fn patch_rejects_unknown_keys_and_bad_values() {
        let current = SystemSettings::default();
        let e = apply_patch(&current, &patch(json!({ "colour": "red" }))).expect_err("unknown");
        assert_eq!(e, "unknown system field: colour");

        assert!(apply_patch(&current, &patch(json!({ "theme": "neon" }))).is_err());

        let next = apply_patch(
            &current,
            &patch(json!({ "allowStudentRegistration": false })),
        )
        .expect("valid patch");
        assert!(!next.allow_student_registration);
        assert_eq!(next.theme, Theme::System);
    }

    #[test]
    fn grading_patch_runs_scale_validation() {
        let current = GradingConfig::default();
        let bad = patch(json!({ "scale": [{ "label": "P", "min": 0, "max": 90 }] }));
        assert!(apply_patch(&current, &bad).is_err());

        let good = patch(json!({ "maxMarks": { "cats": 30, "coursework": 10, "finalExam": 60 } }));
        let next = apply_patch(&current, &good).expect("maxima patch");
        assert_eq!(next.max_marks.cats, 30);
        assert_eq!(next.scale, current.scale);
    }

    fn scratch_db(prefix: &str) -> Connection {
        let ws = std::env::temp_dir().join(format!("{}-{}", prefix, uuid::Uuid::new_v4()));
        db::open_db(&ws).expect("open workspace db")
    }

    #[test]
    fn malformed_grading_section_is_an_error() {
        let conn = scratch_db("marksd-settings-grading");
        db::settings_set_json(
            &conn,
            "grading",
            &json!({
                "scale": GradingConfig::default().scale,
                "maxMarks": { "cats": 50, "coursework": 20, "finalExam": 60 }
            }),
        )
        .expect("save raw section");
        let e = load::<GradingConfig>(&conn).expect_err("strict section");
        assert_eq!(e.code(), "settings_invalid");
        assert!(e.to_string().starts_with("saved grading settings are invalid"));
    }

    #[test]
    fn malformed_lenient_section_falls_back_to_defaults() {
        let conn = scratch_db("marksd-settings-system");
        db::settings_set_json(&conn, "system", &json!({ "theme": "neon" }))
            .expect("save raw section");
        let s = load::<SystemSettings>(&conn).expect("lenient section");
        assert_eq!(s, SystemSettings::default());
        assert_eq!(load::<GradingConfig>(&conn).expect("unsaved"), GradingConfig::default());
    }

    #[test]
    fn import_options_flatten_catalog() {
        let v = serde_json::to_value(ImportOptions::default()).expect("encode");
        assert_eq!(v["sessions"], json!(["DAY", "EVENING", "WEEKEND"]));
        assert_eq!(v["requireClean"], json!(false));
    }
}
