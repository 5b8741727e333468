//! Roster records placed into an export.

use crate::{Error, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One person on the exported roster.
///
/// Built by the caller from roster data it already fetched; the pipeline
/// never mutates it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportableRecord {
    /// Unique within one export
    pub id: String,
    pub display_name: String,
    /// Photo location; `None` renders the placeholder glyph
    pub image_url: Option<String>,
    pub designation: Option<String>,
    pub department: Option<String>,
    pub position: Option<String>,
}

// Shape of an entry as the backend sends it.
#[derive(Deserialize)]
struct RawRecord {
    #[serde(default)]
    id: Option<serde_json::Value>,
    #[serde(alias = "display_name", alias = "displayName")]
    name: Option<String>,
    #[serde(default, alias = "image_url", alias = "imageUrl")]
    image: Option<String>,
    #[serde(default)]
    designation: Option<String>,
    #[serde(default)]
    department: Option<String>,
    #[serde(default)]
    position: Option<String>,
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl ExportableRecord {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            image_url: None,
            designation: None,
            department: None,
            position: None,
        }
    }

    pub fn with_image(mut self, url: impl Into<String>) -> Self {
        self.image_url = non_empty(Some(url.into()));
        self
    }

    pub fn with_designation(mut self, designation: impl Into<String>) -> Self {
        self.designation = non_empty(Some(designation.into()));
        self
    }

    pub fn with_department(mut self, department: impl Into<String>) -> Self {
        self.department = non_empty(Some(department.into()));
        self
    }

    /// Subtitle lines in display order, skipping absent fields.
    pub fn subtitles(&self) -> Vec<&str> {
        [&self.designation, &self.department, &self.position]
            .into_iter()
            .filter_map(|f| f.as_deref())
            .collect()
    }

    /// Up to two initials used by the placeholder glyph.
    pub fn initials(&self) -> String {
        self.display_name
            .split_whitespace()
            .filter_map(|w| w.chars().next())
            .filter(|c| c.is_alphanumeric())
            .take(2)
            .flat_map(char::to_uppercase)
            .collect()
    }

    /// Convert roster JSON as returned by the backend into records.
    ///
    /// Accepts a bare array or an object wrapping the array under `data`
    /// or `results`. Entries without a name are skipped. Missing ids become
    /// `record-<index>` and repeated ids get a numeric suffix.
    pub fn from_roster(value: serde_json::Value) -> Result<Vec<ExportableRecord>> {
        let entries = match value {
            serde_json::Value::Array(items) => items,
            serde_json::Value::Object(mut map) => {
                match map.remove("data").or_else(|| map.remove("results")) {
                    Some(serde_json::Value::Array(items)) => items,
                    _ => {
                        return Err(Error::Config(
                            "roster object has no `data` or `results` array".into(),
                        ))
                    }
                }
            }
            other => {
                return Err(Error::Config(format!(
                    "roster must be an array, got {}",
                    other
                )))
            }
        };

        let mut taken: HashSet<String> = HashSet::new();
        let mut records = Vec::with_capacity(entries.len());
        for (index, entry) in entries.into_iter().enumerate() {
            let raw: RawRecord = match serde_json::from_value(entry) {
                Ok(r) => r,
                Err(e) => {
                    warn!("Skipping roster entry {}: {}", index, e);
                    continue;
                }
            };
            let Some(name) = non_empty(raw.name) else {
                warn!("Skipping roster entry {} without a name", index);
                continue;
            };

            let base_id = match raw.id {
                Some(serde_json::Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
                Some(serde_json::Value::Number(n)) => n.to_string(),
                _ => format!("record-{}", index),
            };
            let mut id = base_id.clone();
            let mut n = 1;
            while taken.contains(&id) {
                n += 1;
                id = format!("{}-{}", base_id, n);
            }
            taken.insert(id.clone());

            records.push(ExportableRecord {
                id,
                display_name: name,
                image_url: non_empty(raw.image),
                designation: non_empty(raw.designation),
                department: non_empty(raw.department),
                position: non_empty(raw.position),
            });
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn roster_accepts_field_aliases() {
        let records = ExportableRecord::from_roster(json!([
            { "id": 7, "name": "Ada Lovelace", "image_url": "https://cdn.example/ada.jpg", "designation": "Dean" },
            { "_id": "x", "name": "Alan Turing", "image": "", "department": "Computing" }
        ]))
        .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "7");
        assert_eq!(records[0].image_url.as_deref(), Some("https://cdn.example/ada.jpg"));
        assert_eq!(records[1].id, "record-1");
        assert_eq!(records[1].image_url, None);
        assert_eq!(records[1].subtitles(), vec!["Computing"]);
    }

    #[test]
    fn roster_unwraps_envelope_and_skips_nameless() {
        let records = ExportableRecord::from_roster(json!({
            "data": [ { "name": "  " }, { "name": "Grace Hopper", "position": "Chair" } ]
        }))
        .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].display_name, "Grace Hopper");
        assert_eq!(records[0].position.as_deref(), Some("Chair"));
    }

    #[test]
    fn duplicate_ids_are_suffixed() {
        let records = ExportableRecord::from_roster(json!([
            { "id": "a", "name": "One" },
            { "id": "a", "name": "Two" },
            { "id": "a", "name": "Three" }
        ]))
        .unwrap();
        let ids: Vec<_> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "a-2", "a-3"]);

        let records = ExportableRecord::from_roster(json!([
            { "id": "a", "name": "One" },
            { "id": "a-2", "name": "Two" },
            { "id": "a", "name": "Three" }
        ]))
        .unwrap();
        let ids: Vec<_> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "a-2", "a-3"]);
    }

    #[test]
    fn roster_rejects_scalars() {
        assert!(ExportableRecord::from_roster(json!("nope")).is_err());
    }

    #[test]
    fn initials_take_first_two_words() {
        let r = ExportableRecord::new("1", "maria del carmen");
        assert_eq!(r.initials(), "MD");
    }
}
