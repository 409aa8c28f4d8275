//! Entry model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A unique identifier for an entry, using UUID v7 (time-sortable).
///
/// Generated once on the client and never regenerated on edit or re-sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(Uuid);

impl EntryId {
    /// Create a new unique entry ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntryId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A logged food entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    /// Unique identifier
    pub id: EntryId,
    /// When the logged meal happened (Unix ms, user-editable)
    pub occurred_at: i64,
    /// When the client created the entry (Unix ms, immutable once set)
    pub recorded_at: i64,
    /// Free-text description
    pub description: String,
    /// Category label (e.g. "breakfast")
    pub category: String,
    /// Primary measure
    pub calories: f64,
    /// Serialized inference result, if any
    #[serde(default)]
    pub details: Option<String>,
    /// Whether the entry was logged with attached media
    #[serde(default)]
    pub has_photo: bool,
}

impl Entry {
    /// Build a new entry from a draft, stamping a fresh id and `recorded_at`.
    #[must_use]
    pub fn from_draft(draft: EntryDraft) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id: EntryId::new(),
            occurred_at: draft.occurred_at.unwrap_or(now),
            recorded_at: now,
            description: draft.description,
            category: draft.category,
            calories: draft.calories,
            details: draft.details,
            has_photo: draft.has_photo,
        }
    }

    /// Apply a field-level edit. `id` and `recorded_at` are never touched.
    pub fn apply(&mut self, edit: EntryEdit) {
        if let Some(occurred_at) = edit.occurred_at {
            self.occurred_at = occurred_at;
        }
        if let Some(description) = edit.description {
            self.description = description;
        }
        if let Some(category) = edit.category {
            self.category = category;
        }
        if let Some(calories) = edit.calories {
            self.calories = calories;
        }
        if let Some(details) = edit.details {
            self.details = details;
        }
        if let Some(has_photo) = edit.has_photo {
            self.has_photo = has_photo;
        }
    }

    /// Validate user-provided fields before persisting.
    pub fn validate(&self) -> crate::Result<()> {
        if self.description.trim().is_empty() {
            return Err(crate::Error::InvalidInput(
                "entry description cannot be empty".to_string(),
            ));
        }
        if !self.calories.is_finite() || self.calories < 0.0 {
            return Err(crate::Error::InvalidInput(format!(
                "calories must be a non-negative number, got {}",
                self.calories
            )));
        }
        Ok(())
    }
}

/// Input for creating an entry through the logging flow
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntryDraft {
    /// Defaults to now when absent
    pub occurred_at: Option<i64>,
    pub description: String,
    pub category: String,
    pub calories: f64,
    pub details: Option<String>,
    pub has_photo: bool,
}

impl EntryDraft {
    pub fn new(description: impl Into<String>, category: impl Into<String>, calories: f64) -> Self {
        Self {
            description: description.into(),
            category: category.into(),
            calories,
            ..Self::default()
        }
    }
}

/// Field-level edit of an existing entry. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntryEdit {
    pub occurred_at: Option<i64>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub calories: Option<f64>,
    /// `Some(None)` clears the details blob
    pub details: Option<Option<String>>,
    pub has_photo: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_id_unique() {
        let id1 = EntryId::new();
        let id2 = EntryId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_entry_id_parse() {
        let id = EntryId::new();
        let parsed: EntryId = id.as_str().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_from_draft_defaults_occurred_at_to_now() {
        let entry = Entry::from_draft(EntryDraft::new("Oatmeal", "breakfast", 320.0));
        assert_eq!(entry.description, "Oatmeal");
        assert_eq!(entry.occurred_at, entry.recorded_at);
        assert!(!entry.has_photo);
    }

    #[test]
    fn test_apply_edit_keeps_identity_and_recorded_at() {
        let mut entry = Entry::from_draft(EntryDraft {
            occurred_at: Some(1_000),
            ..EntryDraft::new("Toast", "breakfast", 150.0)
        });
        let id = entry.id;
        let recorded_at = entry.recorded_at;

        entry.apply(EntryEdit {
            occurred_at: Some(2_000),
            calories: Some(180.0),
            details: Some(None),
            ..EntryEdit::default()
        });

        assert_eq!(entry.id, id);
        assert_eq!(entry.recorded_at, recorded_at);
        assert_eq!(entry.occurred_at, 2_000);
        assert!((entry.calories - 180.0).abs() < f64::EPSILON);
        assert_eq!(entry.description, "Toast");
    }

    #[test]
    fn test_validate_rejects_bad_input() {
        let empty = Entry::from_draft(EntryDraft::new("   ", "lunch", 10.0));
        assert!(empty.validate().is_err());

        let negative = Entry::from_draft(EntryDraft::new("Soup", "lunch", -1.0));
        assert!(negative.validate().is_err());

        let nan = Entry::from_draft(EntryDraft::new("Soup", "lunch", f64::NAN));
        assert!(nan.validate().is_err());
    }

    #[test]
    fn test_entry_json_uses_camel_case() {
        let entry = Entry::from_draft(EntryDraft::new("Apple", "snack", 95.0));
        let json = serde_json::to_value(&entry).unwrap();
        assert!(json.get("occurredAt").is_some());
        assert!(json.get("hasPhoto").is_some());
        assert_eq!(json["id"], serde_json::Value::String(entry.id.as_str()));
    }
}
