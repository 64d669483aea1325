use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_SERVICE_TYPE: &str = "other";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductCategory {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub color: String,
    /// Never empty; `["other"]` when nothing usable was supplied.
    pub service_types: Vec<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewCategory {
    pub name: String,
    pub description: String,
    pub icon: String,
    pub color: String,
    pub service_types: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CategoryPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub service_types: Option<Vec<String>>,
    pub is_active: Option<bool>,
}

impl ProductCategory {
    pub fn new(input: NewCategory) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: input.name,
            description: input.description,
            icon: input.icon,
            color: input.color,
            service_types: ensure_service_types(input.service_types),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn apply(&mut self, patch: CategoryPatch) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(description) = patch.description {
            self.description = description;
        }
        if let Some(icon) = patch.icon {
            self.icon = icon;
        }
        if let Some(color) = patch.color {
            self.color = color;
        }
        if let Some(service_types) = patch.service_types {
            self.service_types = ensure_service_types(service_types);
        }
        if let Some(is_active) = patch.is_active {
            self.is_active = is_active;
        }
        self.updated_at = Utc::now();
    }
}

/// Trims entries, drops blanks and falls back to `["other"]`.
pub fn ensure_service_types(service_types: Vec<String>) -> Vec<String> {
    let cleaned: Vec<String> = service_types
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    if cleaned.is_empty() {
        vec![DEFAULT_SERVICE_TYPE.to_string()]
    } else {
        cleaned
    }
}
