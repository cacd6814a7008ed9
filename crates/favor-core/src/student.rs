//! Student id <-> display name lookup

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Numeric student identifier (`uniqueId` in API responses)
pub type StudentId = u32;

const BUILTIN_NAMES: &[(StudentId, &str)] = &[
    (10000, "Aru"),
    (10001, "Eimi"),
    (10002, "Haruna"),
    (10003, "Hifumi"),
    (10004, "Hina"),
    (10005, "Hoshino"),
    (10006, "Iori"),
    (10007, "Maki"),
    (10008, "Neru"),
    (10009, "Izumi"),
    (10010, "Shiroko"),
    (10011, "Shun"),
    (10012, "Sumire"),
    (10013, "Tsurugi"),
];

static BUILTIN: OnceLock<StudentDirectory> = OnceLock::new();

/// Immutable mapping of student ids to display names
///
/// Built once at startup from the built-in names plus any names from
/// configuration. Lookups for ids without a name fall back to the id itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StudentDirectory {
    names: IndexMap<StudentId, String>,
}

impl StudentDirectory {
    /// The built-in directory
    pub fn builtin() -> &'static StudentDirectory {
        BUILTIN.get_or_init(|| {
            Self::from_names(
                BUILTIN_NAMES
                    .iter()
                    .map(|&(id, name)| (id, name.to_string())),
            )
        })
    }

    pub fn from_names(names: impl IntoIterator<Item = (StudentId, String)>) -> Self {
        Self {
            names: names.into_iter().collect(),
        }
    }

    /// Copy of this directory with `overrides` added, replacing existing names
    pub fn with_overrides(&self, overrides: impl IntoIterator<Item = (StudentId, String)>) -> Self {
        let mut names = self.names.clone();
        names.extend(overrides);
        Self { names }
    }

    /// Resolve a numeric id or a display name to an id
    ///
    /// Returns 0 for a name that is not in the directory.
    pub fn resolve_id(&self, source: &str) -> StudentId {
        let source = source.trim();
        if let Some(id) = parse_id(source) {
            return id;
        }
        self.names
            .iter()
            .find(|(_, name)| name.as_str() == source)
            .map(|(&id, _)| id)
            .unwrap_or(0)
    }

    /// Display name for an id, or the id as text if it has no name
    pub fn display_name(&self, id: StudentId) -> String {
        self.names
            .get(&id)
            .cloned()
            .unwrap_or_else(|| id.to_string())
    }

    /// Display name for a numeric id or a name
    ///
    /// Non-numeric input is taken to already be a name and returned as is.
    pub fn name_for(&self, source: &str) -> String {
        match parse_id(source.trim()) {
            Some(id) => self.display_name(id),
            None => source.to_string(),
        }
    }

    pub fn get(&self, id: StudentId) -> Option<&str> {
        self.names.get(&id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (StudentId, &str)> + '_ {
        self.names.iter().map(|(&id, name)| (id, name.as_str()))
    }
}

fn parse_id(source: &str) -> Option<StudentId> {
    if source.is_empty() || !source.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    source.parse().ok()
}
