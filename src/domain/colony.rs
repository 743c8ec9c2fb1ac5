//! Player settlements.

use serde::{Deserialize, Serialize};

/// A player settlement. Read-only for the engine; only its name fields
/// feed the search index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Colony {
    /// Stable identifier.
    #[serde(skip)]
    pub hash: String,
    /// Settlement name.
    pub base_name: String,
    /// Planet the settlement is on.
    pub planet: String,
    /// Name of the owning faction.
    pub faction_name: String,
    /// Kind of owner (player account, server, ...).
    #[serde(default)]
    pub owner_type: Option<String>,
    /// Identifier of the owner.
    #[serde(default)]
    pub owner_id: Option<String>,
}

impl Colony {
    /// The strings indexed for name search, in index order.
    #[must_use]
    pub fn searchable_names(&self) -> [&str; 3] {
        [&self.base_name, &self.planet, &self.faction_name]
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_without_owner_fields() {
        let json = r#"{"BaseName":"Haven","Planet":"Kepler","FactionName":"Free Traders"}"#;
        let Ok(colony) = serde_json::from_str::<Colony>(json) else {
            panic!("colony should parse");
        };
        assert_eq!(colony.searchable_names(), ["Haven", "Kepler", "Free Traders"]);
        assert!(colony.owner_type.is_none());
    }

    #[test]
    fn missing_name_field_fails() {
        let json = r#"{"BaseName":"Haven","Planet":"Kepler"}"#;
        assert!(serde_json::from_str::<Colony>(json).is_err());
    }
}
