//! Mapping from subject attributes to dataset column names.

use std::path::Path;

use serde::Deserialize;

use crate::DatasetError;

/// Column names used to read subjects from a dataset.
///
/// Every field has a default, so a mapping file only needs to name the
/// columns that differ:
///
/// ```toml
/// id = "asset_id"
/// sqm = "surface"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ColumnMap {
    pub id: String,
    pub source: String,
    pub portfolio: String,
    /// Latitude, used together with `lon` when `coords` is absent.
    pub lat: String,
    pub lon: String,
    /// Single `"lat,lon"` column, preferred when present.
    pub coords: String,
    pub sqm: String,
    pub price: String,
    pub level: String,
    pub renovated: String,
    /// Free-text address, only needed for geocoding.
    pub address: String,
    pub enriched_at: String,
}

impl Default for ColumnMap {
    fn default() -> Self {
        Self {
            id: "id".to_string(),
            source: "source".to_string(),
            portfolio: "portfolio".to_string(),
            lat: "lat".to_string(),
            lon: "lon".to_string(),
            coords: "coords".to_string(),
            sqm: "sqm".to_string(),
            price: "price".to_string(),
            level: "level".to_string(),
            renovated: "renovated".to_string(),
            address: "address".to_string(),
            enriched_at: "enriched_at".to_string(),
        }
    }
}

impl ColumnMap {
    /// Parses a mapping from TOML, filling unspecified names with defaults.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::Config`] if the TOML is malformed or names an
    /// unknown attribute.
    pub fn from_toml(toml_str: &str) -> Result<Self, DatasetError> {
        toml::de::from_str(toml_str).map_err(|e| DatasetError::Config {
            message: e.to_string(),
        })
    }

    /// Reads a mapping file.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::Io`] if the file cannot be read, or
    /// [`DatasetError::Config`] if it is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, DatasetError> {
        let contents = std::fs::read_to_string(path).map_err(|e| DatasetError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_toml(&contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_mapping_keeps_defaults() {
        let map = ColumnMap::from_toml("id = \"asset_id\"\nsqm = \"surface\"").unwrap();
        assert_eq!(map.id, "asset_id");
        assert_eq!(map.sqm, "surface");
        assert_eq!(map.price, "price");
        assert_eq!(map.coords, "coords");
    }

    #[test]
    fn unknown_attribute_is_rejected() {
        assert!(matches!(
            ColumnMap::from_toml("colour = \"red\""),
            Err(DatasetError::Config { .. })
        ));
    }
}
