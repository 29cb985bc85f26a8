//! Marketplace registry. Loads all marketplace definitions from embedded
//! TOML configs.
//!
//! Each `.toml` file in `packages/source/marketplaces/` is baked into the
//! binary at compile time via [`include_str!`]. Adding a marketplace is a
//! matter of writing a TOML file and listing it below.

use crate::config::{MarketplaceConfig, parse_marketplace_toml};

/// TOML configs embedded at compile time.
const MARKETPLACE_TOMLS: &[(&str, &str)] =
    &[("spitogatos", include_str!("../marketplaces/spitogatos.toml"))];

/// Environment variable naming the marketplace to use when none is given
/// on the command line.
pub const MARKETPLACE_ENV: &str = "COMPS_MARKETPLACE";

/// Returns all marketplace configurations (enabled and disabled).
///
/// # Panics
///
/// Panics if any embedded TOML config is malformed (a build-time defect).
#[must_use]
pub fn all_marketplaces() -> Vec<MarketplaceConfig> {
    MARKETPLACE_TOMLS
        .iter()
        .map(|(name, toml_str)| {
            parse_marketplace_toml(toml_str)
                .unwrap_or_else(|e| panic!("Failed to parse marketplace '{name}': {e}"))
        })
        .collect()
}

/// Resolves the marketplace for a run: the explicit `id`, else the
/// [`MARKETPLACE_ENV`] variable, else the first enabled marketplace.
#[must_use]
pub fn select_marketplace(id: Option<&str>) -> Option<MarketplaceConfig> {
    let wanted = id
        .map(str::to_string)
        .or_else(|| std::env::var(MARKETPLACE_ENV).ok());

    let all = all_marketplaces();
    match wanted {
        Some(wanted) => {
            let found = all.into_iter().find(|m| m.id == wanted);
            if found.is_none() {
                log::warn!(
                    "Unknown marketplace '{wanted}'. Available: {}",
                    all_marketplaces()
                        .iter()
                        .map(|m| m.id.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                );
            }
            found
        }
        None => all.into_iter().find(|m| m.enabled),
    }
}
