//! Selection of the active keycode catalog.
//!
//! The active catalog is process-wide configuration chosen once at startup.
//! Switching is an explicit operation that builds a new immutable
//! [`Catalog`] and swaps the shared `Arc` in one step; readers holding the
//! previous `Arc` keep a consistent table until they drop it.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{info, warn};

use super::catalog::{Catalog, CatalogError};
use super::codec::KeycodeCodec;
use super::label::OsProfile;

const DEFAULT_CATALOG_JSON: &str = include_str!("../../assets/default_catalog.json");
const LEGACY_CATALOG_JSON: &str = include_str!("../../assets/legacy_catalog.json");

/// Identifier of a bundled catalog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum CatalogId {
    /// Current QMK numbering.
    #[default]
    Default,
    /// Vial protocol v6; shares the current numbering.
    VialV6,
    /// Pre-0.19 QMK layer numbering.
    Legacy,
}

impl CatalogId {
    /// Parses a catalog id or alias (`current`, `vialv6`).
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "default" | "current" => Some(Self::Default),
            "vial-v6" | "vialv6" => Some(Self::VialV6),
            "legacy" => Some(Self::Legacy),
            _ => None,
        }
    }

    /// Like [`parse`](Self::parse) but falls back to [`CatalogId::Default`].
    pub fn resolve(value: &str) -> Self {
        Self::parse(value).unwrap_or_else(|| {
            warn!(catalog = value, "unknown catalog id; using default");
            Self::Default
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::VialV6 => "vial-v6",
            Self::Legacy => "legacy",
        }
    }

    /// Builds a fresh catalog from the asset bundled for this id.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] if the bundled asset is invalid.
    pub fn load_bundled(self) -> Result<Catalog, CatalogError> {
        let json = match self {
            Self::Default | Self::VialV6 => DEFAULT_CATALOG_JSON,
            Self::Legacy => LEGACY_CATALOG_JSON,
        };
        Catalog::from_json(json)
    }
}

impl fmt::Display for CatalogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
struct ActiveCatalog {
    id: CatalogId,
    catalog: Arc<Catalog>,
}

/// Holder of the active catalog and label profile.
#[derive(Debug)]
pub struct CatalogRegistry {
    active: RwLock<ActiveCatalog>,
    os_profile: OsProfile,
}

impl CatalogRegistry {
    /// Loads the bundled catalog for `id`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] if the bundled asset is invalid.
    pub fn new(id: CatalogId, os_profile: OsProfile) -> Result<Self, CatalogError> {
        let catalog = id.load_bundled()?;
        Ok(Self::with_catalog(id, catalog, os_profile))
    }

    pub fn with_catalog(id: CatalogId, catalog: Catalog, os_profile: OsProfile) -> Self {
        Self {
            active: RwLock::new(ActiveCatalog {
                id,
                catalog: Arc::new(catalog),
            }),
            os_profile,
        }
    }

    pub fn active_id(&self) -> CatalogId {
        self.active.read().unwrap_or_else(PoisonError::into_inner).id
    }

    pub fn active(&self) -> Arc<Catalog> {
        let guard = self.active.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard.catalog)
    }

    pub fn os_profile(&self) -> OsProfile {
        self.os_profile
    }

    /// Codec bound to the catalog active at the time of the call.
    pub fn codec(&self) -> KeycodeCodec {
        KeycodeCodec::new(self.active(), self.os_profile)
    }

    /// Switches to the bundled catalog for `id`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] and keeps the current catalog if the asset is
    /// invalid.
    pub fn switch(&self, id: CatalogId) -> Result<(), CatalogError> {
        let catalog = id.load_bundled()?;
        self.install(id, catalog);
        Ok(())
    }

    /// Replaces the active catalog with one parsed from `json`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] and keeps the current catalog if `json` is
    /// invalid.
    pub fn reload_from_json(&self, id: CatalogId, json: &str) -> Result<(), CatalogError> {
        let catalog = Catalog::from_json(json)?;
        self.install(id, catalog);
        Ok(())
    }

    fn install(&self, id: CatalogId, catalog: Catalog) {
        let version = catalog.version().to_string();
        let mut guard = self.active.write().unwrap_or_else(PoisonError::into_inner);
        *guard = ActiveCatalog {
            id,
            catalog: Arc::new(catalog),
        };
        info!(catalog = %id, %version, "active keycode catalog switched");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
