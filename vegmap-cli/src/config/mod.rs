//! Configuration de l'outil
//!
//! Un fichier JSON optionnel décrit les noms de colonnes de la table de
//! végétation, la propriété portant l'identifiant d'élément et le système de
//! coordonnées par défaut. Les valeurs absentes prennent les noms du
//! Digitale Standaard.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use vegmap::{BuildOptions, CompareOptions, Crs};

/// Variable d'environnement désignant le fichier de configuration
pub const CONFIG_ENV: &str = "VEGMAP_CONFIG";

/// Configuration principale
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Options de jointure
    pub build: BuildOptions,

    /// Options de comparaison
    pub compare: CompareOptions,

    /// Propriété GeoJSON portant l'ElmID (à défaut, l'id de la feature)
    pub elmid_field: String,

    /// Système de coordonnées si le fichier n'en déclare pas
    pub crs: Crs,

    /// Colonnes de la table de végétation
    pub columns: ColumnMapping,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            build: BuildOptions::default(),
            compare: CompareOptions::default(),
            elmid_field: "elmid".to_string(),
            crs: Crs::default(),
            columns: ColumnMapping::default(),
        }
    }
}

/// Noms des colonnes de la table de végétation
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ColumnMapping {
    pub elmid: String,
    pub type_code: String,
    pub sub_type_code: String,
    pub cover_code: String,
    pub cover_percent: String,
    pub proportion: String,
    pub date: String,
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self {
            elmid: "elmid".to_string(),
            type_code: "vegtype_code".to_string(),
            sub_type_code: "sbbtype".to_string(),
            cover_code: "vegtype_bedekkingcode".to_string(),
            cover_percent: "vegtype_bedekkingnum".to_string(),
            proportion: "proportion".to_string(),
            date: "datum".to_string(),
        }
    }
}

impl Config {
    /// Charge une configuration depuis un fichier
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;

        let config: Self =
            serde_json::from_str(&content).context("Failed to parse config JSON")?;
        config
            .compare
            .validate()
            .context(format!("Invalid compare options in {}", path.display()))?;
        Ok(config)
    }

    /// Fichier explicite, sinon `VEGMAP_CONFIG`, sinon valeurs par défaut
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match std::env::var(CONFIG_ENV) {
            Ok(value) if !value.trim().is_empty() => Self::load(Path::new(value.trim())),
            _ => Ok(Self::default()),
        }
    }
}
