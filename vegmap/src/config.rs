//! Options de jointure et de comparaison

use serde::{Deserialize, Serialize};

use crate::classify::TypeLevel;
use crate::error::VegmapError;

/// Répartition de la surface d'un élément mosaïque sans proportions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProportionPolicy {
    /// Parts égales entre les entrées sans proportion
    #[default]
    Equal,
    /// Parts pondérées par le recouvrement (parts égales à défaut)
    CoverWeighted,
}

/// Options de construction d'une carte
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildOptions {
    /// Une classification sans géométrie est une erreur (sinon un warning).
    /// En mode strict l'export s'arrête au premier refus.
    pub strict: bool,

    /// Répartition des surfaces en l'absence de proportions
    pub proportion_policy: ProportionPolicy,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            strict: true,
            proportion_policy: ProportionPolicy::Equal,
        }
    }
}

impl BuildOptions {
    pub fn lenient() -> Self {
        Self {
            strict: false,
            ..Default::default()
        }
    }
}

/// Options de comparaison entre deux campagnes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompareOptions {
    /// Surface en dessous de laquelle un recouvrement est un artefact (sliver)
    pub sliver_area_epsilon: f64,

    /// Part minimale de la surface d'un élément pour être rapportée
    pub relative_tolerance: f64,

    /// Répartir le calcul sur plusieurs threads
    pub parallel: bool,

    /// Niveau de regroupement des transitions
    pub level: TypeLevel,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self {
            sliver_area_epsilon: 0.0,
            relative_tolerance: 1e-6,
            parallel: true,
            level: TypeLevel::Code,
        }
    }
}

impl CompareOptions {
    /// Vérifie la cohérence des options
    pub fn validate(&self) -> Result<(), VegmapError> {
        if !self.sliver_area_epsilon.is_finite() || self.sliver_area_epsilon < 0.0 {
            return Err(VegmapError::configuration(format!(
                "sliver_area_epsilon must be a finite value >= 0, got {}",
                self.sliver_area_epsilon
            )));
        }
        if !(0.0..1.0).contains(&self.relative_tolerance) {
            return Err(VegmapError::configuration(format!(
                "relative_tolerance must be in [0, 1), got {}",
                self.relative_tolerance
            )));
        }
        Ok(())
    }
}
