//! Résolution des codes de végétation en descriptions structurées
//!
//! La résolution est mémoïsée par couple (légende, code): une carte interroge
//! le même code pour des milliers d'éléments. Le cache est partageable entre
//! threads et entre classificateurs; la clé inclut l'identité de la légende,
//! si bien que deux versions de légende ne partagent jamais d'entrée.

pub mod syntaxon;

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::VegmapError;
use crate::legend::{Legend, LegendId};
use crate::types::TypeKey;

pub use syntaxon::SyntaxonLevel;

/// Description résolue d'un code de végétation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationDescription {
    pub code: String,
    pub name: Option<String>,
    pub main_type: String,
    pub sub_type: Option<String>,
    pub successional_stage: Option<String>,
    pub quality_class: Option<String>,
    pub syntaxon_level: Option<SyntaxonLevel>,
    pub syntaxon_class: Option<String>,
    pub legend_version: String,
}

/// Niveau hiérarchique utilisé pour regrouper les surfaces
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeLevel {
    /// Code brut
    #[default]
    Code,
    /// Type principal
    MainType,
    /// Sous-type (type principal à défaut)
    SubType,
    /// Classe de rareté / qualité
    QualityClass,
    /// Classe syntaxonomique dérivée du code
    SyntaxonClass,
}

impl ClassificationDescription {
    /// Clé de regroupement au niveau demandé
    pub fn key(&self, level: TypeLevel) -> TypeKey {
        match level {
            TypeLevel::Code => TypeKey::Type(self.code.clone()),
            TypeLevel::MainType => TypeKey::Type(self.main_type.clone()),
            TypeLevel::SubType => TypeKey::Type(
                self.sub_type
                    .clone()
                    .unwrap_or_else(|| self.main_type.clone()),
            ),
            TypeLevel::QualityClass => self
                .quality_class
                .clone()
                .map(TypeKey::Type)
                .unwrap_or(TypeKey::Unclassified),
            TypeLevel::SyntaxonClass => self
                .syntaxon_class
                .clone()
                .map(TypeKey::Type)
                .unwrap_or(TypeKey::Unclassified),
        }
    }
}

/// Cache des descriptions résolues, indexé par (légende, code)
#[derive(Debug, Default)]
pub struct ClassificationCache {
    entries: RwLock<HashMap<(LegendId, String), Arc<ClassificationDescription>>>,
}

impl ClassificationCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn get(&self, legend: LegendId, code: &str) -> Option<Arc<ClassificationDescription>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(&(legend, code.to_string())).cloned()
    }

    fn insert(
        &self,
        legend: LegendId,
        code: &str,
        description: ClassificationDescription,
    ) -> Arc<ClassificationDescription> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries
            .entry((legend, code.to_string()))
            .or_insert_with(|| Arc::new(description))
            .clone()
    }

    /// Nombre d'entrées mémorisées pour une légende
    pub fn len_for(&self, legend: LegendId) -> usize {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.keys().filter(|(id, _)| *id == legend).count()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Classificateur adossé à une légende immuable
#[derive(Debug, Clone)]
pub struct VegetationClassifier {
    legend: Arc<Legend>,
    cache: Arc<ClassificationCache>,
}

impl VegetationClassifier {
    /// Classificateur avec son propre cache
    pub fn new(legend: Arc<Legend>) -> Self {
        Self::with_cache(legend, Arc::new(ClassificationCache::new()))
    }

    /// Classificateur partageant un cache existant
    pub fn with_cache(legend: Arc<Legend>, cache: Arc<ClassificationCache>) -> Self {
        Self { legend, cache }
    }

    pub fn legend(&self) -> &Arc<Legend> {
        &self.legend
    }

    pub fn cache(&self) -> &Arc<ClassificationCache> {
        &self.cache
    }

    /// Résout un code; un code inconnu n'est jamais remplacé par un défaut
    pub fn resolve(&self, code: &str) -> Result<Arc<ClassificationDescription>, VegmapError> {
        let legend_id = self.legend.id();
        if let Some(hit) = self.cache.get(legend_id, code) {
            return Ok(hit);
        }

        let entry = self
            .legend
            .get(code)
            .ok_or_else(|| VegmapError::UnknownCode {
                code: code.to_string(),
                legend: self.legend.version().to_string(),
                element: None,
            })?;

        trace!(code = code, legend = self.legend.version(), "Resolving vegetation code");

        let description = ClassificationDescription {
            code: code.to_string(),
            name: entry.name.clone(),
            main_type: entry.main_type.clone(),
            sub_type: entry.sub_type.clone(),
            successional_stage: entry.successional_stage.clone(),
            quality_class: entry.quality_class.clone(),
            syntaxon_level: syntaxon::level(code),
            syntaxon_class: syntaxon::class(code).map(str::to_string),
            legend_version: self.legend.version().to_string(),
        };

        Ok(self.cache.insert(legend_id, code, description))
    }

    pub fn is_known(&self, code: &str) -> bool {
        self.legend.contains(code)
    }
}
