//! Types d'erreurs pour le crate vegmap

use std::fmt;

use thiserror::Error;

use crate::mapdata::MapData;
use crate::report::{ExportReport, JoinReport};
use crate::types::ElementId;

/// Nombre maximal d'éléments cités dans un message d'erreur
const MAX_LISTED: usize = 10;

/// Source de données concernée par une erreur
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Source géométrique (polygones, lignes)
    Geometry,
    /// Table d'attributs (types de végétation)
    Attributes,
    /// Carte jointe
    Map,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Geometry => write!(f, "geometry source"),
            SourceKind::Attributes => write!(f, "attribute source"),
            SourceKind::Map => write!(f, "map data"),
        }
    }
}

/// Erreurs pouvant survenir lors de la jointure, des requêtes ou de la comparaison
#[derive(Debug, Error)]
pub enum VegmapError {
    /// Élément absent d'une source
    #[error("Element {id} not found in {source_kind}")]
    NotFound { id: ElementId, source_kind: SourceKind },

    /// Intégrité référentielle violée lors de la jointure
    #[error(transparent)]
    Join(#[from] Box<JoinError>),

    /// Code de végétation absent de la légende
    #[error("Unknown vegetation code '{code}' in legend '{legend}'{}", element_suffix(.element))]
    UnknownCode {
        code: String,
        legend: String,
        element: Option<ElementId>,
    },

    /// Export en échec (aucun enregistrement écrit)
    #[error(transparent)]
    Export(#[from] ExportError),

    /// Options invalides
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Géométrie invalide ou non supportée
    #[error("Invalid geometry for element {id}: {reason}")]
    InvalidGeometry { id: ElementId, reason: String },

    /// Identifiant présent deux fois dans une même source
    #[error("Duplicate element {id} in {source_kind}")]
    DuplicateElement { id: ElementId, source_kind: SourceKind },
}

impl VegmapError {
    /// Crée une erreur d'élément introuvable
    pub fn not_found(id: &ElementId, source_kind: SourceKind) -> Self {
        Self::NotFound {
            id: id.clone(),
            source_kind,
        }
    }

    /// Crée une erreur de géométrie invalide
    pub fn invalid_geometry(id: &ElementId, reason: impl Into<String>) -> Self {
        Self::InvalidGeometry {
            id: id.clone(),
            reason: reason.into(),
        }
    }

    /// Crée une erreur de configuration
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration(reason.into())
    }
}

impl From<JoinError> for VegmapError {
    fn from(err: JoinError) -> Self {
        Self::Join(Box::new(err))
    }
}

fn element_suffix(element: &Option<ElementId>) -> String {
    element
        .as_ref()
        .map(|id| format!(" (element {})", id))
        .unwrap_or_default()
}

/// Échec de jointure: rapport complet et carte construite malgré tout
///
/// La carte partielle contient tous les éléments joignables; elle permet à
/// l'analyste d'inspecter les données malgré les incohérences signalées.
#[derive(Debug)]
pub struct JoinError {
    pub report: JoinReport,
    pub partial: MapData,
}

impl JoinError {
    /// Identifiants des éléments en erreur
    pub fn element_ids(&self) -> Vec<&ElementId> {
        self.report.errors().map(|issue| &issue.element).collect()
    }
}

impl fmt::Display for JoinError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let errors: Vec<_> = self.report.errors().collect();
        write!(f, "Join failed with {} integrity error(s)", errors.len())?;
        for issue in errors.iter().take(MAX_LISTED) {
            write!(f, "; {}", issue)?;
        }
        if errors.len() > MAX_LISTED {
            write!(f, "; ... and {} more", errors.len() - MAX_LISTED)?;
        }
        Ok(())
    }
}

impl std::error::Error for JoinError {}

/// Échec d'export: aucun enregistrement écrit, ou conteneur refusé par l'écrivain
#[derive(Debug)]
pub struct ExportError {
    pub report: ExportReport,
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Export failed: {} written, {} rejected",
            self.report.written.len(),
            self.report.failed.len()
        )?;
        if let Some(reason) = &self.report.aborted {
            write!(f, "; writer aborted: {}", reason)?;
        }
        for failure in self.report.failed.iter().take(MAX_LISTED) {
            write!(f, "; element {}: {}", failure.element, failure.reason)?;
        }
        if self.report.failed.len() > MAX_LISTED {
            write!(f, "; ... and {} more", self.report.failed.len() - MAX_LISTED)?;
        }
        Ok(())
    }
}

impl std::error::Error for ExportError {}
