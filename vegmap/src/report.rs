//! Rapports de jointure et d'export avec graceful degradation
//!
//! Les incohérences des données de terrain sont collectées en lot plutôt que
//! de stopper au premier enregistrement fautif: chaque entrée nomme l'élément
//! concerné et l'invariant violé.

use std::fmt;

use serde::Serialize;

use crate::types::ElementId;

/// Niveau de sévérité d'une anomalie
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IssueLevel {
    /// Erreur: la jointure n'est pas valide
    Error,
    /// Warning: élément conservé avec dégradation
    Warning,
}

/// Invariant violé
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum IssueKind {
    /// Géométrie sans enregistrement de végétation
    OrphanGeometry,
    /// Enregistrement de végétation sans géométrie
    OrphanAttribute,
    /// Somme des proportions supérieure à 100 %
    ProportionSum { total: f64 },
    /// Proportion négative ou non finie
    InvalidProportion { value: f64 },
    /// Code absent de la légende
    UnknownCode { code: String },
    /// Géométrie ni surfacique ni linéaire
    UnsupportedGeometry { geometry_type: String },
    /// Géométrie irréparable (anneau dégénéré, coordonnées non finies)
    InvalidGeometry { reason: String },
    /// Identifiant présent plusieurs fois dans la source géométrique
    DuplicateGeometry,
    /// Lecture de la table de végétation en échec pour un identifiant listé
    AttributeRead { reason: String },
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssueKind::OrphanGeometry => {
                write!(f, "geometry has no classification (missing attributes)")
            }
            IssueKind::OrphanAttribute => {
                write!(f, "classification has no geometry (missing geometry)")
            }
            IssueKind::ProportionSum { total } => {
                write!(f, "proportions sum to {}% (must be <= 100%)", total)
            }
            IssueKind::InvalidProportion { value } => {
                write!(f, "invalid proportion {} (must be a finite value >= 0)", value)
            }
            IssueKind::UnknownCode { code } => {
                write!(f, "vegetation code '{}' is not in the legend", code)
            }
            IssueKind::UnsupportedGeometry { geometry_type } => {
                write!(f, "unsupported geometry type {} (polygon or line expected)", geometry_type)
            }
            IssueKind::InvalidGeometry { reason } => write!(f, "invalid geometry: {}", reason),
            IssueKind::DuplicateGeometry => {
                write!(f, "element id appears more than once in the geometry source")
            }
            IssueKind::AttributeRead { reason } => {
                write!(f, "vegetation records could not be read: {}", reason)
            }
        }
    }
}

/// Anomalie constatée sur un élément
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JoinIssue {
    pub level: IssueLevel,
    pub element: ElementId,
    pub kind: IssueKind,
}

impl fmt::Display for JoinIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "element {}: {}", self.element, self.kind)
    }
}

/// Rapport complet de jointure
#[derive(Debug, Clone, Default, Serialize)]
pub struct JoinReport {
    /// Nombre d'éléments joints (géométrie + classification)
    pub joined: usize,
    /// Éléments géométriques sans classification
    pub orphan_geometries: Vec<ElementId>,
    /// Classifications sans géométrie
    pub orphan_attributes: Vec<ElementId>,
    /// Toutes les anomalies, dans l'ordre des identifiants
    pub issues: Vec<JoinIssue>,
}

impl JoinReport {
    pub fn record(&mut self, level: IssueLevel, element: &ElementId, kind: IssueKind) {
        match kind {
            IssueKind::OrphanGeometry => self.orphan_geometries.push(element.clone()),
            IssueKind::OrphanAttribute => self.orphan_attributes.push(element.clone()),
            _ => {}
        }
        self.issues.push(JoinIssue {
            level,
            element: element.clone(),
            kind,
        });
    }

    pub fn errors(&self) -> impl Iterator<Item = &JoinIssue> {
        self.issues.iter().filter(|i| i.level == IssueLevel::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &JoinIssue> {
        self.issues.iter().filter(|i| i.level == IssueLevel::Warning)
    }

    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }

    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    /// Anomalies concernant un élément
    pub fn issues_for<'a>(&'a self, element: &'a ElementId) -> impl Iterator<Item = &'a JoinIssue> {
        self.issues.iter().filter(move |i| &i.element == element)
    }

    /// Affichage compact pour le résumé
    pub fn summary(&self) -> String {
        format!(
            "{} joined, {} orphan geometries, {} orphan attributes, {} errors, {} warnings",
            self.joined,
            self.orphan_geometries.len(),
            self.orphan_attributes.len(),
            self.errors().count(),
            self.warnings().count()
        )
    }
}

/// Enregistrement refusé par l'écrivain
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportFailure {
    pub element: ElementId,
    pub reason: String,
}

/// Statut global d'un export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExportStatus {
    /// Tous les enregistrements écrits
    Success,
    /// Écrit en partie, avec des refus
    PartialSuccess,
    /// Aucun enregistrement écrit
    Failed,
}

/// Rapport d'export
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExportReport {
    /// Éléments écrits
    pub written: Vec<ElementId>,
    /// Éléments refusés par l'écrivain
    pub failed: Vec<ExportFailure>,
    /// Éléments non tentés (arrêt anticipé en mode strict)
    pub skipped: Vec<ElementId>,
    /// Refus global de l'écrivain (ouverture ou finalisation du conteneur)
    pub aborted: Option<String>,
}

impl ExportReport {
    pub fn record_written(&mut self, element: &ElementId) {
        self.written.push(element.clone());
    }

    pub fn record_failure(&mut self, element: &ElementId, reason: impl Into<String>) {
        self.failed.push(ExportFailure {
            element: element.clone(),
            reason: reason.into(),
        });
    }

    pub fn failed_ids(&self) -> Vec<&ElementId> {
        self.failed.iter().map(|f| &f.element).collect()
    }

    pub fn status(&self) -> ExportStatus {
        if self.aborted.is_some() {
            return ExportStatus::Failed;
        }
        match (self.written.is_empty(), self.failed.is_empty() && self.skipped.is_empty()) {
            (_, true) => ExportStatus::Success,
            (false, false) => ExportStatus::PartialSuccess,
            (true, false) => ExportStatus::Failed,
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "{} written, {} failed, {} skipped",
            self.written.len(),
            self.failed.len(),
            self.skipped.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_report_default() {
        let report = JoinReport::default();
        assert!(report.is_clean());
        assert!(!report.has_errors());
        assert_eq!(report.joined, 0);
    }

    #[test]
    fn test_record_orphans() {
        let mut report = JoinReport::default();
        report.record(IssueLevel::Warning, &ElementId::from(3), IssueKind::OrphanGeometry);
        report.record(IssueLevel::Error, &ElementId::from(5), IssueKind::OrphanAttribute);

        assert_eq!(report.orphan_geometries, vec![ElementId::from(3)]);
        assert_eq!(report.orphan_attributes, vec![ElementId::from(5)]);
        assert_eq!(report.errors().count(), 1);
        assert_eq!(report.warnings().count(), 1);
        assert!(report.has_errors());
    }

    #[test]
    fn test_issue_display_names_element() {
        let issue = JoinIssue {
            level: IssueLevel::Error,
            element: ElementId::from(7),
            kind: IssueKind::ProportionSum { total: 110.0 },
        };
        let text = issue.to_string();
        assert!(text.contains("element 7"));
        assert!(text.contains("110"));
    }

    #[test]
    fn test_export_status() {
        let mut report = ExportReport::default();
        assert_eq!(report.status(), ExportStatus::Success);

        report.record_failure(&ElementId::from(1), "unsupported geometry");
        assert_eq!(report.status(), ExportStatus::Failed);

        report.record_written(&ElementId::from(2));
        assert_eq!(report.status(), ExportStatus::PartialSuccess);
        assert_eq!(report.failed_ids(), vec![&ElementId::from(1)]);
    }

    #[test]
    fn test_summary() {
        let mut report = JoinReport {
            joined: 12,
            ..Default::default()
        };
        report.record(IssueLevel::Warning, &ElementId::from(1), IssueKind::OrphanGeometry);
        let summary = report.summary();
        assert!(summary.contains("12 joined"));
        assert!(summary.contains("1 orphan geometries"));
    }
}
