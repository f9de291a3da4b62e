//! Rapport d'exécution avec graceful degradation
//!
//! Ce module collecte les résultats de lecture, de jointure et d'export
//! d'une campagne, et les affiche ou les sauvegarde en JSON.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;
use vegmap::{Comparison, ExportReport, IssueLevel, JoinReport, TypeKey};

use crate::read::{AttributeRead, GeometryRead, ReadRejection};

/// Statut global de l'exécution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunStatus {
    /// Exécution réussie sans erreur
    Success,
    /// Exécution réussie avec des erreurs non-fatales
    PartialSuccess,
    /// Exécution échouée
    Failed,
}

/// Niveau de sévérité des erreurs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorLevel {
    /// Erreur fatale: traitement abandonné
    Fatal,
    /// Erreur: élément écarté
    Error,
    /// Warning: élément conservé avec dégradation
    Warning,
}

/// Anomalie rencontrée, avec contexte
#[derive(Debug, Clone, Serialize)]
pub struct RunIssue {
    /// Niveau de sévérité
    pub level: ErrorLevel,
    /// Étape concernée (lecture, jointure, export)
    pub stage: &'static str,
    /// Identifiant de l'élément (optionnel)
    pub element: Option<String>,
    /// Message d'erreur
    pub message: String,
}

/// Rapport complet d'une campagne
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Libellé de la campagne
    pub campaign: String,
    /// Durée du traitement
    pub duration_secs: f64,
    /// Statut global
    pub status: RunStatus,

    /// Features lues / écartées
    pub features_read: usize,
    pub features_rejected: usize,
    /// Géométries corrigées à la lecture
    pub geometries_repaired: usize,
    /// Lignes de la table lues / écartées
    pub rows_read: usize,
    pub rows_rejected: usize,

    /// Éléments joints
    pub elements_joined: usize,
    /// Éléments exportés / refusés / non tentés
    pub elements_exported: usize,
    pub elements_failed: usize,
    pub elements_skipped: usize,

    /// Surface par type, en hectares
    pub area_by_type_ha: BTreeMap<String, f64>,

    /// Liste des anomalies
    pub issues: Vec<RunIssue>,
}

impl Default for RunReport {
    fn default() -> Self {
        Self {
            campaign: String::new(),
            duration_secs: 0.0,
            status: RunStatus::Success,
            features_read: 0,
            features_rejected: 0,
            geometries_repaired: 0,
            rows_read: 0,
            rows_rejected: 0,
            elements_joined: 0,
            elements_exported: 0,
            elements_failed: 0,
            elements_skipped: 0,
            area_by_type_ha: BTreeMap::new(),
            issues: Vec::new(),
        }
    }
}

impl RunReport {
    /// Crée un nouveau rapport pour une campagne
    pub fn new(campaign: &str) -> Self {
        Self {
            campaign: campaign.to_string(),
            ..Default::default()
        }
    }

    /// Enregistre la lecture des géométries
    pub fn record_geometries(&mut self, read: &GeometryRead) {
        self.features_read = read.source.len() + read.rejected.len();
        self.features_rejected = read.rejected.len();
        self.geometries_repaired = read.repaired;
        for rejection in &read.rejected {
            self.push_rejection("geometry", rejection);
        }
    }

    /// Enregistre la lecture de la table de végétation
    pub fn record_attributes(&mut self, read: &AttributeRead) {
        self.rows_read = read.rows;
        self.rows_rejected = read.rejected.len();
        for rejection in &read.rejected {
            self.push_rejection("attributes", rejection);
        }
    }

    fn push_rejection(&mut self, stage: &'static str, rejection: &ReadRejection) {
        self.issues.push(RunIssue {
            level: ErrorLevel::Error,
            stage,
            element: rejection.element.as_ref().map(|id| id.to_string()),
            message: format!("entry {}: {}", rejection.index, rejection.reason),
        });
    }

    /// Enregistre le rapport de jointure
    pub fn record_join(&mut self, report: &JoinReport) {
        self.elements_joined = report.joined;
        for issue in &report.issues {
            self.issues.push(RunIssue {
                level: match issue.level {
                    IssueLevel::Error => ErrorLevel::Error,
                    IssueLevel::Warning => ErrorLevel::Warning,
                },
                stage: "join",
                element: Some(issue.element.to_string()),
                message: issue.kind.to_string(),
            });
        }
    }

    /// Enregistre le rapport d'export
    pub fn record_export(&mut self, report: &ExportReport) {
        self.elements_exported = report.written.len();
        self.elements_failed = report.failed.len();
        self.elements_skipped = report.skipped.len();
        if let Some(reason) = &report.aborted {
            self.record_fatal("export", reason);
        }
        for failure in &report.failed {
            self.issues.push(RunIssue {
                level: ErrorLevel::Error,
                stage: "export",
                element: Some(failure.element.to_string()),
                message: failure.reason.clone(),
            });
        }
    }

    /// Enregistre les surfaces par type (m² → ha)
    pub fn record_areas(&mut self, areas: &BTreeMap<TypeKey, f64>) {
        self.area_by_type_ha = areas
            .iter()
            .map(|(key, area)| (key.to_string(), area / 10_000.0))
            .collect();
    }

    /// Enregistre une erreur fatale
    pub fn record_fatal(&mut self, stage: &'static str, message: &str) {
        self.issues.push(RunIssue {
            level: ErrorLevel::Fatal,
            stage,
            element: None,
            message: message.to_string(),
        });
    }

    /// Définit la durée du traitement
    pub fn set_duration(&mut self, duration: Duration) {
        self.duration_secs = duration.as_secs_f64();
    }

    /// Détermine le statut final basé sur les erreurs
    pub fn finalize(&mut self) {
        let has_fatal = self.issues.iter().any(|e| e.level == ErrorLevel::Fatal);
        let has_errors = self.issues.iter().any(|e| e.level == ErrorLevel::Error);
        let has_success = self.elements_joined > 0 || self.elements_exported > 0;

        self.status = if has_fatal {
            RunStatus::Failed
        } else if has_errors && has_success {
            RunStatus::PartialSuccess
        } else if has_errors {
            RunStatus::Failed
        } else {
            RunStatus::Success
        };
    }

    pub fn errors(&self) -> impl Iterator<Item = &RunIssue> {
        self.issues.iter().filter(|e| e.level != ErrorLevel::Warning)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &RunIssue> {
        self.issues.iter().filter(|e| e.level == ErrorLevel::Warning)
    }

    /// Affiche le rapport sur la console
    pub fn display(&self) {
        println!("\n{}", "=".repeat(60));
        println!("REPORT - Campaign {}", self.campaign);
        println!("{}", "=".repeat(60));

        println!("\nStatus: {:?}", self.status);
        println!("Duration: {:.2}s", self.duration_secs);

        println!("\n--- SUMMARY ---");
        println!(
            "Features: {} read, {} rejected, {} repaired",
            self.features_read, self.features_rejected, self.geometries_repaired
        );
        println!("Rows: {} read, {} rejected", self.rows_read, self.rows_rejected);
        println!("Elements: {} joined", self.elements_joined);
        if self.elements_exported + self.elements_failed + self.elements_skipped > 0 {
            println!(
                "Export: {} written, {} failed, {} skipped",
                self.elements_exported, self.elements_failed, self.elements_skipped
            );
        }

        if !self.area_by_type_ha.is_empty() {
            println!("\n--- AREA BY TYPE (ha) ---");
            for (type_name, area) in &self.area_by_type_ha {
                println!("  {}: {:.4}", type_name, area);
            }
        }

        let warnings: Vec<_> = self.warnings().collect();
        if !warnings.is_empty() {
            println!("\n--- WARNINGS ({}) ---", warnings.len());
            for w in warnings.iter().take(10) {
                println!("  [{}] {}", location(w), w.message);
            }
            if warnings.len() > 10 {
                println!("  ... and {} more", warnings.len() - 10);
            }
        }

        let errors: Vec<_> = self.errors().collect();
        if !errors.is_empty() {
            println!("\n--- ERRORS ({}) ---", errors.len());
            for e in errors.iter().take(20) {
                println!("  {:?} [{}] {}", e.level, location(e), e.message);
            }
            if errors.len() > 20 {
                println!("  ... and {} more", errors.len() - 20);
            }
        }

        println!("\n{}", "=".repeat(60));
    }

    /// Sauvegarde le rapport en JSON
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Affichage compact pour le résumé
    pub fn summary(&self) -> String {
        format!(
            "{}: {} joined, {} exported, {} errors, {} warnings",
            self.campaign,
            self.elements_joined,
            self.elements_exported,
            self.errors().count(),
            self.warnings().count()
        )
    }
}

fn location(issue: &RunIssue) -> String {
    match &issue.element {
        Some(id) => format!("{}:{}", issue.stage, id),
        None => issue.stage.to_string(),
    }
}

/// Ligne de la matrice de transition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionRow {
    pub from: TypeKey,
    pub to: TypeKey,
    pub area_ha: f64,
}

/// Synthèse d'une comparaison, par couple de types
#[derive(Debug, Clone, Serialize)]
pub struct TransitionTable {
    pub earlier: String,
    pub later: String,
    pub transitions: Vec<TransitionRow>,
    /// Surface disparue par type antérieur
    pub disappeared: Vec<TransitionRow>,
    /// Surface apparue par type postérieur
    pub appeared: Vec<TransitionRow>,
    pub unchanged_ha: f64,
    pub changed_ha: f64,
    pub slivers_discarded: usize,
}

impl TransitionTable {
    pub fn from_comparison(comparison: &Comparison) -> Self {
        let hectares = |area: f64| area / 10_000.0;
        Self {
            earlier: comparison.earlier_label.clone(),
            later: comparison.later_label.clone(),
            transitions: comparison
                .transitions
                .iter()
                .map(|((from, to), area)| TransitionRow {
                    from: from.clone(),
                    to: to.clone(),
                    area_ha: hectares(*area),
                })
                .collect(),
            disappeared: comparison
                .disappeared
                .iter()
                .map(|(from, area)| TransitionRow {
                    from: from.clone(),
                    to: TypeKey::Unclassified,
                    area_ha: hectares(*area),
                })
                .collect(),
            appeared: comparison
                .appeared
                .iter()
                .map(|(to, area)| TransitionRow {
                    from: TypeKey::Unclassified,
                    to: to.clone(),
                    area_ha: hectares(*area),
                })
                .collect(),
            unchanged_ha: hectares(comparison.unchanged_area()),
            changed_ha: hectares(comparison.changed_area()),
            slivers_discarded: comparison.diagnostics.slivers_discarded,
        }
    }

    /// Affiche la matrice sur la console
    pub fn display(&self) {
        println!("\n{}", "=".repeat(60));
        println!("TRANSITIONS {} -> {}", self.earlier, self.later);
        println!("{}", "=".repeat(60));

        println!("\n--- BY TYPE (ha) ---");
        for row in &self.transitions {
            println!("  {} -> {}: {:.4}", row.from, row.to, row.area_ha);
        }
        if !self.disappeared.is_empty() {
            println!("\n--- DISAPPEARED (ha) ---");
            for row in &self.disappeared {
                println!("  {}: {:.4}", row.from, row.area_ha);
            }
        }
        if !self.appeared.is_empty() {
            println!("\n--- APPEARED (ha) ---");
            for row in &self.appeared {
                println!("  {}: {:.4}", row.to, row.area_ha);
            }
        }

        println!(
            "\nUnchanged: {:.4} ha, changed: {:.4} ha, slivers discarded: {}",
            self.unchanged_ha, self.changed_ha, self.slivers_discarded
        );
        println!("\n{}", "=".repeat(60));
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vegmap::{ElementId, IssueKind};

    #[test]
    fn test_run_report_default() {
        let report = RunReport::default();
        assert_eq!(report.status, RunStatus::Success);
        assert_eq!(report.elements_joined, 0);
        assert!(report.issues.is_empty());
    }

    #[test]
    fn test_record_join() {
        let mut join = JoinReport {
            joined: 3,
            ..Default::default()
        };
        join.record(IssueLevel::Warning, &ElementId::from(4), IssueKind::OrphanGeometry);
        join.record(IssueLevel::Error, &ElementId::from(5), IssueKind::OrphanAttribute);

        let mut report = RunReport::new("2008");
        report.record_join(&join);
        assert_eq!(report.elements_joined, 3);
        assert_eq!(report.warnings().count(), 1);
        assert_eq!(report.errors().count(), 1);
        assert_eq!(report.issues[1].element.as_deref(), Some("5"));
    }

    #[test]
    fn test_finalize_partial_success() {
        let mut report = RunReport::new("2008");
        report.elements_joined = 10;
        let mut export = ExportReport::default();
        export.record_written(&ElementId::from(1));
        export.record_failure(&ElementId::from(2), "unsupported geometry type");
        report.record_export(&export);
        report.finalize();

        assert_eq!(report.status, RunStatus::PartialSuccess);
        assert_eq!(report.elements_failed, 1);
    }

    #[test]
    fn test_finalize_failed() {
        let mut report = RunReport::new("2008");
        report.elements_joined = 10;
        report.record_fatal("export", "disk full");
        report.finalize();

        assert_eq!(report.status, RunStatus::Failed);
    }

    #[test]
    fn test_warnings_only_is_success() {
        let mut join = JoinReport {
            joined: 1,
            ..Default::default()
        };
        join.record(IssueLevel::Warning, &ElementId::from(4), IssueKind::OrphanGeometry);
        let mut report = RunReport::new("2008");
        report.record_join(&join);
        report.finalize();

        assert_eq!(report.status, RunStatus::Success);
    }

    #[test]
    fn test_record_areas_in_hectares() {
        let mut report = RunReport::new("2008");
        let mut areas = BTreeMap::new();
        areas.insert(TypeKey::from("11A1"), 25_000.0);
        areas.insert(TypeKey::Unclassified, 5_000.0);
        report.record_areas(&areas);

        assert_eq!(report.area_by_type_ha["11A1"], 2.5);
        assert_eq!(report.area_by_type_ha["-"], 0.5);
    }

    #[test]
    fn test_summary() {
        let mut report = RunReport::new("2008-2010");
        report.elements_joined = 100;
        report.elements_exported = 98;

        let summary = report.summary();
        assert!(summary.contains("2008-2010"));
        assert!(summary.contains("98 exported"));
    }
}
