//! Légende: correspondance code brut → description structurée
//!
//! Une légende est chargée une fois par version du schéma de classification et
//! partagée en lecture seule (`Arc<Legend>`) par toutes les cartes qui
//! l'utilisent. Chaque instance reçoit une identité unique dans le processus,
//! qui sert de clé au cache du classificateur.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

static NEXT_LEGEND_ID: AtomicU64 = AtomicU64::new(1);

/// Identité d'une légende chargée
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LegendId(u64);

/// Description brute d'un code dans la légende
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LegendEntry {
    /// Type principal (ex: klasse SBB)
    pub main_type: String,

    /// Sous-type
    #[serde(default)]
    pub sub_type: Option<String>,

    /// Stade de succession (vorm)
    #[serde(default)]
    pub successional_stage: Option<String>,

    /// Classe de rareté / qualité (vervangbaarheid)
    #[serde(default)]
    pub quality_class: Option<String>,

    /// Nom lisible (gemeenschap)
    #[serde(default)]
    pub name: Option<String>,
}

impl LegendEntry {
    pub fn new(main_type: impl Into<String>) -> Self {
        Self {
            main_type: main_type.into(),
            ..Default::default()
        }
    }
}

/// Légende d'une version du schéma de classification
#[derive(Debug)]
pub struct Legend {
    id: LegendId,
    version: String,
    entries: HashMap<String, LegendEntry>,
}

impl Legend {
    pub fn new(
        version: impl Into<String>,
        entries: impl IntoIterator<Item = (String, LegendEntry)>,
    ) -> Self {
        Self {
            id: LegendId(NEXT_LEGEND_ID.fetch_add(1, Ordering::Relaxed)),
            version: version.into(),
            entries: entries.into_iter().collect(),
        }
    }

    pub fn id(&self) -> LegendId {
        self.id
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn get(&self, code: &str) -> Option<&LegendEntry> {
        self.entries.get(code)
    }

    pub fn contains(&self, code: &str) -> bool {
        self.entries.contains_key(code)
    }

    /// Codes de la légende, triés
    pub fn codes(&self) -> Vec<&str> {
        let mut codes: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        codes.sort_unstable();
        codes
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distinct_identity_same_version() {
        let a = Legend::new("2017", vec![("A".to_string(), LegendEntry::new("A"))]);
        let b = Legend::new("2017", vec![("A".to_string(), LegendEntry::new("A"))]);
        assert_ne!(a.id(), b.id());
        assert_eq!(a.version(), b.version());
    }

    #[test]
    fn test_lookup() {
        let legend = Legend::new(
            "v1",
            vec![
                ("08Bb".to_string(), LegendEntry::new("08")),
                ("11A1".to_string(), LegendEntry::new("11")),
            ],
        );
        assert!(legend.contains("08Bb"));
        assert_eq!(legend.get("11A1").map(|e| e.main_type.as_str()), Some("11"));
        assert!(legend.get("99").is_none());
        assert_eq!(legend.codes(), vec!["08Bb", "11A1"]);
    }
}
