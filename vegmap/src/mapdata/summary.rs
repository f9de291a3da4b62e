//! Synthèse surfacique par type de végétation
//!
//! La surface d'un polygone mosaïque est répartie entre ses entrées selon la
//! proportion déclarée. Les entrées sans proportion se partagent le reste
//! selon la `ProportionPolicy`; ce qui n'est attribué à aucune entrée, ainsi
//! que les éléments sans classification, va à `TypeKey::Unclassified`. Les
//! valeurs somment donc toujours à la surface totale.

use std::collections::BTreeMap;

use super::{MapData, MapElement};
use crate::classify::TypeLevel;
use crate::config::ProportionPolicy;
use crate::error::VegmapError;
use crate::types::{ElementKind, TypeKey, VegetationRecord};

/// Part (entre 0 et 1) de l'élément attribuée à chaque entrée, et reste
/// non attribué
pub fn record_shares(records: &[VegetationRecord], policy: ProportionPolicy) -> (Vec<f64>, f64) {
    let valid = |record: &VegetationRecord| {
        record
            .proportion
            .filter(|value| value.is_finite() && *value >= 0.0)
    };

    let declared: f64 = records.iter().filter_map(valid).sum();
    let missing: Vec<usize> = (0..records.len())
        .filter(|&i| valid(&records[i]).is_none())
        .collect();

    // Somme excessive (carte partielle): normalisation des proportions déclarées
    if declared > 100.0 {
        let shares = records
            .iter()
            .map(|record| valid(record).map_or(0.0, |value| value / declared))
            .collect();
        return (shares, 0.0);
    }

    let mut shares: Vec<f64> = records
        .iter()
        .map(|record| valid(record).map_or(0.0, |value| value / 100.0))
        .collect();
    let remaining = (100.0 - declared) / 100.0;

    if missing.is_empty() {
        return (shares, remaining);
    }

    let weights: Vec<f64> = match policy {
        ProportionPolicy::CoverWeighted => missing
            .iter()
            .map(|&i| {
                records[i]
                    .cover_percent
                    .filter(|cover| cover.is_finite() && *cover > 0.0)
                    .unwrap_or(0.0)
            })
            .collect(),
        ProportionPolicy::Equal => vec![1.0; missing.len()],
    };
    let total: f64 = weights.iter().sum();
    let weights = if total > 0.0 {
        weights.into_iter().map(|w| w / total).collect()
    } else {
        vec![1.0 / missing.len() as f64; missing.len()]
    };

    for (&i, weight) in missing.iter().zip(weights) {
        shares[i] = remaining * weight;
    }
    (shares, 0.0)
}

impl MapData {
    /// Surface par code de végétation
    pub fn area_by_type(&self) -> Result<BTreeMap<TypeKey, f64>, VegmapError> {
        self.area_by(TypeLevel::Code)
    }

    /// Surface par type au niveau hiérarchique demandé
    ///
    /// Les lignes sont ignorées.
    pub fn area_by(&self, level: TypeLevel) -> Result<BTreeMap<TypeKey, f64>, VegmapError> {
        let mut areas = BTreeMap::new();
        for element in self.iter().filter(|e| e.kind() == ElementKind::Polygon) {
            for (key, share) in self.element_shares(element, level)? {
                *areas.entry(key).or_insert(0.0) += share * element.area();
            }
        }
        Ok(areas)
    }

    /// Parts de l'élément par clé de regroupement; elles somment à 1
    pub(crate) fn element_shares(
        &self,
        element: &MapElement,
        level: TypeLevel,
    ) -> Result<Vec<(TypeKey, f64)>, VegmapError> {
        if element.records().is_empty() {
            return Ok(vec![(TypeKey::Unclassified, 1.0)]);
        }

        let descriptions = element.classification(self.classifier())?;
        let (shares, remainder) = record_shares(element.records(), self.options().proportion_policy);

        let mut merged: BTreeMap<TypeKey, f64> = BTreeMap::new();
        for (description, share) in descriptions.iter().zip(shares) {
            if share > 0.0 {
                *merged.entry(description.key(level)).or_insert(0.0) += share;
            }
        }
        if remainder > 0.0 {
            *merged.entry(TypeKey::Unclassified).or_insert(0.0) += remainder;
        }
        Ok(merged.into_iter().collect())
    }
}
