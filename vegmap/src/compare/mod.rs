//! Comparaison de deux campagnes de relevé
//!
//! Les identifiants d'éléments n'ont pas de sens d'une campagne à l'autre:
//! l'alignement se fait par recouvrement spatial. Chaque couple de polygones
//! (antérieur, postérieur) qui se recouvrent donne un enregistrement de
//! transition; la partie d'un polygone antérieur recouverte par aucun
//! polygone postérieur a disparu, la partie d'un polygone postérieur hors de
//! tout polygone antérieur est apparue.
//!
//! Les recouvrements minuscules (slivers) dus aux différences de
//! numérisation des limites sont écartés et comptés dans les diagnostics.
//! Les lignes ne participent pas à la comparaison.

pub mod hash;

use std::collections::BTreeMap;

use geo::{Area, BooleanOps, Geometry, MultiPolygon};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::CompareOptions;
use crate::error::VegmapError;
use crate::index::ElementIndex;
use crate::mapdata::{MapData, MapElement};
use crate::types::{ElementId, ElementKind, TypeKey};

pub use hash::{geometry_hash, GeometryHash};

/// Nature d'un enregistrement de changement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChangeKind {
    /// Recouvrement entre un élément antérieur et un élément postérieur
    Transition,
    /// Surface antérieure sans élément postérieur
    Disappeared,
    /// Surface postérieure sans élément antérieur
    Appeared,
}

/// Un couple d'éléments alignés, ou une surface apparue / disparue
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeRecord {
    pub kind: ChangeKind,
    pub earlier: Option<ElementId>,
    pub later: Option<ElementId>,
    /// Surface concernée
    pub area: f64,
    /// Part de l'élément antérieur
    pub earlier_proportion: Option<f64>,
    /// Part de l'élément postérieur
    pub later_proportion: Option<f64>,
    /// Classification antérieure (clé, part de l'élément)
    pub before: Vec<(TypeKey, f64)>,
    /// Classification postérieure (clé, part de l'élément)
    pub after: Vec<(TypeKey, f64)>,
    /// Même identifiant dans les deux campagnes
    pub same_id: bool,
    /// Géométrie identique dans les deux campagnes
    pub same_geometry: bool,
}

/// Compteurs de la comparaison
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CompareDiagnostics {
    /// Couples dont les rectangles englobants se recouvrent
    pub pairs_tested: usize,
    /// Recouvrements et restes écartés comme artefacts
    pub slivers_discarded: usize,
    /// Surface cumulée des artefacts écartés
    pub sliver_area: f64,
}

impl CompareDiagnostics {
    fn merge(&mut self, other: &CompareDiagnostics) {
        self.pairs_tested += other.pairs_tested;
        self.slivers_discarded += other.slivers_discarded;
        self.sliver_area += other.sliver_area;
    }

    fn discard(&mut self, area: f64) {
        self.slivers_discarded += 1;
        self.sliver_area += area;
    }
}

/// Résultat d'une comparaison
#[derive(Debug, Clone, Default, Serialize)]
pub struct Comparison {
    pub earlier_label: String,
    pub later_label: String,
    /// Transitions par élément antérieur puis postérieur, apparitions en fin
    pub records: Vec<ChangeRecord>,
    /// (type antérieur, type postérieur) → surface
    #[serde(skip)]
    pub transitions: BTreeMap<(TypeKey, TypeKey), f64>,
    /// Type antérieur → surface disparue
    #[serde(skip)]
    pub disappeared: BTreeMap<TypeKey, f64>,
    /// Type postérieur → surface apparue
    #[serde(skip)]
    pub appeared: BTreeMap<TypeKey, f64>,
    pub diagnostics: CompareDiagnostics,
}

impl Comparison {
    fn area_of(&self, kind: ChangeKind) -> f64 {
        self.records
            .iter()
            .filter(|record| record.kind == kind)
            .map(|record| record.area)
            .sum()
    }

    pub fn transition_area(&self) -> f64 {
        self.area_of(ChangeKind::Transition)
    }

    pub fn disappeared_area(&self) -> f64 {
        self.area_of(ChangeKind::Disappeared)
    }

    pub fn appeared_area(&self) -> f64 {
        self.area_of(ChangeKind::Appeared)
    }

    /// Surface de l'union des deux campagnes, artefacts exclus
    pub fn total_area(&self) -> f64 {
        self.records.iter().map(|record| record.area).sum()
    }

    /// Surface restée du même type
    pub fn unchanged_area(&self) -> f64 {
        self.transitions
            .iter()
            .filter(|((from, to), _)| from == to)
            .map(|(_, area)| area)
            .sum()
    }

    /// Surface ayant changé de type
    pub fn changed_area(&self) -> f64 {
        self.transitions
            .iter()
            .filter(|((from, to), _)| from != to)
            .map(|(_, area)| area)
            .sum()
    }

    /// Enregistrements concernant un élément antérieur
    pub fn records_for_earlier<'a>(
        &'a self,
        id: &'a ElementId,
    ) -> impl Iterator<Item = &'a ChangeRecord> {
        self.records
            .iter()
            .filter(move |record| record.earlier.as_ref() == Some(id))
    }
}

/// Polygone prêt pour la comparaison
struct Prepared<'a> {
    element: &'a MapElement,
    shape: MultiPolygon,
    shares: Vec<(TypeKey, f64)>,
    hash: GeometryHash,
}

fn to_multi_polygon(geometry: &Geometry) -> MultiPolygon {
    match geometry {
        Geometry::Polygon(polygon) => MultiPolygon::new(vec![polygon.clone()]),
        Geometry::MultiPolygon(multi) => multi.clone(),
        Geometry::Rect(rect) => MultiPolygon::new(vec![rect.to_polygon()]),
        Geometry::Triangle(triangle) => MultiPolygon::new(vec![triangle.to_polygon()]),
        _ => MultiPolygon::new(Vec::new()),
    }
}

fn prepare<'a>(
    map: &'a MapData,
    options: &CompareOptions,
) -> Result<Vec<Prepared<'a>>, VegmapError> {
    map.iter()
        .filter(|element| element.kind() == ElementKind::Polygon)
        .map(|element| {
            Ok(Prepared {
                element,
                shape: to_multi_polygon(element.geometry()),
                shares: map.element_shares(element, options.level)?,
                hash: geometry_hash(element.geometry()),
            })
        })
        .collect()
}

/// Enregistrements produits pour un élément
#[derive(Default)]
struct Outcome {
    records: Vec<ChangeRecord>,
    diagnostics: CompareDiagnostics,
}

/// Comparateur de deux campagnes
#[derive(Debug)]
pub struct TemporalComparator<'a> {
    earlier: &'a MapData,
    later: &'a MapData,
    options: CompareOptions,
}

impl<'a> TemporalComparator<'a> {
    /// Valide les options et la compatibilité des deux cartes
    pub fn new(
        earlier: &'a MapData,
        later: &'a MapData,
        options: CompareOptions,
    ) -> Result<Self, VegmapError> {
        options.validate()?;
        if earlier.crs() != later.crs() {
            return Err(VegmapError::configuration(format!(
                "coordinate reference systems differ: {} (earlier) and {} (later)",
                earlier.crs(),
                later.crs()
            )));
        }
        Ok(Self {
            earlier,
            later,
            options,
        })
    }

    pub fn options(&self) -> &CompareOptions {
        &self.options
    }

    /// Calcule les enregistrements de changement et la synthèse
    ///
    /// # Errors
    ///
    /// Retourne `UnknownCode` si un code d'une des deux cartes n'est pas
    /// résolu par sa légende.
    pub fn compute(&self) -> Result<Comparison, VegmapError> {
        let earlier = prepare(self.earlier, &self.options)?;
        let later = prepare(self.later, &self.options)?;

        debug!(
            earlier = earlier.len(),
            later = later.len(),
            parallel = self.options.parallel,
            "Comparing campaigns"
        );

        let earlier_index = ElementIndex::build(
            earlier
                .iter()
                .enumerate()
                .map(|(position, p)| (position, p.element.geometry().as_ref())),
        );
        let later_index = ElementIndex::build(
            later
                .iter()
                .enumerate()
                .map(|(position, p)| (position, p.element.geometry().as_ref())),
        );

        let forward = |item: &Prepared| self.compare_earlier(item, &later, &later_index);
        let backward = |item: &Prepared| self.appeared(item, &earlier, &earlier_index);

        let (forward, backward): (Vec<Outcome>, Vec<Outcome>) = if self.options.parallel {
            (
                earlier.par_iter().map(forward).collect(),
                later.par_iter().map(backward).collect(),
            )
        } else {
            (
                earlier.iter().map(forward).collect(),
                later.iter().map(backward).collect(),
            )
        };

        let mut comparison = Comparison {
            earlier_label: self.earlier.campaign_label(),
            later_label: self.later.campaign_label(),
            ..Default::default()
        };
        for outcome in forward.into_iter().chain(backward) {
            comparison.diagnostics.merge(&outcome.diagnostics);
            comparison.records.extend(outcome.records);
        }
        summarize(&mut comparison);

        info!(
            records = comparison.records.len(),
            transition_area = comparison.transition_area(),
            disappeared_area = comparison.disappeared_area(),
            appeared_area = comparison.appeared_area(),
            slivers = comparison.diagnostics.slivers_discarded,
            "Comparison completed"
        );

        Ok(comparison)
    }

    /// Artefact: sous le seuil absolu, ou sous la tolérance relative de la
    /// plus petite des surfaces concernées
    fn is_sliver(&self, area: f64, reference_area: f64) -> bool {
        area <= 0.0
            || area < self.options.sliver_area_epsilon
            || area < self.options.relative_tolerance * reference_area
    }

    fn compare_earlier(
        &self,
        item: &Prepared,
        later: &[Prepared],
        later_index: &ElementIndex,
    ) -> Outcome {
        let mut outcome = Outcome::default();
        let mut rest = item.shape.clone();
        let element = item.element;

        let Some(bounds) = element.bounds() else {
            return outcome;
        };

        for position in later_index.candidates(&bounds) {
            let other = &later[position];
            outcome.diagnostics.pairs_tested += 1;

            let area = item.shape.intersection(&other.shape).unsigned_area();
            if area <= 0.0 {
                continue;
            }
            rest = rest.difference(&other.shape);

            if self.is_sliver(area, element.area().min(other.element.area())) {
                outcome.diagnostics.discard(area);
                continue;
            }

            outcome.records.push(ChangeRecord {
                kind: ChangeKind::Transition,
                earlier: Some(element.id().clone()),
                later: Some(other.element.id().clone()),
                area,
                earlier_proportion: Some(area / element.area()),
                later_proportion: Some(area / other.element.area()),
                before: item.shares.clone(),
                after: other.shares.clone(),
                same_id: element.id() == other.element.id(),
                same_geometry: item.hash == other.hash,
            });
        }

        let remaining = rest.unsigned_area();
        if self.is_sliver(remaining, element.area()) {
            if remaining > 0.0 {
                outcome.diagnostics.discard(remaining);
            }
        } else {
            outcome.records.push(ChangeRecord {
                kind: ChangeKind::Disappeared,
                earlier: Some(element.id().clone()),
                later: None,
                area: remaining,
                earlier_proportion: Some(remaining / element.area()),
                later_proportion: None,
                before: item.shares.clone(),
                after: Vec::new(),
                same_id: false,
                same_geometry: false,
            });
        }

        outcome
    }

    fn appeared(&self, item: &Prepared, earlier: &[Prepared], earlier_index: &ElementIndex) -> Outcome {
        let mut outcome = Outcome::default();
        let element = item.element;
        let Some(bounds) = element.bounds() else {
            return outcome;
        };

        let mut rest = item.shape.clone();
        for position in earlier_index.candidates(&bounds) {
            rest = rest.difference(&earlier[position].shape);
        }

        let remaining = rest.unsigned_area();
        if self.is_sliver(remaining, element.area()) {
            if remaining > 0.0 {
                outcome.diagnostics.discard(remaining);
            }
            return outcome;
        }

        outcome.records.push(ChangeRecord {
            kind: ChangeKind::Appeared,
            earlier: None,
            later: Some(element.id().clone()),
            area: remaining,
            earlier_proportion: None,
            later_proportion: Some(remaining / element.area()),
            before: Vec::new(),
            after: item.shares.clone(),
            same_id: false,
            same_geometry: false,
        });
        outcome
    }
}

/// Répartit chaque surface entre les couples de types, parts multipliées
fn summarize(comparison: &mut Comparison) {
    for record in &comparison.records {
        match record.kind {
            ChangeKind::Transition => {
                for (from, before) in &record.before {
                    for (to, after) in &record.after {
                        *comparison
                            .transitions
                            .entry((from.clone(), to.clone()))
                            .or_insert(0.0) += record.area * before * after;
                    }
                }
            }
            ChangeKind::Disappeared => {
                for (from, share) in &record.before {
                    *comparison.disappeared.entry(from.clone()).or_insert(0.0) +=
                        record.area * share;
                }
            }
            ChangeKind::Appeared => {
                for (to, share) in &record.after {
                    *comparison.appeared.entry(to.clone()).or_insert(0.0) += record.area * share;
                }
            }
        }
    }
}
