//! Échantillonnage d'une carte sur une grille régulière
//!
//! La grille couvre le rectangle englobant de la carte, bornes alignées sur
//! des multiples du pas. Seuls les points situés strictement à l'intérieur
//! d'un polygone sont retenus. Deux campagnes échantillonnées sur la même
//! grille donnent un décompte de transitions en nombre de points.

use std::collections::BTreeMap;

use geo::{Coord, Rect};
use tracing::debug;

use crate::classify::TypeLevel;
use crate::error::VegmapError;
use crate::mapdata::{MapData, MapElement};
use crate::types::{ElementId, TypeKey};

/// Pas par défaut, en unités de la projection
pub const DEFAULT_STEP: f64 = 100.0;

/// Nombre maximal de points d'une grille
pub const MAX_POINTS: usize = 50_000_000;

/// Point de grille tombant dans un élément
#[derive(Debug, Clone, PartialEq)]
pub struct GridSample {
    pub point: Coord,
    pub element: ElementId,
}

/// Grille régulière d'échantillonnage
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridSampler {
    step: f64,
}

impl Default for GridSampler {
    fn default() -> Self {
        Self { step: DEFAULT_STEP }
    }
}

impl GridSampler {
    pub fn new(step: f64) -> Result<Self, VegmapError> {
        if !step.is_finite() || step <= 0.0 {
            return Err(VegmapError::configuration(format!(
                "grid step must be a finite value > 0, got {}",
                step
            )));
        }
        Ok(Self { step })
    }

    pub fn step(&self) -> f64 {
        self.step
    }

    /// Bornes de grille: minimum aligné vers le bas, maximum aligné vers le
    /// haut et exclu
    pub fn snap(&self, bounds: Rect) -> Rect {
        let floor = |v: f64| (v / self.step).floor() * self.step;
        Rect::new(
            (floor(bounds.min().x), floor(bounds.min().y)),
            (
                floor(bounds.max().x) + self.step,
                floor(bounds.max().y) + self.step,
            ),
        )
    }

    /// Points de la grille couvrant `bounds`, par lignes
    ///
    /// # Errors
    ///
    /// `Configuration` si le pas donne plus de `MAX_POINTS` points sur
    /// l'emprise.
    pub fn points(&self, bounds: Rect) -> Result<Vec<Coord>, VegmapError> {
        let grid = self.snap(bounds);
        let columns = ((grid.max().x - grid.min().x) / self.step).round();
        let rows = ((grid.max().y - grid.min().y) / self.step).round();

        let count = (columns.is_finite() && rows.is_finite())
            .then(|| (columns as usize).checked_mul(rows as usize))
            .flatten()
            .filter(|count| *count <= MAX_POINTS)
            .ok_or_else(|| {
                VegmapError::configuration(format!(
                    "grid step {} gives {} x {} points over the map extent (at most {} allowed)",
                    self.step, columns, rows, MAX_POINTS
                ))
            })?;
        let (columns, rows) = (columns as usize, rows as usize);

        let mut points = Vec::with_capacity(count);
        for row in 0..rows {
            for column in 0..columns {
                points.push(Coord {
                    x: grid.min().x + column as f64 * self.step,
                    y: grid.min().y + row as f64 * self.step,
                });
            }
        }
        Ok(points)
    }

    /// Élément contenant chaque point de grille de la carte
    pub fn sample(&self, map: &MapData) -> Result<Vec<GridSample>, VegmapError> {
        let Some(bounds) = map.polygons().bounds() else {
            return Ok(Vec::new());
        };

        let samples: Vec<GridSample> = self
            .points(bounds)?
            .into_iter()
            .filter_map(|point| {
                map.elements_at(point).first().map(|element| GridSample {
                    point,
                    element: element.id().clone(),
                })
            })
            .collect();

        debug!(samples = samples.len(), step = self.step, "Map sampled");
        Ok(samples)
    }

    /// Transitions entre deux campagnes, en nombre de points de grille
    ///
    /// Chaque point reçoit le type dominant de l'élément qui le contient;
    /// un point hors de toute carte est ignoré, hors d'une seule carte il
    /// compte comme non classé de ce côté.
    pub fn sample_transitions(
        &self,
        earlier: &MapData,
        later: &MapData,
        level: TypeLevel,
    ) -> Result<BTreeMap<(TypeKey, TypeKey), usize>, VegmapError> {
        let bounds = match (earlier.polygons().bounds(), later.polygons().bounds()) {
            (Some(a), Some(b)) => Rect::new(
                (a.min().x.min(b.min().x), a.min().y.min(b.min().y)),
                (a.max().x.max(b.max().x), a.max().y.max(b.max().y)),
            ),
            (Some(bounds), None) | (None, Some(bounds)) => bounds,
            (None, None) => return Ok(BTreeMap::new()),
        };

        let mut counts = BTreeMap::new();
        for point in self.points(bounds)? {
            let before = earlier.elements_at(point).first().copied();
            let after = later.elements_at(point).first().copied();
            if before.is_none() && after.is_none() {
                continue;
            }

            let key = (
                dominant_type(earlier, before, level)?,
                dominant_type(later, after, level)?,
            );
            *counts.entry(key).or_insert(0) += 1;
        }
        Ok(counts)
    }
}

/// Type occupant la plus grande part de l'élément
fn dominant_type(
    map: &MapData,
    element: Option<&MapElement>,
    level: TypeLevel,
) -> Result<TypeKey, VegmapError> {
    let Some(element) = element else {
        return Ok(TypeKey::Unclassified);
    };

    let shares = map.element_shares(element, level)?;
    Ok(shares
        .into_iter()
        .fold(None, |best: Option<(TypeKey, f64)>, (key, share)| match best {
            Some((_, best_share)) if best_share >= share => best,
            _ => Some((key, share)),
        })
        .map(|(key, _)| key)
        .unwrap_or(TypeKey::Unclassified))
}
