//! Requêtes sur une carte: accès par identifiant, filtres attributaires et
//! spatiaux
//!
//! Chaque filtre renvoie une nouvelle `MapData` partageant la table jointe et
//! la légende; seule la liste des positions sélectionnées est nouvelle. Les
//! filtres sont idempotents et composables.

use std::sync::Arc;

use geo::{BoundingRect, Contains, Coord, Geometry, Intersects, Point, Rect, Relate};

use super::{MapData, MapElement};
use crate::classify::{ClassificationDescription, VegetationClassifier};
use crate::config::BuildOptions;
use crate::error::{SourceKind, VegmapError};
use crate::legend::Legend;
use crate::report::JoinReport;
use crate::source::{AttributeSource, GeometrySource};
use crate::types::{Crs, ElementId, ElementKind};

/// Filtre sur les codes de végétation d'un élément
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeFilter {
    /// Au moins une entrée porte exactement ce code
    Code(String),
    /// Au moins une entrée a un code commençant par ce préfixe
    Prefix(String),
}

impl TypeFilter {
    pub fn matches(&self, element: &MapElement) -> bool {
        element.records().iter().any(|record| match self {
            TypeFilter::Code(code) => &record.type_code == code,
            TypeFilter::Prefix(prefix) => record.type_code.starts_with(prefix.as_str()),
        })
    }
}

/// Prédicat spatial entre un élément et la géométrie de requête
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpatialPredicate {
    /// L'élément intersecte la géométrie
    Intersects,
    /// L'élément est contenu dans la géométrie
    Within,
    /// L'élément contient la géométrie
    Contains,
}

impl SpatialPredicate {
    pub fn evaluate(&self, element: &Geometry, query: &Geometry) -> bool {
        match self {
            SpatialPredicate::Intersects => element.intersects(query),
            SpatialPredicate::Within => element.relate(query).is_within(),
            SpatialPredicate::Contains => element.relate(query).is_contains(),
        }
    }
}

impl MapData {
    /// Nombre d'éléments sélectionnés
    pub fn len(&self) -> usize {
        self.selection.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selection.is_empty()
    }

    /// Éléments sélectionnés, dans l'ordre des identifiants
    pub fn iter(&self) -> impl Iterator<Item = &MapElement> + '_ {
        self.selection
            .iter()
            .map(move |&position| &self.joined.elements[position])
    }

    pub fn element_ids(&self) -> Vec<&ElementId> {
        self.iter().map(MapElement::id).collect()
    }

    /// Élément par identifiant, `NotFound` hors sélection
    pub fn element(&self, id: &ElementId) -> Result<&MapElement, VegmapError> {
        self.position(id)
            .map(|position| &self.joined.elements[position])
            .ok_or_else(|| VegmapError::not_found(id, SourceKind::Map))
    }

    pub fn contains(&self, id: &ElementId) -> bool {
        self.position(id).is_some()
    }

    fn position(&self, id: &ElementId) -> Option<usize> {
        let elements = &self.joined.elements;
        elements
            .binary_search_by(|element| element.id().cmp(id))
            .ok()
            .filter(|&position| self.contains_position(position))
    }

    /// Classification résolue d'un élément
    pub fn classification(
        &self,
        id: &ElementId,
    ) -> Result<Vec<Arc<ClassificationDescription>>, VegmapError> {
        self.element(id)?.classification(&self.joined.classifier)
    }

    /// Sous-ensemble des éléments portant un code correspondant au filtre
    pub fn filter_by_type(&self, filter: &TypeFilter) -> MapData {
        self.select(|element| filter.matches(element))
    }

    /// Sous-ensemble des éléments vérifiant le prédicat avec `geometry`
    pub fn filter_by_spatial(&self, geometry: &Geometry, predicate: SpatialPredicate) -> MapData {
        let Some(rect) = geometry.bounding_rect() else {
            return self.with_selection(Vec::new());
        };

        let positions = self
            .joined
            .index()
            .candidates(&rect)
            .into_iter()
            .filter(|&position| self.contains_position(position))
            .filter(|&position| {
                predicate.evaluate(self.joined.elements[position].geometry(), geometry)
            })
            .collect();
        self.with_selection(positions)
    }

    /// Polygones sélectionnés contenant strictement le point
    pub fn elements_at(&self, coord: Coord) -> Vec<&MapElement> {
        let point = Point::from(coord);
        self.joined
            .index()
            .at_point(coord)
            .into_iter()
            .filter(|&position| self.contains_position(position))
            .map(|position| &self.joined.elements[position])
            .filter(|element| {
                element.kind() == ElementKind::Polygon && element.geometry().contains(&point)
            })
            .collect()
    }

    /// Éléments surfaciques
    pub fn polygons(&self) -> MapData {
        self.select(|element| element.kind() == ElementKind::Polygon)
    }

    /// Éléments linéaires
    pub fn lines(&self) -> MapData {
        self.select(|element| element.kind() == ElementKind::Line)
    }

    /// Sous-ensemble des éléments vérifiant un prédicat quelconque
    pub fn select<F>(&self, predicate: F) -> MapData
    where
        F: Fn(&MapElement) -> bool,
    {
        let positions = self
            .selection
            .iter()
            .copied()
            .filter(|&position| predicate(&self.joined.elements[position]))
            .collect();
        self.with_selection(positions)
    }

    pub fn classifier(&self) -> &VegetationClassifier {
        &self.joined.classifier
    }

    pub fn legend(&self) -> &Arc<Legend> {
        self.joined.classifier.legend()
    }

    pub fn crs(&self) -> Crs {
        self.joined.crs
    }

    /// Rapport de jointure de la carte complète
    pub fn report(&self) -> &JoinReport {
        &self.joined.report
    }

    pub fn options(&self) -> &BuildOptions {
        &self.joined.options
    }

    pub fn geometry_source(&self) -> &Arc<dyn GeometrySource> {
        &self.joined.geometry_source
    }

    pub fn attribute_source(&self) -> &Arc<dyn AttributeSource> {
        &self.joined.attribute_source
    }

    /// Surface totale des éléments sélectionnés
    pub fn total_area(&self) -> f64 {
        self.iter().map(MapElement::area).sum()
    }

    /// Rectangle englobant des éléments sélectionnés
    pub fn bounds(&self) -> Option<Rect> {
        self.iter()
            .filter_map(MapElement::bounds)
            .reduce(|a, b| {
                Rect::new(
                    (a.min().x.min(b.min().x), a.min().y.min(b.min().y)),
                    (a.max().x.max(b.max().x), a.max().y.max(b.max().y)),
                )
            })
    }

    /// Années de relevé extrêmes
    pub fn years(&self) -> Option<(u16, u16)> {
        self.iter()
            .filter_map(MapElement::survey_year)
            .fold(None, |range, year| match range {
                None => Some((year, year)),
                Some((min, max)) => Some((min.min(year), max.max(year))),
            })
    }

    /// Libellé de la campagne: "YYYY", "YYYY-YYYY" ou "0000" sans dates
    pub fn campaign_label(&self) -> String {
        match self.years() {
            None => "0000".to_string(),
            Some((min, max)) if min == max => format!("{:04}", min),
            Some((min, max)) => format!("{:04}-{:04}", min, max),
        }
    }
}
