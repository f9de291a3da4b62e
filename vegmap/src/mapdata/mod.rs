//! Carte jointe d'une campagne de relevé
//!
//! `MapData` réunit une source géométrique et une table de végétation sur
//! l'identifiant d'élément. La jointure est une comparaison complète des deux
//! ensembles d'identifiants: toutes les incohérences sont collectées dans un
//! `JoinReport` avant de décider de la validité de la carte.
//!
//! La table jointe est immuable et partagée (`Arc`) entre toutes les
//! sélections dérivées par filtrage; une sélection n'est qu'une liste de
//! positions dans cette table.

pub mod export;
pub mod query;
pub mod summary;

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, OnceLock};

use geo::{Area, BoundingRect, Geometry, Rect};
use tracing::{debug, info, warn};

use crate::classify::{ClassificationDescription, VegetationClassifier};
use crate::config::BuildOptions;
use crate::error::{JoinError, VegmapError};
use crate::index::ElementIndex;
use crate::legend::Legend;
use crate::repair::{geometry_type_name, repair_geometry};
use crate::report::{IssueKind, IssueLevel, JoinReport};
use crate::source::{AttributeSource, GeometrySource};
use crate::types::{Crs, ElementId, ElementKind, VegetationRecord};

pub use query::{SpatialPredicate, TypeFilter};

/// Tolérance sur la somme des proportions d'un élément
const PROPORTION_TOLERANCE: f64 = 1e-9;

/// Un élément de la carte: géométrie et classification
#[derive(Debug)]
pub struct MapElement {
    id: ElementId,
    geometry: Arc<Geometry>,
    kind: ElementKind,
    records: Vec<VegetationRecord>,
    survey_year: Option<u16>,
    orphan: bool,
    area: f64,
    bounds: Option<Rect>,
    resolved: OnceLock<Vec<Arc<ClassificationDescription>>>,
}

impl MapElement {
    fn new(
        id: ElementId,
        geometry: Arc<Geometry>,
        kind: ElementKind,
        records: Vec<VegetationRecord>,
        survey_year: Option<u16>,
        orphan: bool,
    ) -> Self {
        let area = match kind {
            ElementKind::Polygon => geometry.unsigned_area(),
            ElementKind::Line => 0.0,
        };
        let bounds = geometry.bounding_rect();
        Self {
            id,
            geometry,
            kind,
            records,
            survey_year,
            orphan,
            area,
            bounds,
            resolved: OnceLock::new(),
        }
    }

    pub fn id(&self) -> &ElementId {
        &self.id
    }

    pub fn geometry(&self) -> &Arc<Geometry> {
        &self.geometry
    }

    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    /// Entrées de classification, dans l'ordre de la table
    pub fn records(&self) -> &[VegetationRecord] {
        &self.records
    }

    pub fn survey_year(&self) -> Option<u16> {
        self.survey_year
    }

    /// Géométrie sans classification
    pub fn is_orphan(&self) -> bool {
        self.orphan
    }

    /// Surface en unités de la projection (nulle pour une ligne)
    pub fn area(&self) -> f64 {
        self.area
    }

    /// Surface en hectares
    pub fn area_ha(&self) -> f64 {
        self.area / 10_000.0
    }

    pub fn bounds(&self) -> Option<Rect> {
        self.bounds
    }

    /// Résout les codes de l'élément; le résultat est mémorisé sur l'élément
    pub fn classification(
        &self,
        classifier: &VegetationClassifier,
    ) -> Result<Vec<Arc<ClassificationDescription>>, VegmapError> {
        if let Some(resolved) = self.resolved.get() {
            return Ok(resolved.clone());
        }

        let mut resolved = Vec::with_capacity(self.records.len());
        for record in &self.records {
            let description = classifier.resolve(&record.type_code).map_err(|err| match err {
                VegmapError::UnknownCode { code, legend, .. } => VegmapError::UnknownCode {
                    code,
                    legend,
                    element: Some(self.id.clone()),
                },
                other => other,
            })?;
            resolved.push(description);
        }

        let _ = self.resolved.set(resolved.clone());
        Ok(resolved)
    }
}

/// Table jointe partagée par toutes les sélections d'une carte
struct Joined {
    elements: Vec<MapElement>,
    crs: Crs,
    classifier: VegetationClassifier,
    options: BuildOptions,
    report: JoinReport,
    geometry_source: Arc<dyn GeometrySource>,
    attribute_source: Arc<dyn AttributeSource>,
    index: OnceLock<ElementIndex>,
}

impl Joined {
    fn index(&self) -> &ElementIndex {
        self.index.get_or_init(|| {
            ElementIndex::build(
                self.elements
                    .iter()
                    .enumerate()
                    .map(|(position, element)| (position, element.geometry.as_ref())),
            )
        })
    }
}

/// Carte jointe d'une campagne, ou sélection d'éléments de cette carte
#[derive(Clone)]
pub struct MapData {
    joined: Arc<Joined>,
    selection: Arc<[usize]>,
}

impl fmt::Debug for MapData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapData")
            .field("elements", &self.selection.len())
            .field("joined", &self.joined.elements.len())
            .field("crs", &self.joined.crs)
            .field("legend", &self.joined.classifier.legend().version())
            .finish()
    }
}

impl MapData {
    /// Joint une source géométrique et une table de végétation
    ///
    /// # Errors
    ///
    /// Retourne `JoinError` si la jointure présente au moins une erreur
    /// d'intégrité; l'erreur porte le rapport complet et la carte construite
    /// malgré tout.
    pub fn build(
        geometry_source: Arc<dyn GeometrySource>,
        attribute_source: Arc<dyn AttributeSource>,
        legend: Arc<Legend>,
        options: BuildOptions,
    ) -> Result<MapData, JoinError> {
        Self::build_with_classifier(
            geometry_source,
            attribute_source,
            VegetationClassifier::new(legend),
            options,
        )
    }

    /// Variante de `build` prenant les sources par valeur
    pub fn from_sources<G, A>(
        geometry_source: G,
        attribute_source: A,
        legend: Arc<Legend>,
        options: BuildOptions,
    ) -> Result<MapData, JoinError>
    where
        G: GeometrySource + 'static,
        A: AttributeSource + 'static,
    {
        Self::build(
            Arc::new(geometry_source),
            Arc::new(attribute_source),
            legend,
            options,
        )
    }

    /// Jointure avec un classificateur existant (cache partagé)
    pub fn build_with_classifier(
        geometry_source: Arc<dyn GeometrySource>,
        attribute_source: Arc<dyn AttributeSource>,
        classifier: VegetationClassifier,
        options: BuildOptions,
    ) -> Result<MapData, JoinError> {
        let geometry_ids = geometry_source.element_ids();
        let attribute_ids = attribute_source.element_ids();
        let mut report = JoinReport::default();
        let mut elements = Vec::with_capacity(geometry_ids.len());

        debug!(
            geometries = geometry_ids.len(),
            attributes = attribute_ids.len(),
            legend = classifier.legend().version(),
            "Joining sources"
        );

        let mut seen = BTreeSet::new();
        for (id, geometry) in geometry_source.all() {
            if !seen.insert(id.clone()) {
                warn!(element = %id, "Duplicate geometry, keeping the first one");
                report.record(IssueLevel::Error, &id, IssueKind::DuplicateGeometry);
                continue;
            }

            if ElementKind::from_geometry(&geometry).is_none() {
                report.record(
                    IssueLevel::Error,
                    &id,
                    IssueKind::UnsupportedGeometry {
                        geometry_type: geometry_type_name(&geometry).to_string(),
                    },
                );
                continue;
            }

            // Les sources externes ne passent pas par la réparation d'entrée
            let geometry = match repair_geometry(&id, geometry.as_ref().clone()) {
                Ok(repaired) if repaired.actions.is_empty() => geometry,
                Ok(repaired) => Arc::new(repaired.geometry),
                Err(err) => {
                    let reason = match err {
                        VegmapError::InvalidGeometry { reason, .. } => reason,
                        other => other.to_string(),
                    };
                    warn!(element = %id, reason = %reason, "Invalid geometry skipped");
                    report.record(IssueLevel::Error, &id, IssueKind::InvalidGeometry { reason });
                    continue;
                }
            };
            let Some(kind) = ElementKind::from_geometry(&geometry) else {
                continue;
            };

            let records = if attribute_ids.contains(&id) {
                match attribute_source.records(&id) {
                    Ok(records) => Some(records),
                    Err(err) => {
                        warn!(element = %id, error = %err, "Failed to read vegetation records");
                        report.record(
                            IssueLevel::Error,
                            &id,
                            IssueKind::AttributeRead {
                                reason: err.to_string(),
                            },
                        );
                        elements.push(MapElement::new(id, geometry, kind, Vec::new(), None, true));
                        continue;
                    }
                }
            } else {
                None
            };

            let element = match records {
                Some(records) => {
                    validate_records(&id, &records, &classifier, &mut report);
                    report.joined += 1;
                    MapElement::new(
                        id.clone(),
                        geometry,
                        kind,
                        records,
                        attribute_source.survey_year(&id),
                        false,
                    )
                }
                None => {
                    warn!(element = %id, "Geometry without vegetation records");
                    report.record(IssueLevel::Warning, &id, IssueKind::OrphanGeometry);
                    MapElement::new(id, geometry, kind, Vec::new(), None, true)
                }
            };
            elements.push(element);
        }

        let orphan_level = if options.strict {
            IssueLevel::Error
        } else {
            IssueLevel::Warning
        };
        for id in attribute_ids
            .iter()
            .filter(|id| !geometry_ids.contains(*id) && !seen.contains(*id))
        {
            warn!(element = %id, "Vegetation records without geometry");
            report.record(orphan_level, id, IssueKind::OrphanAttribute);
            if let Ok(records) = attribute_source.records(id) {
                validate_records(id, &records, &classifier, &mut report);
            }
        }

        elements.sort_by(|a, b| a.id.cmp(&b.id));
        report.issues.sort_by(|a, b| a.element.cmp(&b.element));

        info!(
            joined = report.joined,
            orphan_geometries = report.orphan_geometries.len(),
            orphan_attributes = report.orphan_attributes.len(),
            errors = report.errors().count(),
            warnings = report.warnings().count(),
            "Join completed"
        );

        let selection: Arc<[usize]> = (0..elements.len()).collect();
        let map = MapData {
            joined: Arc::new(Joined {
                elements,
                crs: geometry_source.crs(),
                classifier,
                options,
                report,
                geometry_source,
                attribute_source,
                index: OnceLock::new(),
            }),
            selection,
        };

        if map.joined.report.has_errors() {
            return Err(JoinError {
                report: map.joined.report.clone(),
                partial: map,
            });
        }
        Ok(map)
    }

    /// Nouvelle sélection sur la même table jointe (positions triées)
    fn with_selection(&self, positions: Vec<usize>) -> MapData {
        MapData {
            joined: Arc::clone(&self.joined),
            selection: positions.into(),
        }
    }

    fn contains_position(&self, position: usize) -> bool {
        self.selection.binary_search(&position).is_ok()
    }
}

/// Contrôle les entrées d'un élément: proportions et codes
fn validate_records(
    id: &ElementId,
    records: &[VegetationRecord],
    classifier: &VegetationClassifier,
    report: &mut JoinReport,
) {
    let mut total = 0.0;
    let mut unknown = BTreeSet::new();

    for record in records {
        if let Some(value) = record.proportion {
            if !value.is_finite() || value < 0.0 {
                report.record(IssueLevel::Error, id, IssueKind::InvalidProportion { value });
            } else {
                total += value;
            }
        }

        if classifier.resolve(&record.type_code).is_err() && unknown.insert(&record.type_code) {
            report.record(
                IssueLevel::Error,
                id,
                IssueKind::UnknownCode {
                    code: record.type_code.clone(),
                },
            );
        }
    }

    if total > 100.0 + PROPORTION_TOLERANCE {
        report.record(IssueLevel::Error, id, IssueKind::ProportionSum { total });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceKind;
    use crate::legend::LegendEntry;
    use crate::source::{MemoryAttributeSource, MemoryGeometrySource};
    use geo::{LineString, Polygon};

    fn square(x: f64, y: f64, size: f64) -> Geometry {
        Geometry::Polygon(Polygon::new(
            LineString::from(vec![
                (x, y),
                (x + size, y),
                (x + size, y + size),
                (x, y + size),
                (x, y),
            ]),
            vec![],
        ))
    }

    fn legend() -> Arc<Legend> {
        Arc::new(Legend::new(
            "test",
            ["A", "B"]
                .iter()
                .map(|code| (code.to_string(), LegendEntry::new(*code))),
        ))
    }

    fn geometries(ids: &[i64]) -> MemoryGeometrySource {
        let mut source = MemoryGeometrySource::new(Crs::default());
        for (i, id) in ids.iter().enumerate() {
            source.insert(*id, square(i as f64 * 20.0, 0.0, 10.0)).unwrap();
        }
        source
    }

    #[test]
    fn test_clean_join() {
        let attributes = MemoryAttributeSource::from_rows(vec![
            (1, VegetationRecord::new("A")),
            (2, VegetationRecord::new("B").with_proportion(60.0)),
            (2, VegetationRecord::new("A").with_proportion(40.0)),
        ]);
        let map = MapData::from_sources(geometries(&[2, 1]), attributes, legend(), BuildOptions::default())
            .unwrap();

        assert!(map.report().is_clean());
        assert_eq!(map.report().joined, 2);
        assert_eq!(map.element_ids(), vec![&ElementId::from(1), &ElementId::from(2)]);
    }

    #[test]
    fn test_orphan_geometry_is_kept() {
        let attributes = MemoryAttributeSource::from_rows(vec![(1, VegetationRecord::new("A"))]);
        let map = MapData::from_sources(geometries(&[1, 2]), attributes, legend(), BuildOptions::default())
            .unwrap();

        assert_eq!(map.len(), 2);
        assert_eq!(map.report().orphan_geometries, vec![ElementId::from(2)]);
        assert!(map.element(&ElementId::from(2)).unwrap().is_orphan());
        assert!(!map.report().has_errors());
    }

    #[test]
    fn test_orphan_attribute_strict_and_lenient() {
        let rows = vec![(1, VegetationRecord::new("A")), (5, VegetationRecord::new("B"))];

        let err = MapData::from_sources(
            geometries(&[1]),
            MemoryAttributeSource::from_rows(rows.clone()),
            legend(),
            BuildOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err.element_ids(), vec![&ElementId::from(5)]);
        assert_eq!(err.partial.len(), 1);
        assert!(err.to_string().contains("element 5"));

        let map = MapData::from_sources(
            geometries(&[1]),
            MemoryAttributeSource::from_rows(rows),
            legend(),
            BuildOptions::lenient(),
        )
        .unwrap();
        assert_eq!(map.report().warnings().count(), 1);
        assert_eq!(map.report().orphan_attributes, vec![ElementId::from(5)]);
    }

    #[test]
    fn test_proportion_sum_flagged() {
        let attributes = MemoryAttributeSource::from_rows(vec![
            (1, VegetationRecord::new("A").with_proportion(40.0)),
            (1, VegetationRecord::new("B").with_proportion(40.0)),
            (1, VegetationRecord::new("A").with_proportion(30.0)),
        ]);
        let err = MapData::from_sources(geometries(&[1]), attributes, legend(), BuildOptions::default())
            .unwrap_err();

        assert_eq!(err.report.errors().count(), 1);
        assert!(matches!(
            err.report.issues[0].kind,
            IssueKind::ProportionSum { total } if (total - 110.0).abs() < 1e-9
        ));
    }

    #[test]
    fn test_negative_proportion_flagged() {
        let attributes = MemoryAttributeSource::from_rows(vec![(
            1,
            VegetationRecord::new("A").with_proportion(-10.0),
        )]);
        let err = MapData::from_sources(geometries(&[1]), attributes, legend(), BuildOptions::default())
            .unwrap_err();
        assert!(matches!(
            err.report.issues[0].kind,
            IssueKind::InvalidProportion { .. }
        ));
    }

    #[test]
    fn test_unknown_code_reported_once_per_element() {
        let attributes = MemoryAttributeSource::from_rows(vec![
            (1, VegetationRecord::new("Z")),
            (1, VegetationRecord::new("Z")),
            (2, VegetationRecord::new("Z")),
        ]);
        let err = MapData::from_sources(geometries(&[1, 2]), attributes, legend(), BuildOptions::lenient())
            .unwrap_err();

        let unknown: Vec<&ElementId> = err
            .report
            .errors()
            .filter(|issue| matches!(issue.kind, IssueKind::UnknownCode { .. }))
            .map(|issue| &issue.element)
            .collect();
        assert_eq!(unknown, vec![&ElementId::from(1), &ElementId::from(2)]);
    }

    #[test]
    fn test_element_classification_cached() {
        let attributes = MemoryAttributeSource::from_rows(vec![
            (1, VegetationRecord::new("B")),
            (1, VegetationRecord::new("A")),
        ]);
        let map = MapData::from_sources(geometries(&[1]), attributes, legend(), BuildOptions::default())
            .unwrap();

        let first = map.classification(&ElementId::from(1)).unwrap();
        let second = map.classification(&ElementId::from(1)).unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].code, "B");
        assert!(Arc::ptr_eq(&first[0], &second[0]));
    }

    /// Source géométrique externe, sans validation à l'insertion
    struct RawGeometries(Vec<(ElementId, Arc<Geometry>)>);

    impl GeometrySource for RawGeometries {
        fn crs(&self) -> Crs {
            Crs::default()
        }

        fn element_ids(&self) -> BTreeSet<ElementId> {
            self.0.iter().map(|(id, _)| id.clone()).collect()
        }

        fn geometry(&self, id: &ElementId) -> Result<Arc<Geometry>, VegmapError> {
            self.0
                .iter()
                .find(|(candidate, _)| candidate == id)
                .map(|(_, geometry)| geometry.clone())
                .ok_or_else(|| VegmapError::not_found(id, SourceKind::Geometry))
        }

        fn all(&self) -> Box<dyn Iterator<Item = (ElementId, Arc<Geometry>)> + '_> {
            Box::new(self.0.iter().cloned())
        }
    }

    /// Table listant un identifiant qu'elle ne sait pas lire
    struct BrokenAttributes {
        inner: MemoryAttributeSource,
        broken: ElementId,
    }

    impl AttributeSource for BrokenAttributes {
        fn element_ids(&self) -> BTreeSet<ElementId> {
            let mut ids = self.inner.element_ids();
            ids.insert(self.broken.clone());
            ids
        }

        fn records(&self, id: &ElementId) -> Result<Vec<VegetationRecord>, VegmapError> {
            if id == &self.broken {
                return Err(VegmapError::not_found(id, SourceKind::Attributes));
            }
            self.inner.records(id)
        }

        fn all(&self) -> Box<dyn Iterator<Item = (ElementId, Vec<VegetationRecord>)> + '_> {
            self.inner.all()
        }
    }

    fn raw(elements: Vec<(i64, Geometry)>) -> Arc<dyn GeometrySource> {
        Arc::new(RawGeometries(
            elements
                .into_iter()
                .map(|(id, geometry)| (ElementId::from(id), Arc::new(geometry)))
                .collect(),
        ))
    }

    fn attributes_for(ids: &[i64]) -> Arc<dyn AttributeSource> {
        Arc::new(MemoryAttributeSource::from_rows(
            ids.iter().map(|id| (*id, VegetationRecord::new("A"))).collect::<Vec<_>>(),
        ))
    }

    #[test]
    fn test_external_rect_normalized_to_polygon() {
        let rect = Rect::new((0.0, 0.0), (10.0, 10.0));
        let map = MapData::build(
            raw(vec![(1, Geometry::Rect(rect))]),
            attributes_for(&[1]),
            legend(),
            BuildOptions::default(),
        )
        .unwrap();

        let element = map.element(&ElementId::from(1)).unwrap();
        assert!(matches!(element.geometry().as_ref(), Geometry::Polygon(_)));
        assert_eq!(element.kind(), ElementKind::Polygon);
        assert!((element.area() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_external_invalid_geometry_skipped() {
        let flat = Geometry::Polygon(Polygon::new(
            LineString::from(vec![(0.0, 0.0), (10.0, 0.0), (0.0, 0.0)]),
            vec![],
        ));
        let err = MapData::build(
            raw(vec![(1, square(0.0, 0.0, 10.0)), (2, flat)]),
            attributes_for(&[1, 2]),
            legend(),
            BuildOptions::lenient(),
        )
        .unwrap_err();

        assert_eq!(err.partial.element_ids(), vec![&ElementId::from(1)]);
        let issue = err.report.errors().next().unwrap();
        assert_eq!(issue.element, ElementId::from(2));
        assert!(matches!(issue.kind, IssueKind::InvalidGeometry { .. }));
        assert!(err.report.orphan_attributes.is_empty());
    }

    #[test]
    fn test_duplicate_geometry_keeps_first() {
        let err = MapData::build(
            raw(vec![(1, square(0.0, 0.0, 10.0)), (1, square(50.0, 0.0, 20.0))]),
            attributes_for(&[1]),
            legend(),
            BuildOptions::default(),
        )
        .unwrap_err();

        assert_eq!(err.partial.len(), 1);
        let element = err.partial.element(&ElementId::from(1)).unwrap();
        assert!((element.area() - 100.0).abs() < 1e-9);
        assert_eq!(err.report.joined, 1);
        assert_eq!(err.report.errors().count(), 1);
        assert_eq!(err.report.issues[0].kind, IssueKind::DuplicateGeometry);
    }

    #[test]
    fn test_attribute_read_failure_is_not_orphan() {
        let attributes = Arc::new(BrokenAttributes {
            inner: MemoryAttributeSource::from_rows(vec![(1, VegetationRecord::new("A"))]),
            broken: ElementId::from(2),
        });
        let err = MapData::build(
            Arc::new(geometries(&[1, 2])),
            attributes,
            legend(),
            BuildOptions::default(),
        )
        .unwrap_err();

        assert!(err.report.orphan_geometries.is_empty());
        let issue = err.report.errors().next().unwrap();
        assert_eq!(issue.element, ElementId::from(2));
        assert!(matches!(issue.kind, IssueKind::AttributeRead { .. }));
        assert_eq!(err.partial.len(), 2);
    }

    #[test]
    fn test_map_data_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<MapData>();
    }
}
