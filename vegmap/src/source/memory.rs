//! Sources et écrivain en mémoire

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use geo::Geometry;
use tracing::debug;

use super::{AttributeSource, FeatureWriter, GeometrySource, WriteRejection};
use crate::error::{SourceKind, VegmapError};
use crate::mapdata::export::{records_from_flat, survey_year_from_flat};
use crate::repair::{self, geometry_type_name, RepairAction};
use crate::types::{Crs, ElementId, ElementKind, FlatAttributes, VegetationRecord};

#[derive(Debug, Clone)]
struct GeometryFeature {
    geometry: Arc<Geometry>,
    attributes: HashMap<String, String>,
}

/// Source géométrique en mémoire, validée à l'insertion
#[derive(Debug, Clone, Default)]
pub struct MemoryGeometrySource {
    crs: Crs,
    features: BTreeMap<ElementId, GeometryFeature>,
}

impl MemoryGeometrySource {
    pub fn new(crs: Crs) -> Self {
        Self {
            crs,
            features: BTreeMap::new(),
        }
    }

    /// Ajoute une géométrie; renvoie les réparations appliquées
    pub fn insert(
        &mut self,
        id: impl Into<ElementId>,
        geometry: Geometry,
    ) -> Result<Vec<RepairAction>, VegmapError> {
        self.insert_with_attributes(id, geometry, HashMap::new())
    }

    /// Ajoute une géométrie avec ses attributs natifs
    pub fn insert_with_attributes(
        &mut self,
        id: impl Into<ElementId>,
        geometry: Geometry,
        attributes: HashMap<String, String>,
    ) -> Result<Vec<RepairAction>, VegmapError> {
        let id = id.into();
        if self.features.contains_key(&id) {
            return Err(VegmapError::DuplicateElement {
                id,
                source_kind: SourceKind::Geometry,
            });
        }

        let repaired = repair::repair_geometry(&id, geometry)?;
        self.features.insert(
            id,
            GeometryFeature {
                geometry: Arc::new(repaired.geometry),
                attributes,
            },
        );
        Ok(repaired.actions)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

impl GeometrySource for MemoryGeometrySource {
    fn crs(&self) -> Crs {
        self.crs
    }

    fn element_ids(&self) -> BTreeSet<ElementId> {
        self.features.keys().cloned().collect()
    }

    fn geometry(&self, id: &ElementId) -> Result<Arc<Geometry>, VegmapError> {
        self.features
            .get(id)
            .map(|f| f.geometry.clone())
            .ok_or_else(|| VegmapError::not_found(id, SourceKind::Geometry))
    }

    fn all(&self) -> Box<dyn Iterator<Item = (ElementId, Arc<Geometry>)> + '_> {
        Box::new(
            self.features
                .iter()
                .map(|(id, f)| (id.clone(), f.geometry.clone())),
        )
    }

    fn native_attributes(&self, id: &ElementId) -> Option<&HashMap<String, String>> {
        self.features.get(id).map(|f| &f.attributes)
    }
}

#[derive(Debug, Clone, Default)]
struct AttributeElement {
    records: Vec<VegetationRecord>,
    survey_year: Option<u16>,
}

/// Table de végétation en mémoire, ordre des lignes conservé par élément
#[derive(Debug, Clone, Default)]
pub struct MemoryAttributeSource {
    elements: BTreeMap<ElementId, AttributeElement>,
}

impl MemoryAttributeSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Construit la table à partir de lignes (identifiant, entrée)
    pub fn from_rows<I, K>(rows: I) -> Self
    where
        I: IntoIterator<Item = (K, VegetationRecord)>,
        K: Into<ElementId>,
    {
        let mut source = Self::new();
        for (id, record) in rows {
            source.push_record(id, record);
        }
        source
    }

    /// Déclare un élément, sans classification
    pub fn insert_element(&mut self, id: impl Into<ElementId>) {
        self.elements.entry(id.into()).or_default();
    }

    /// Ajoute une entrée à la suite de celles de l'élément
    pub fn push_record(&mut self, id: impl Into<ElementId>, record: VegetationRecord) {
        self.elements
            .entry(id.into())
            .or_default()
            .records
            .push(record);
    }

    pub fn set_survey_year(&mut self, id: impl Into<ElementId>, year: u16) {
        self.elements.entry(id.into()).or_default().survey_year = Some(year);
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

impl AttributeSource for MemoryAttributeSource {
    fn element_ids(&self) -> BTreeSet<ElementId> {
        self.elements.keys().cloned().collect()
    }

    fn records(&self, id: &ElementId) -> Result<Vec<VegetationRecord>, VegmapError> {
        self.elements
            .get(id)
            .map(|e| e.records.clone())
            .ok_or_else(|| VegmapError::not_found(id, SourceKind::Attributes))
    }

    fn all(&self) -> Box<dyn Iterator<Item = (ElementId, Vec<VegetationRecord>)> + '_> {
        Box::new(
            self.elements
                .iter()
                .map(|(id, e)| (id.clone(), e.records.clone())),
        )
    }

    fn survey_year(&self, id: &ElementId) -> Option<u16> {
        self.elements.get(id).and_then(|e| e.survey_year)
    }
}

/// Enregistrement reçu par l'écrivain en mémoire
#[derive(Debug, Clone)]
pub struct WrittenFeature {
    pub id: ElementId,
    pub geometry: Geometry,
    pub attributes: FlatAttributes,
}

/// Écrivain en mémoire
///
/// Comme une couche shapefile, il peut être restreint à une seule nature
/// d'élément; les autres enregistrements sont alors refusés.
#[derive(Debug, Clone, Default)]
pub struct MemoryWriter {
    crs: Option<Crs>,
    only: Option<ElementKind>,
    features: Vec<WrittenFeature>,
    finished: bool,
}

impl MemoryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Écrivain n'acceptant qu'une nature de géométrie
    pub fn single_kind(kind: ElementKind) -> Self {
        Self {
            only: Some(kind),
            ..Self::default()
        }
    }

    pub fn features(&self) -> &[WrittenFeature] {
        &self.features
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Relit les enregistrements écrits sous forme de sources
    pub fn into_sources(self) -> Result<(MemoryGeometrySource, MemoryAttributeSource), VegmapError> {
        let mut geometries = MemoryGeometrySource::new(self.crs.unwrap_or_default());
        let mut attributes = MemoryAttributeSource::new();

        for feature in self.features {
            attributes.insert_element(feature.id.clone());
            for record in records_from_flat(&feature.attributes) {
                attributes.push_record(feature.id.clone(), record);
            }
            if let Some(year) = survey_year_from_flat(&feature.attributes) {
                attributes.set_survey_year(feature.id.clone(), year);
            }
            geometries.insert(feature.id, feature.geometry)?;
        }

        Ok((geometries, attributes))
    }
}

impl FeatureWriter for MemoryWriter {
    fn begin(&mut self, crs: Crs) -> Result<(), WriteRejection> {
        self.crs = Some(crs);
        Ok(())
    }

    fn write(
        &mut self,
        id: &ElementId,
        geometry: &Geometry,
        attributes: &FlatAttributes,
    ) -> Result<(), WriteRejection> {
        if let Some(only) = self.only {
            if ElementKind::from_geometry(geometry) != Some(only) {
                return Err(WriteRejection::new(format!(
                    "unsupported geometry type {} for a {:?} layer",
                    geometry_type_name(geometry),
                    only
                )));
            }
        }

        debug!(element = %id, fields = attributes.len(), "Feature written to memory");
        self.features.push(WrittenFeature {
            id: id.clone(),
            geometry: geometry.clone(),
            attributes: attributes.clone(),
        });
        Ok(())
    }

    fn finish(&mut self) -> Result<(), WriteRejection> {
        self.finished = true;
        Ok(())
    }
}
