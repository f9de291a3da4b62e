//! Adaptateurs de sources: géométries d'un côté, table de végétation de l'autre
//!
//! Les deux sources sont construites indépendamment à partir de leurs
//! conteneurs respectifs; tout conteneur offrant une énumération finie et une
//! recherche par identifiant convient. Les implémentations en mémoire servent
//! aussi bien aux lecteurs de fichiers qu'aux tests.

pub mod memory;

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use geo::Geometry;

use crate::error::VegmapError;
use crate::types::{Crs, ElementId, FlatAttributes, VegetationRecord};

pub use memory::{MemoryAttributeSource, MemoryGeometrySource, MemoryWriter};

/// Vue en lecture seule sur une collection de géométries identifiées
pub trait GeometrySource: Send + Sync {
    /// Système de coordonnées des géométries
    fn crs(&self) -> Crs;

    /// Identifiants présents
    fn element_ids(&self) -> BTreeSet<ElementId>;

    /// Géométrie d'un élément, `NotFound` si absent
    fn geometry(&self, id: &ElementId) -> Result<Arc<Geometry>, VegmapError>;

    /// Parcours complet, fini et relançable, dans l'ordre des identifiants
    fn all(&self) -> Box<dyn Iterator<Item = (ElementId, Arc<Geometry>)> + '_>;

    /// Attributs natifs du conteneur géométrique
    fn native_attributes(&self, _id: &ElementId) -> Option<&HashMap<String, String>> {
        None
    }
}

/// Vue en lecture seule sur la table de végétation
pub trait AttributeSource: Send + Sync {
    /// Identifiants présents
    fn element_ids(&self) -> BTreeSet<ElementId>;

    /// Entrées d'un élément, dans l'ordre de la table
    ///
    /// Un élément présent sans classification renvoie une séquence vide;
    /// un élément absent renvoie `NotFound`.
    fn records(&self, id: &ElementId) -> Result<Vec<VegetationRecord>, VegmapError>;

    /// Parcours complet, fini et relançable, dans l'ordre des identifiants
    fn all(&self) -> Box<dyn Iterator<Item = (ElementId, Vec<VegetationRecord>)> + '_>;

    /// Année de relevé d'un élément
    fn survey_year(&self, _id: &ElementId) -> Option<u16> {
        None
    }
}

/// Refus d'un enregistrement par l'écrivain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRejection {
    pub reason: String,
}

impl WriteRejection {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for WriteRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.reason)
    }
}

/// Écrivain de conteneur géométrique (collaborateur externe de l'export)
pub trait FeatureWriter {
    /// Appelé une fois avant le premier enregistrement
    fn begin(&mut self, _crs: Crs) -> Result<(), WriteRejection> {
        Ok(())
    }

    /// Écrit un enregistrement; un refus n'interrompt pas l'export
    fn write(
        &mut self,
        id: &ElementId,
        geometry: &Geometry,
        attributes: &FlatAttributes,
    ) -> Result<(), WriteRejection>;

    /// Appelé une fois après le dernier enregistrement
    fn finish(&mut self) -> Result<(), WriteRejection> {
        Ok(())
    }
}
