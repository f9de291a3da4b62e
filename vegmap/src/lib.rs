//! # vegmap
//!
//! Jointure de cartes de végétation (géométries de terrain et table de
//! classification) et comparaison de campagnes de relevé successives.
//!
//! ## Features
//!
//! - Jointure complète sur l'identifiant d'élément (ElmID) avec rapport
//!   d'intégrité en lot (orphelins, proportions, codes inconnus)
//! - Filtres attributaires et spatiaux composables, sans copie des géométries
//! - Export best-effort vers tout écrivain implémentant `FeatureWriter`
//! - Résolution des codes via une légende partagée, cache thread-safe
//! - Comparaison multi-temporelle par recouvrement exact (`geo`), index
//!   `rstar` et calcul parallèle (`rayon`)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use vegmap::{BuildOptions, CompareOptions, MapData, TemporalComparator};
//!
//! let earlier = MapData::build(geometries_2008, attributes_2008, legend.clone(), BuildOptions::default())?;
//! let later = MapData::build(geometries_2020, attributes_2020, legend, BuildOptions::default())?;
//!
//! let comparison = TemporalComparator::new(&earlier, &later, CompareOptions::default())?.compute()?;
//! for ((from, to), area) in &comparison.transitions {
//!     println!("{} -> {}: {:.1} m2", from, to, area);
//! }
//! ```

pub mod classify;
pub mod compare;
pub mod config;
pub mod error;
pub mod index;
pub mod legend;
pub mod mapdata;
pub mod repair;
pub mod report;
pub mod sample;
pub mod source;
pub mod types;

pub use classify::{ClassificationCache, ClassificationDescription, TypeLevel, VegetationClassifier};
pub use compare::{ChangeKind, ChangeRecord, Comparison, TemporalComparator};
pub use config::{BuildOptions, CompareOptions, ProportionPolicy};
pub use error::{ExportError, JoinError, SourceKind, VegmapError};
pub use legend::{Legend, LegendEntry};
pub use mapdata::export::{records_from_flat, survey_year_from_flat};
pub use mapdata::{MapData, MapElement, SpatialPredicate, TypeFilter};
pub use report::{ExportReport, ExportStatus, IssueKind, IssueLevel, JoinIssue, JoinReport};
pub use sample::{GridSample, GridSampler};
pub use source::{
    AttributeSource, FeatureWriter, GeometrySource, MemoryAttributeSource, MemoryGeometrySource,
    MemoryWriter, WriteRejection,
};
pub use types::{
    Crs, ElementId, ElementKind, FieldValue, FlatAttributes, TypeKey, VegetationRecord,
};
