//! Écrivains d'export

pub mod geojson;

pub use self::geojson::GeoJsonFeatureWriter;
