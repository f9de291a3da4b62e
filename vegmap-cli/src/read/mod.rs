//! Lecteurs de fichiers: géométries GeoJSON, table de végétation et légende JSON

pub mod geojson;
pub mod table;

use serde_json::Value;
use vegmap::ElementId;

pub use self::geojson::{read_exported, read_geometries, GeometryRead};
pub use table::{read_attributes, read_legend, AttributeRead};

/// Entrée de fichier écartée à la lecture
#[derive(Debug, Clone, PartialEq)]
pub struct ReadRejection {
    /// Position de l'entrée dans le fichier
    pub index: usize,
    /// Identifiant, s'il a pu être lu
    pub element: Option<ElementId>,
    pub reason: String,
}

/// Texte d'une valeur scalaire (vide ou null → `None`)
pub(crate) fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Nombre d'une valeur scalaire, les chaînes décimales à virgule acceptées
pub(crate) fn value_f64(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', ".").parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|f| f.is_finite())
}

pub(crate) fn value_element_id(value: &Value) -> Option<ElementId> {
    match value {
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(ElementId::Int(i)),
            None => Some(ElementId::parse(&n.to_string())),
        },
        Value::String(s) if !s.trim().is_empty() => Some(ElementId::parse(s)),
        _ => None,
    }
}
