//! Types de données pour le crate vegmap

use std::fmt;

use geo::Geometry;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Identifiant d'un élément cartographié (ElmID)
///
/// Unique au sein d'une campagne, sans signification d'une campagne à l'autre.
/// Les entiers sont ordonnés avant les chaînes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ElementId {
    Int(i64),
    Text(String),
}

impl ElementId {
    /// Normalise une valeur brute: "12", " 12 " et "12.0" donnent `Int(12)`
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if let Ok(n) = trimmed.parse::<i64>() {
            return Self::Int(n);
        }
        match trimmed.parse::<f64>() {
            Ok(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                Self::Int(f as i64)
            }
            _ => Self::Text(trimmed.to_string()),
        }
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementId::Int(n) => write!(f, "{}", n),
            ElementId::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for ElementId {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<i32> for ElementId {
    fn from(n: i32) -> Self {
        Self::Int(n as i64)
    }
}

impl From<&str> for ElementId {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

impl From<String> for ElementId {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl Serialize for ElementId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ElementId::Int(n) => serializer.serialize_i64(*n),
            ElementId::Text(s) => serializer.serialize_str(s),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawElementId {
    Int(i64),
    Float(f64),
    Text(String),
}

impl<'de> Deserialize<'de> for ElementId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match RawElementId::deserialize(deserializer)? {
            RawElementId::Int(n) => ElementId::Int(n),
            RawElementId::Float(f) => ElementId::parse(&f.to_string()),
            RawElementId::Text(s) => ElementId::parse(&s),
        })
    }
}

/// Système de coordonnées d'une source géométrique
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Crs {
    /// Code EPSG
    pub epsg: u32,
}

impl Default for Crs {
    fn default() -> Self {
        Self {
            epsg: 28992, // Amersfoort / RD New
        }
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg)
    }
}

/// Nature d'un élément cartographié
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementKind {
    /// Vlak: polygone ou multipolygone
    Polygon,
    /// Lijn: ligne ou multiligne
    Line,
}

impl ElementKind {
    /// Déduit la nature d'un élément de sa géométrie
    pub fn from_geometry(geometry: &Geometry) -> Option<Self> {
        match geometry {
            Geometry::Polygon(_)
            | Geometry::MultiPolygon(_)
            | Geometry::Rect(_)
            | Geometry::Triangle(_) => Some(Self::Polygon),
            Geometry::LineString(_) | Geometry::MultiLineString(_) | Geometry::Line(_) => {
                Some(Self::Line)
            }
            _ => None,
        }
    }

    /// Code de type de localisation ("v" ou "l")
    pub fn code(&self) -> &'static str {
        match self {
            ElementKind::Polygon => "v",
            ElementKind::Line => "l",
        }
    }
}

/// Une entrée de classification d'un élément
///
/// Un élément mosaïque porte plusieurs entrées, chacune avec sa proportion
/// (en pourcentage de la surface de l'élément).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VegetationRecord {
    /// Code du type de végétation
    pub type_code: String,

    /// Code de sous-type (type SBB)
    #[serde(default)]
    pub sub_type_code: Option<String>,

    /// Code de recouvrement brut (bedekking)
    #[serde(default)]
    pub cover_code: Option<String>,

    /// Recouvrement en pourcentage
    #[serde(default)]
    pub cover_percent: Option<f64>,

    /// Part de l'élément occupée par ce type, en pourcentage
    #[serde(default)]
    pub proportion: Option<f64>,
}

impl VegetationRecord {
    pub fn new(type_code: impl Into<String>) -> Self {
        Self {
            type_code: type_code.into(),
            sub_type_code: None,
            cover_code: None,
            cover_percent: None,
            proportion: None,
        }
    }

    pub fn with_proportion(mut self, proportion: f64) -> Self {
        self.proportion = Some(proportion);
        self
    }

    pub fn with_sub_type(mut self, sub_type_code: impl Into<String>) -> Self {
        self.sub_type_code = Some(sub_type_code.into());
        self
    }

    pub fn with_cover(mut self, cover_code: Option<String>, cover_percent: Option<f64>) -> Self {
        self.cover_code = cover_code;
        self.cover_percent = cover_percent;
        self
    }
}

/// Clé de regroupement d'une surface (type résolu, ou absence de type)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TypeKey {
    Unclassified,
    Type(String),
}

impl TypeKey {
    pub fn is_classified(&self) -> bool {
        matches!(self, TypeKey::Type(_))
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeKey::Unclassified => write!(f, "-"),
            TypeKey::Type(code) => write!(f, "{}", code),
        }
    }
}

impl From<&str> for TypeKey {
    fn from(code: &str) -> Self {
        TypeKey::Type(code.to_string())
    }
}

impl Serialize for TypeKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            TypeKey::Unclassified => serializer.serialize_none(),
            TypeKey::Type(code) => serializer.serialize_str(code),
        }
    }
}

/// Valeur d'un champ aplati à l'export
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Integer(n) => Some(*n as f64),
            FieldValue::Real(f) => Some(*f),
            FieldValue::Text(s) => s.trim().parse().ok(),
            FieldValue::Null => None,
        }
    }

    /// Représentation textuelle (vide pour `Null`)
    pub fn to_text(&self) -> String {
        match self {
            FieldValue::Null => String::new(),
            FieldValue::Integer(n) => n.to_string(),
            FieldValue::Real(f) => f.to_string(),
            FieldValue::Text(s) => s.clone(),
        }
    }
}

impl From<Option<String>> for FieldValue {
    fn from(value: Option<String>) -> Self {
        value.map(FieldValue::Text).unwrap_or(FieldValue::Null)
    }
}

impl From<Option<f64>> for FieldValue {
    fn from(value: Option<f64>) -> Self {
        value.map(FieldValue::Real).unwrap_or(FieldValue::Null)
    }
}

/// Attributs aplatis d'un élément exporté, dans l'ordre des colonnes
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FlatAttributes {
    fields: Vec<(String, FieldValue)>,
}

impl FlatAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.push((name.into(), value.into()));
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Real(value)
    }
}

impl From<&ElementId> for FieldValue {
    fn from(id: &ElementId) -> Self {
        match id {
            ElementId::Int(n) => FieldValue::Integer(*n),
            ElementId::Text(s) => FieldValue::Text(s.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_id_parse() {
        assert_eq!(ElementId::parse("12"), ElementId::Int(12));
        assert_eq!(ElementId::parse(" 12 "), ElementId::Int(12));
        assert_eq!(ElementId::parse("12.0"), ElementId::Int(12));
        assert_eq!(ElementId::parse("A12"), ElementId::Text("A12".to_string()));
        assert_eq!(ElementId::parse("12.5"), ElementId::Text("12.5".to_string()));
    }

    #[test]
    fn test_element_id_ordering() {
        let mut ids = vec![
            ElementId::from("b"),
            ElementId::from(10),
            ElementId::from(2),
            ElementId::from("a"),
        ];
        ids.sort();
        assert_eq!(
            ids,
            vec![
                ElementId::Int(2),
                ElementId::Int(10),
                ElementId::Text("a".to_string()),
                ElementId::Text("b".to_string()),
            ]
        );
    }

    #[test]
    fn test_element_kind_from_geometry() {
        use geo::{LineString, Point, Polygon};

        let poly = Geometry::Polygon(Polygon::new(
            LineString::from(vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 0.0)]),
            vec![],
        ));
        let line = Geometry::LineString(LineString::from(vec![(0.0, 0.0), (1.0, 1.0)]));
        let point = Geometry::Point(Point::new(0.0, 0.0));

        assert_eq!(ElementKind::from_geometry(&poly), Some(ElementKind::Polygon));
        assert_eq!(ElementKind::from_geometry(&line), Some(ElementKind::Line));
        assert_eq!(ElementKind::from_geometry(&point), None);
        assert_eq!(ElementKind::Polygon.code(), "v");
    }

    #[test]
    fn test_flat_attributes_keep_order() {
        let mut attrs = FlatAttributes::new();
        attrs.push("elmid", 5i64);
        attrs.push("type_1", "A");
        attrs.push("prop_1", Option::<f64>::None);

        let names: Vec<&str> = attrs.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["elmid", "type_1", "prop_1"]);
        assert_eq!(attrs.get("type_1").and_then(|v| v.as_str()), Some("A"));
        assert_eq!(attrs.get("prop_1"), Some(&FieldValue::Null));
    }
}
