//! Lecture des géométries depuis un fichier GeoJSON
//!
//! L'ElmID est lu dans une propriété configurable, ou à défaut dans l'id de
//! la feature. Les autres propriétés sont conservées comme attributs natifs.
//! Une feature illisible est écartée et consignée, sans interrompre la lecture.

use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

use ::geojson::{feature::Id, Feature, GeoJson, JsonObject};
use anyhow::{bail, Context, Result};
use regex::Regex;
use serde_json::Value;
use tracing::{debug, info, warn};
use vegmap::mapdata::export::FIELD_ELEMENT_ID;
use vegmap::{
    records_from_flat, survey_year_from_flat, Crs, ElementId, FieldValue, FlatAttributes,
    MemoryAttributeSource, MemoryGeometrySource,
};

use super::{value_element_id, value_text, ReadRejection};

/// Résultat de lecture d'une source géométrique
#[derive(Debug)]
pub struct GeometryRead {
    pub source: MemoryGeometrySource,
    /// Features écartées
    pub rejected: Vec<ReadRejection>,
    /// Nombre de géométries corrigées à l'insertion
    pub repaired: usize,
}

/// Lit les géométries d'un fichier GeoJSON
pub fn read_geometries(path: &Path, elmid_field: &str, default_crs: Crs) -> Result<GeometryRead> {
    let (features, declared) = parse_features(path)?;
    let crs = declared.unwrap_or(default_crs);

    let mut source = MemoryGeometrySource::new(crs);
    let mut rejected = Vec::new();
    let mut repaired = 0;

    for (index, feature) in features.into_iter().enumerate() {
        let Some(id) = feature_element_id(&feature, elmid_field) else {
            rejected.push(ReadRejection {
                index,
                element: None,
                reason: format!("missing {} property and feature id", elmid_field),
            });
            continue;
        };

        let geometry = match feature.geometry.map(geo::Geometry::<f64>::try_from) {
            Some(Ok(geometry)) => geometry,
            Some(Err(e)) => {
                rejected.push(ReadRejection {
                    index,
                    element: Some(id),
                    reason: e.to_string(),
                });
                continue;
            }
            None => {
                rejected.push(ReadRejection {
                    index,
                    element: Some(id),
                    reason: "feature has no geometry".to_string(),
                });
                continue;
            }
        };

        let native: HashMap<String, String> = feature
            .properties
            .iter()
            .flatten()
            .filter(|(key, _)| key.as_str() != elmid_field)
            .filter_map(|(key, value)| value_text(value).map(|text| (key.clone(), text)))
            .collect();

        match source.insert_with_attributes(id.clone(), geometry, native) {
            Ok(actions) if !actions.is_empty() => {
                debug!(element = %id, actions = ?actions, "Geometry repaired");
                repaired += 1;
            }
            Ok(_) => {}
            Err(e) => {
                rejected.push(ReadRejection {
                    index,
                    element: Some(id),
                    reason: e.to_string(),
                });
            }
        }
    }

    for rejection in &rejected {
        warn!(
            index = rejection.index,
            element = ?rejection.element,
            reason = rejection.reason.as_str(),
            "Feature rejected"
        );
    }
    info!(
        path = %path.display(),
        features = source.len(),
        rejected = rejected.len(),
        repaired = repaired,
        crs = %crs,
        "Geometries loaded"
    );

    Ok(GeometryRead {
        source,
        rejected,
        repaired,
    })
}

/// Relit un fichier produit par l'export: géométries et classification
pub fn read_exported(
    path: &Path,
    default_crs: Crs,
) -> Result<(MemoryGeometrySource, MemoryAttributeSource)> {
    let (features, declared) = parse_features(path)?;
    let mut geometries = MemoryGeometrySource::new(declared.unwrap_or(default_crs));
    let mut attributes = MemoryAttributeSource::new();

    for (index, feature) in features.into_iter().enumerate() {
        let Some(id) = feature_element_id(&feature, FIELD_ELEMENT_ID) else {
            bail!("Feature {} has no {} property", index, FIELD_ELEMENT_ID);
        };
        let Some(geometry) = feature.geometry else {
            bail!("Feature {} (element {}) has no geometry", index, id);
        };
        let geometry = geo::Geometry::<f64>::try_from(geometry)
            .context(format!("Unsupported geometry for element {}", id))?;

        let mut flat = FlatAttributes::new();
        for (key, value) in feature.properties.iter().flatten() {
            flat.push(key.clone(), field_value(value));
        }

        attributes.insert_element(id.clone());
        for record in records_from_flat(&flat) {
            attributes.push_record(id.clone(), record);
        }
        if let Some(year) = survey_year_from_flat(&flat) {
            attributes.set_survey_year(id.clone(), year);
        }
        geometries
            .insert(id, geometry)
            .context(format!("Invalid feature {} in {}", index, path.display()))?;
    }

    Ok((geometries, attributes))
}

fn parse_features(path: &Path) -> Result<(Vec<Feature>, Option<Crs>)> {
    let content = std::fs::read_to_string(path)
        .context(format!("Failed to read file: {}", path.display()))?;
    let geojson: GeoJson = content
        .parse()
        .context(format!("Failed to parse GeoJSON: {}", path.display()))?;

    match geojson {
        GeoJson::FeatureCollection(collection) => {
            let crs = declared_crs(collection.foreign_members.as_ref());
            Ok((collection.features, crs))
        }
        GeoJson::Feature(feature) => Ok((vec![feature], None)),
        GeoJson::Geometry(_) => bail!(
            "{} holds a bare geometry, a FeatureCollection is expected",
            path.display()
        ),
    }
}

fn feature_element_id(feature: &Feature, elmid_field: &str) -> Option<ElementId> {
    feature
        .properties
        .as_ref()
        .and_then(|properties| properties.get(elmid_field))
        .and_then(value_element_id)
        .or_else(|| match feature.id.as_ref()? {
            Id::String(s) => Some(ElementId::parse(s)),
            Id::Number(n) => value_element_id(&Value::Number(n.clone())),
        })
}

fn epsg_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"EPSG:(?:[0-9.]*:)?([0-9]+)\s*$").ok())
        .as_ref()
}

/// CRS nommé déclaré par le membre `crs` (GeoJSON 2008)
fn declared_crs(members: Option<&JsonObject>) -> Option<Crs> {
    let name = members?
        .get("crs")?
        .get("properties")?
        .get("name")?
        .as_str()?;
    let captures = epsg_pattern()?.captures(name)?;
    let epsg = captures.get(1)?.as_str().parse().ok()?;
    Some(Crs { epsg })
}

fn field_value(value: &Value) -> FieldValue {
    match value {
        Value::Null => FieldValue::Null,
        Value::Number(n) => match n.as_i64() {
            Some(i) => FieldValue::Integer(i),
            None => n.as_f64().map(FieldValue::Real).unwrap_or(FieldValue::Null),
        },
        Value::String(s) => FieldValue::Text(s.clone()),
        other => FieldValue::Text(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vegmap::GeometrySource;

    fn write_temp(name: &str, content: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_declared_crs() {
        let members: JsonObject = serde_json::from_str(
            r#"{"crs":{"type":"name","properties":{"name":"urn:ogc:def:crs:EPSG::28992"}}}"#,
        )
        .unwrap();
        assert_eq!(declared_crs(Some(&members)), Some(Crs { epsg: 28992 }));

        let members: JsonObject =
            serde_json::from_str(r#"{"crs":{"properties":{"name":"EPSG:4326"}}}"#).unwrap();
        assert_eq!(declared_crs(Some(&members)), Some(Crs { epsg: 4326 }));
        assert_eq!(declared_crs(None), None);
    }

    #[test]
    fn test_read_geometries() {
        let path = write_temp(
            "vegmap_read_geometries.geojson",
            r#"{"type":"FeatureCollection","features":[
                {"type":"Feature","properties":{"elmid":1,"gebied":"Noord"},
                 "geometry":{"type":"Polygon","coordinates":[[[0,0],[10,0],[10,10],[0,10],[0,0]]]}},
                {"type":"Feature","id":"2","properties":{},
                 "geometry":{"type":"LineString","coordinates":[[0,0],[5,5]]}},
                {"type":"Feature","properties":{"elmid":3},"geometry":null},
                {"type":"Feature","properties":{"elmid":4},
                 "geometry":{"type":"Point","coordinates":[1,1]}}
            ]}"#,
        );

        let read = read_geometries(&path, "elmid", Crs::default()).unwrap();
        assert_eq!(read.source.len(), 2);
        assert_eq!(read.source.crs(), Crs::default());
        assert_eq!(
            read.source.native_attributes(&ElementId::from(1)).unwrap()["gebied"],
            "Noord"
        );
        assert!(read.source.geometry(&ElementId::from(2)).is_ok());

        let rejected: Vec<_> = read.rejected.iter().map(|r| r.element.clone()).collect();
        assert_eq!(
            rejected,
            vec![Some(ElementId::from(3)), Some(ElementId::from(4))]
        );

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_bare_geometry_is_refused() {
        let path = write_temp(
            "vegmap_bare_geometry.geojson",
            r#"{"type":"Point","coordinates":[1,1]}"#,
        );
        assert!(read_geometries(&path, "elmid", Crs::default()).is_err());
        std::fs::remove_file(path).ok();
    }
}
