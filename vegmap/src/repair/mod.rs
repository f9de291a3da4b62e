//! Validation et réparation des géométries à l'entrée d'une source
//!
//! Seuls les polygones et les lignes sont des éléments cartographiés. Les
//! anneaux dégénérés (moins de trois sommets distincts) sont retirés, comme le
//! faisait la lecture tolérante des shapefiles de terrain; une géométrie vide
//! après réparation est rejetée.

pub mod ring;

use geo::{Area, Geometry, LineString, MultiLineString, MultiPolygon, Polygon};
use tracing::warn;

use crate::error::VegmapError;
use crate::types::ElementId;

/// Correction appliquée à une géométrie
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepairAction {
    /// Trou dégénéré retiré
    DroppedInteriorRing { polygon: usize, ring: usize },
    /// Polygone dégénéré retiré d'un multipolygone
    DroppedPolygon { polygon: usize },
    /// Ligne de moins de deux points retirée d'une multiligne
    DroppedLine { line: usize },
    /// Rectangle, triangle ou segment converti en type standard
    Normalized,
}

/// Géométrie validée
#[derive(Debug, Clone)]
pub struct Repaired {
    pub geometry: Geometry,
    pub actions: Vec<RepairAction>,
}

/// Valide une géométrie et applique les réparations possibles
pub fn repair_geometry(id: &ElementId, geometry: Geometry) -> Result<Repaired, VegmapError> {
    let mut actions = Vec::new();

    let geometry = match geometry {
        Geometry::Rect(rect) => {
            actions.push(RepairAction::Normalized);
            Geometry::Polygon(rect.to_polygon())
        }
        Geometry::Triangle(triangle) => {
            actions.push(RepairAction::Normalized);
            Geometry::Polygon(triangle.to_polygon())
        }
        Geometry::Line(line) => {
            actions.push(RepairAction::Normalized);
            Geometry::LineString(LineString::from(vec![line.start, line.end]))
        }
        other => other,
    };

    let geometry = match geometry {
        Geometry::Polygon(polygon) => {
            Geometry::Polygon(repair_polygon(id, polygon, 0, &mut actions)?)
        }
        Geometry::MultiPolygon(multi) => {
            let mut polygons = Vec::with_capacity(multi.0.len());
            for (index, polygon) in multi.0.into_iter().enumerate() {
                match repair_polygon(id, polygon, index, &mut actions) {
                    Ok(polygon) => polygons.push(polygon),
                    Err(_) => actions.push(RepairAction::DroppedPolygon { polygon: index }),
                }
            }
            if polygons.is_empty() {
                return Err(VegmapError::invalid_geometry(
                    id,
                    "multipolygon has no valid polygon",
                ));
            }
            Geometry::MultiPolygon(MultiPolygon::new(polygons))
        }
        Geometry::LineString(line) => {
            check_line(id, &line)?;
            Geometry::LineString(line)
        }
        Geometry::MultiLineString(multi) => {
            let mut lines = Vec::with_capacity(multi.0.len());
            for (index, line) in multi.0.into_iter().enumerate() {
                if check_line(id, &line).is_ok() {
                    lines.push(line);
                } else {
                    actions.push(RepairAction::DroppedLine { line: index });
                }
            }
            if lines.is_empty() {
                return Err(VegmapError::invalid_geometry(
                    id,
                    "multilinestring has no valid line",
                ));
            }
            Geometry::MultiLineString(MultiLineString::new(lines))
        }
        other => {
            return Err(VegmapError::invalid_geometry(
                id,
                format!("unsupported geometry type {}", geometry_type_name(&other)),
            ))
        }
    };

    for action in &actions {
        warn!(element = %id, action = ?action, "Geometry repaired");
    }

    Ok(Repaired { geometry, actions })
}

fn repair_polygon(
    id: &ElementId,
    polygon: Polygon,
    index: usize,
    actions: &mut Vec<RepairAction>,
) -> Result<Polygon, VegmapError> {
    let (exterior, interiors) = polygon.into_inner();

    if !ring::is_finite(&exterior) {
        return Err(VegmapError::invalid_geometry(id, "non-finite coordinates"));
    }
    if ring::is_degenerate(&exterior) {
        return Err(VegmapError::invalid_geometry(
            id,
            format!(
                "exterior ring has {} distinct vertices (at least 3 required)",
                ring::distinct_vertices(&exterior)
            ),
        ));
    }

    let mut kept = Vec::with_capacity(interiors.len());
    for (ring_index, interior) in interiors.into_iter().enumerate() {
        if ring::is_degenerate(&interior) || !ring::is_finite(&interior) {
            actions.push(RepairAction::DroppedInteriorRing {
                polygon: index,
                ring: ring_index,
            });
        } else {
            kept.push(interior);
        }
    }

    let polygon = Polygon::new(exterior, kept);
    if polygon.unsigned_area() == 0.0 {
        return Err(VegmapError::invalid_geometry(id, "polygon has zero area"));
    }
    Ok(polygon)
}

fn check_line(id: &ElementId, line: &LineString) -> Result<(), VegmapError> {
    if !ring::is_finite(line) {
        return Err(VegmapError::invalid_geometry(id, "non-finite coordinates"));
    }
    if line.0.len() < 2 {
        return Err(VegmapError::invalid_geometry(
            id,
            "line has fewer than 2 points",
        ));
    }
    Ok(())
}

/// Nom du type de géométrie, pour les messages
pub fn geometry_type_name(geometry: &Geometry) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Coord, Point, Rect};

    fn square(x: f64, y: f64, size: f64) -> Polygon {
        Polygon::new(
            LineString::from(vec![
                (x, y),
                (x + size, y),
                (x + size, y + size),
                (x, y + size),
                (x, y),
            ]),
            vec![],
        )
    }

    #[test]
    fn test_valid_polygon_untouched() {
        let id = ElementId::from(1);
        let repaired = repair_geometry(&id, Geometry::Polygon(square(0.0, 0.0, 10.0))).unwrap();
        assert!(repaired.actions.is_empty());
        assert_eq!(repaired.geometry.unsigned_area(), 100.0);
    }

    #[test]
    fn test_degenerate_hole_dropped() {
        let id = ElementId::from(1);
        let hole = LineString::from(vec![(1.0, 1.0), (2.0, 1.0), (1.0, 1.0)]);
        let polygon = Polygon::new(square(0.0, 0.0, 10.0).exterior().clone(), vec![hole]);

        let repaired = repair_geometry(&id, Geometry::Polygon(polygon)).unwrap();
        assert_eq!(
            repaired.actions,
            vec![RepairAction::DroppedInteriorRing { polygon: 0, ring: 0 }]
        );
    }

    #[test]
    fn test_degenerate_polygon_dropped_from_multipolygon() {
        let id = ElementId::from(2);
        let flat = Polygon::new(
            LineString::from(vec![(0.0, 0.0), (5.0, 0.0), (0.0, 0.0)]),
            vec![],
        );
        let multi = MultiPolygon::new(vec![flat, square(20.0, 20.0, 2.0)]);

        let repaired = repair_geometry(&id, Geometry::MultiPolygon(multi)).unwrap();
        assert_eq!(repaired.actions, vec![RepairAction::DroppedPolygon { polygon: 0 }]);
        assert_eq!(repaired.geometry.unsigned_area(), 4.0);
    }

    #[test]
    fn test_point_rejected() {
        let id = ElementId::from(3);
        let err = repair_geometry(&id, Geometry::Point(Point::new(0.0, 0.0))).unwrap_err();
        assert!(err.to_string().contains("element 3"));
        assert!(err.to_string().contains("Point"));
    }

    #[test]
    fn test_rect_normalized() {
        let id = ElementId::from(4);
        let rect = Rect::new(Coord { x: 0.0, y: 0.0 }, Coord { x: 2.0, y: 3.0 });
        let repaired = repair_geometry(&id, Geometry::Rect(rect)).unwrap();
        assert!(matches!(repaired.geometry, Geometry::Polygon(_)));
        assert_eq!(repaired.actions, vec![RepairAction::Normalized]);
    }

    #[test]
    fn test_short_line_rejected() {
        let id = ElementId::from(5);
        let line = LineString::from(vec![(0.0, 0.0)]);
        assert!(repair_geometry(&id, Geometry::LineString(line)).is_err());
    }
}
