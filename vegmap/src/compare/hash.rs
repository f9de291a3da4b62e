//! Empreinte de géométrie pour la continuité entre campagnes
//!
//! Deux éléments de campagnes différentes ont la même géométrie s'ils ont la
//! même empreinte. Les anneaux sont normalisés: départ au plus petit sommet
//! (x puis y), sens de parcours fixé, coordonnées arrondies au micromètre.

use std::cmp::Ordering;
use std::fmt;

use blake3::Hasher;
use geo::{Coord, Geometry, LineString, Polygon};

/// Empreinte blake3 d'une géométrie normalisée
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GeometryHash([u8; 32]);

impl GeometryHash {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for GeometryHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Calcule l'empreinte d'une géométrie
pub fn geometry_hash(geometry: &Geometry) -> GeometryHash {
    let mut hasher = Hasher::new();

    match geometry {
        Geometry::Polygon(polygon) => {
            hasher.update(b"P");
            hash_polygon(&mut hasher, polygon);
        }
        Geometry::MultiPolygon(multi) => {
            hasher.update(b"MP");
            for polygon in &multi.0 {
                hash_polygon(&mut hasher, polygon);
            }
        }
        Geometry::LineString(line) => {
            hasher.update(b"L");
            hash_line(&mut hasher, line);
        }
        Geometry::MultiLineString(multi) => {
            hasher.update(b"ML");
            for line in &multi.0 {
                hash_line(&mut hasher, line);
            }
        }
        other => {
            hasher.update(format!("{:?}", other).as_bytes());
        }
    }

    GeometryHash(*hasher.finalize().as_bytes())
}

fn hash_polygon(hasher: &mut Hasher, polygon: &Polygon) {
    hasher.update(b"E");
    hash_ring(hasher, polygon.exterior());
    for interior in polygon.interiors() {
        hasher.update(b"I");
        hash_ring(hasher, interior);
    }
}

/// Une ligne et sa réciproque ont la même empreinte
fn hash_line(hasher: &mut Hasher, line: &LineString) {
    let coords = &line.0;
    let reversed = match (coords.first(), coords.last()) {
        (Some(first), Some(last)) => compare_coords(last, first) == Ordering::Less,
        _ => false,
    };

    hasher.update(&(coords.len() as u64).to_le_bytes());
    if reversed {
        coords.iter().rev().for_each(|c| hash_coord(hasher, *c));
    } else {
        coords.iter().for_each(|c| hash_coord(hasher, *c));
    }
}

fn hash_ring(hasher: &mut Hasher, ring: &LineString) {
    let coords = &ring.0;
    let len = if coords.len() > 1 && coords.first() == coords.last() {
        coords.len() - 1
    } else {
        coords.len()
    };
    if len == 0 {
        return;
    }

    let start = (0..len)
        .min_by(|&a, &b| compare_coords(&coords[a], &coords[b]))
        .unwrap_or(0);

    // Sens de parcours: vers le plus petit des deux voisins du sommet de départ
    let next = coords[(start + 1) % len];
    let previous = coords[(start + len - 1) % len];
    let forward = compare_coords(&next, &previous) != Ordering::Greater;

    hasher.update(&(len as u64).to_le_bytes());
    for step in 0..len {
        let index = if forward {
            (start + step) % len
        } else {
            (start + len - step) % len
        };
        hash_coord(hasher, coords[index]);
    }
}

fn compare_coords(a: &Coord, b: &Coord) -> Ordering {
    a.x.partial_cmp(&b.x)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.y.partial_cmp(&b.y).unwrap_or(Ordering::Equal))
}

fn hash_coord(hasher: &mut Hasher, coord: Coord) {
    let x = (coord.x * 1_000_000.0).round() as i64;
    let y = (coord.y * 1_000_000.0).round() as i64;
    hasher.update(&x.to_le_bytes());
    hasher.update(&y.to_le_bytes());
}
