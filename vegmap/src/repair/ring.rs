//! Contrôle des anneaux de polygones

use geo::{Coord, LineString};

/// Compare deux coordonnées avec tolérance
pub fn coords_equal(a: Coord, b: Coord) -> bool {
    const TOLERANCE: f64 = 1e-6;
    (a.x - b.x).abs() < TOLERANCE && (a.y - b.y).abs() < TOLERANCE
}

/// Nombre de sommets distincts consécutifs d'un anneau (fermeture exclue)
pub fn distinct_vertices(ring: &LineString) -> usize {
    let coords = &ring.0;
    if coords.is_empty() {
        return 0;
    }

    let mut count = 1;
    let mut last = coords[0];
    for &coord in &coords[1..] {
        if !coords_equal(coord, last) {
            count += 1;
            last = coord;
        }
    }

    // Le point de fermeture répète le premier
    if count > 1 && coords_equal(coords[0], last) {
        count -= 1;
    }
    count
}

/// Un anneau de moins de trois sommets distincts n'entoure aucune surface
pub fn is_degenerate(ring: &LineString) -> bool {
    distinct_vertices(ring) < 3
}

/// Toutes les coordonnées sont finies
pub fn is_finite(ring: &LineString) -> bool {
    ring.0.iter().all(|c| c.x.is_finite() && c.y.is_finite())
}
