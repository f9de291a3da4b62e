//! Index spatial des éléments d'une carte
//!
//! R-tree (`rstar`) sur les rectangles englobants; les requêtes renvoient des
//! positions dans la table jointe, le test exact reste à la charge de
//! l'appelant.

use geo::{BoundingRect, Coord, Geometry, Rect};
use rstar::{RTree, RTreeObject, AABB};

#[derive(Debug, Clone)]
struct IndexedEnvelope {
    position: usize,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for IndexedEnvelope {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Index des rectangles englobants, par position
#[derive(Debug, Clone)]
pub struct ElementIndex {
    tree: RTree<IndexedEnvelope>,
}

fn to_aabb(rect: &Rect) -> AABB<[f64; 2]> {
    AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y])
}

impl ElementIndex {
    /// Construit l'index à partir de couples (position, géométrie)
    pub fn build<'a, I>(geometries: I) -> Self
    where
        I: IntoIterator<Item = (usize, &'a Geometry)>,
    {
        let entries: Vec<IndexedEnvelope> = geometries
            .into_iter()
            .filter_map(|(position, geometry)| {
                geometry.bounding_rect().map(|rect| IndexedEnvelope {
                    position,
                    envelope: to_aabb(&rect),
                })
            })
            .collect();

        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Positions dont le rectangle intersecte `rect`, triées
    pub fn candidates(&self, rect: &Rect) -> Vec<usize> {
        let mut positions: Vec<usize> = self
            .tree
            .locate_in_envelope_intersecting(&to_aabb(rect))
            .map(|entry| entry.position)
            .collect();
        positions.sort_unstable();
        positions
    }

    /// Positions dont le rectangle contient le point, triées
    pub fn at_point(&self, coord: Coord) -> Vec<usize> {
        let mut positions: Vec<usize> = self
            .tree
            .locate_in_envelope_intersecting(&AABB::from_point([coord.x, coord.y]))
            .map(|entry| entry.position)
            .collect();
        positions.sort_unstable();
        positions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{coord, LineString, Polygon};

    fn square(x: f64, y: f64, size: f64) -> Geometry {
        Geometry::Polygon(Polygon::new(
            LineString::from(vec![
                (x, y),
                (x + size, y),
                (x + size, y + size),
                (x, y + size),
                (x, y),
            ]),
            vec![],
        ))
    }

    #[test]
    fn test_candidates_sorted() {
        let geometries = vec![square(10.0, 0.0, 5.0), square(0.0, 0.0, 5.0), square(100.0, 100.0, 1.0)];
        let index = ElementIndex::build(geometries.iter().enumerate());
        assert_eq!(index.len(), 3);

        let query = Rect::new(coord! { x: -1.0, y: -1.0 }, coord! { x: 20.0, y: 3.0 });
        assert_eq!(index.candidates(&query), vec![0, 1]);
    }

    #[test]
    fn test_at_point() {
        let geometries = vec![square(0.0, 0.0, 10.0), square(5.0, 5.0, 10.0)];
        let index = ElementIndex::build(geometries.iter().enumerate());

        assert_eq!(index.at_point(coord! { x: 7.0, y: 7.0 }), vec![0, 1]);
        assert_eq!(index.at_point(coord! { x: 1.0, y: 1.0 }), vec![0]);
        assert!(index.at_point(coord! { x: 50.0, y: 50.0 }).is_empty());
    }

    #[test]
    fn test_empty_index() {
        let index = ElementIndex::build(std::iter::empty());
        assert!(index.is_empty());
    }
}
