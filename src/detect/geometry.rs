use super::contour::{Contour, Point};
use super::result::BoundingBox;

/// Unsigned polygon area via the shoelace formula. Fewer than three points
/// enclose nothing.
pub fn polygon_area(points: &[Point]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut twice = 0i64;
    for (i, p) in points.iter().enumerate() {
        let q = points[(i + 1) % points.len()];
        twice += p.x as i64 * q.y as i64 - q.x as i64 * p.y as i64;
    }
    twice.abs() as f64 / 2.0
}

/// Convex hull of `points`. Duplicates are dropped first; fewer than three
/// distinct points are returned as-is.
pub fn convex_hull(points: &[Point]) -> Vec<Point> {
    let mut pts = points.to_vec();
    pts.sort_unstable();
    pts.dedup();
    if pts.len() < 3 {
        return pts;
    }
    let pixels: Vec<imageproc::point::Point<i32>> = pts
        .iter()
        .map(|p| imageproc::point::Point::new(p.x, p.y))
        .collect();
    imageproc::geometry::convex_hull(pixels)
        .into_iter()
        .map(|p| Point::new(p.x, p.y))
        .collect()
}

/// Shape measurements the geometric filter decides on.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShapeDescriptors {
    pub bbox: BoundingBox,
    /// `bbox.width * bbox.height`.
    pub area: u64,
    pub contour_area: f64,
    pub hull_area: f64,
    pub aspect_ratio: f64,
    pub extent: f64,
    /// `None` when the hull encloses no area.
    pub solidity: Option<f64>,
}

impl ShapeDescriptors {
    pub fn from_contour(contour: &Contour) -> Option<Self> {
        let bbox = contour.bounding_box()?;
        let area = bbox.area();
        let contour_area = polygon_area(contour.points());
        let hull_area = polygon_area(&convex_hull(contour.points()));
        let extent = if area > 0 {
            contour_area / area as f64
        } else {
            0.0
        };
        let solidity = (hull_area > 0.0).then(|| contour_area / hull_area);
        Some(Self {
            bbox,
            area,
            contour_area,
            hull_area,
            aspect_ratio: bbox.aspect_ratio(),
            extent,
            solidity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pts(list: &[(i32, i32)]) -> Vec<Point> {
        list.iter().map(|&(x, y)| Point::new(x, y)).collect()
    }

    #[test]
    fn shoelace_area_ignores_orientation() {
        let square = pts(&[(0, 0), (4, 0), (4, 3), (0, 3)]);
        assert_eq!(polygon_area(&square), 12.0);
        let reversed: Vec<Point> = square.iter().rev().copied().collect();
        assert_eq!(polygon_area(&reversed), 12.0);
        assert_eq!(polygon_area(&pts(&[(0, 0), (5, 5)])), 0.0);
    }

    #[test]
    fn hull_drops_concave_and_interior_points() {
        let l_shape = pts(&[(0, 0), (4, 0), (4, 1), (1, 1), (1, 4), (0, 4), (2, 2)]);
        let hull = convex_hull(&l_shape);
        assert_eq!(polygon_area(&hull), 11.5);
        let mut vertices = hull.clone();
        vertices.sort_unstable();
        assert_eq!(vertices, pts(&[(0, 0), (0, 4), (1, 4), (4, 0), (4, 1)]));
    }

    #[test]
    fn repeated_contour_points_do_not_change_the_hull() {
        let traced = pts(&[(0, 0), (3, 0), (3, 2), (3, 0), (0, 2), (0, 0), (0, 2), (3, 2)]);
        assert_eq!(polygon_area(&convex_hull(&traced)), 6.0);
    }

    #[test]
    fn collinear_points_have_empty_hull_area() {
        let line = pts(&[(0, 0), (1, 1), (2, 2), (3, 3)]);
        let hull = convex_hull(&line);
        assert_eq!(polygon_area(&hull), 0.0);
    }

    #[test]
    fn descriptors_of_l_shaped_contour() {
        let contour = Contour::new(pts(&[(0, 0), (9, 0), (9, 2), (2, 2), (2, 9), (0, 9)]));
        let d = ShapeDescriptors::from_contour(&contour).unwrap();
        assert_eq!(d.bbox, BoundingBox::new(0, 0, 10, 10));
        assert_eq!(d.area, 100);
        assert_eq!(d.contour_area, 32.0);
        assert_eq!(d.hull_area, 56.5);
        assert!((d.solidity.unwrap() - 32.0 / 56.5).abs() < 1e-12);
        assert!((d.extent - 0.32).abs() < 1e-12);
        assert_eq!(d.aspect_ratio, 1.0);
    }

    #[test]
    fn degenerate_contour_has_no_solidity() {
        let contour = Contour::new(pts(&[(3, 3), (8, 3)]));
        let d = ShapeDescriptors::from_contour(&contour).unwrap();
        assert_eq!(d.bbox, BoundingBox::new(3, 3, 6, 1));
        assert_eq!(d.solidity, None);
    }
}
