//! External contour extraction from binary masks.
//!
//! Foreground (non-zero) pixels are grouped 8-connected; background is
//! 4-connected, so every component is enclosed by a 4-connected ring of
//! background. A component is *external* when that ring belongs to the
//! background region that reaches the image border. Components sitting inside
//! the hole of another component are skipped, as are holes themselves.
//!
//! Boundaries are traced with Moore-neighbour tracing, clockwise in image
//! coordinates (y grows downward), starting at the top-most, left-most pixel.

use std::collections::VecDeque;

use image::GrayImage;

use super::result::BoundingBox;

/// Integer pixel position.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Closed boundary polyline. The last point connects back to the first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Contour {
    points: Vec<Point>,
}

impl Contour {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Bounding rectangle including the boundary pixels themselves.
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        let first = self.points.first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in &self.points[1..] {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        Some(BoundingBox::new(
            min_x,
            min_y,
            (max_x - min_x + 1) as u32,
            (max_y - min_y + 1) as u32,
        ))
    }

    /// Drop the interior points of straight horizontal, vertical and diagonal
    /// runs. Bounding box, polygon area and hull are unchanged.
    pub fn simplified(&self) -> Contour {
        let n = self.points.len();
        if n < 3 {
            return self.clone();
        }
        let points = (0..n)
            .filter(|&i| {
                let prev = self.points[(i + n - 1) % n];
                let cur = self.points[i];
                let next = self.points[(i + 1) % n];
                (cur.x - prev.x, cur.y - prev.y) != (next.x - cur.x, next.y - cur.y)
            })
            .map(|i| self.points[i])
            .collect();
        Contour { points }
    }
}

// Clockwise on screen: E, SE, S, SW, W, NW, N, NE.
const DIRS: [(i32, i32); 8] = [
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
];
const WEST: usize = 4;

fn dir_index(dx: i32, dy: i32) -> usize {
    DIRS.iter()
        .position(|&d| d == (dx, dy))
        .unwrap_or(WEST)
}

struct Labels {
    width: i32,
    height: i32,
    labels: Vec<u32>,
}

impl Labels {
    fn get(&self, x: i32, y: i32) -> u32 {
        if x < 0 || y < 0 || x >= self.width || y >= self.height {
            return 0;
        }
        self.labels[(y * self.width + x) as usize]
    }
}

/// Trace the outer boundaries of all external foreground components.
///
/// Contours are returned in raster order of their starting pixel.
pub fn extract_external_contours(mask: &GrayImage) -> Vec<Contour> {
    let (width, height) = (mask.width() as i32, mask.height() as i32);
    if width == 0 || height == 0 {
        return Vec::new();
    }
    let raw = mask.as_raw();
    let idx = |x: i32, y: i32| (y * width + x) as usize;
    let fg = |x: i32, y: i32| raw[idx(x, y)] > 0;

    // 8-connected component labelling; `starts[l - 1]` is the first pixel in raster order.
    let mut labels = vec![0u32; raw.len()];
    let mut starts: Vec<Point> = Vec::new();
    let mut queue = VecDeque::new();
    for y in 0..height {
        for x in 0..width {
            if !fg(x, y) || labels[idx(x, y)] != 0 {
                continue;
            }
            starts.push(Point::new(x, y));
            let label = starts.len() as u32;
            labels[idx(x, y)] = label;
            queue.push_back((x, y));
            while let Some((cx, cy)) = queue.pop_front() {
                for (dx, dy) in DIRS {
                    let (nx, ny) = (cx + dx, cy + dy);
                    if nx < 0 || ny < 0 || nx >= width || ny >= height {
                        continue;
                    }
                    if fg(nx, ny) && labels[idx(nx, ny)] == 0 {
                        labels[idx(nx, ny)] = label;
                        queue.push_back((nx, ny));
                    }
                }
            }
        }
    }
    if starts.is_empty() {
        return Vec::new();
    }

    // Background reachable from the border through 4-connected background.
    let mut outside = vec![false; raw.len()];
    for y in 0..height {
        for x in 0..width {
            let on_border = x == 0 || y == 0 || x == width - 1 || y == height - 1;
            if on_border && !fg(x, y) && !outside[idx(x, y)] {
                outside[idx(x, y)] = true;
                queue.push_back((x, y));
            }
        }
    }
    while let Some((cx, cy)) = queue.pop_front() {
        for (dx, dy) in [(1, 0), (-1, 0), (0, 1), (0, -1)] {
            let (nx, ny) = (cx + dx, cy + dy);
            if nx < 0 || ny < 0 || nx >= width || ny >= height {
                continue;
            }
            if !fg(nx, ny) && !outside[idx(nx, ny)] {
                outside[idx(nx, ny)] = true;
                queue.push_back((nx, ny));
            }
        }
    }

    let mut external = vec![false; starts.len() + 1];
    for y in 0..height {
        for x in 0..width {
            let label = labels[idx(x, y)];
            if label == 0 || external[label as usize] {
                continue;
            }
            let touches_outside = [(1, 0), (-1, 0), (0, 1), (0, -1)].iter().any(|&(dx, dy)| {
                let (nx, ny) = (x + dx, y + dy);
                nx < 0 || ny < 0 || nx >= width || ny >= height || outside[idx(nx, ny)]
            });
            if touches_outside {
                external[label as usize] = true;
            }
        }
    }

    let labels = Labels {
        width,
        height,
        labels,
    };
    starts
        .iter()
        .enumerate()
        .filter(|(i, _)| external[i + 1])
        .map(|(i, &start)| trace_boundary(&labels, i as u32 + 1, start))
        .collect()
}

/// Moore-neighbour step: scan clockwise from the backtrack direction and
/// return the next boundary pixel with the backtrack direction seen from it.
fn step(labels: &Labels, label: u32, p: Point, back: usize) -> Option<(Point, usize)> {
    for k in 1..=8 {
        let d = (back + k) % 8;
        let c = Point::new(p.x + DIRS[d].0, p.y + DIRS[d].1);
        if labels.get(c.x, c.y) == label {
            let prev_dir = (back + k - 1) % 8;
            let prev = Point::new(p.x + DIRS[prev_dir].0, p.y + DIRS[prev_dir].1);
            return Some((c, dir_index(prev.x - c.x, prev.y - c.y)));
        }
    }
    None
}

fn trace_boundary(labels: &Labels, label: u32, start: Point) -> Contour {
    let mut points = vec![start];
    // The start pixel is top-most, left-most: its west neighbour is background.
    let Some((second, mut back)) = step(labels, label, start, WEST) else {
        return Contour { points };
    };
    let limit = 4 * labels.labels.len() + 8;
    let mut cur = second;
    while points.len() <= limit {
        let Some((next, next_back)) = step(labels, label, cur, back) else {
            break;
        };
        // Jacob's criterion: stop when the first move is about to repeat.
        if cur == start && next == second {
            break;
        }
        points.push(cur);
        cur = next;
        back = next_back;
    }
    Contour { points }
}
