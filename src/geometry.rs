//! Planar geometry used by calibration and detection
//!
//! All angles are in degrees. Image coordinates are y-down, so a positive
//! angle from [`angle_between`] means the second vector lies clockwise of the
//! first as seen on screen.

use nalgebra::{Matrix3, Vector3};

/// A circle in image coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Circle {
    pub center: [f64; 2],
    pub radius: f64,
}

impl Circle {
    pub fn new(center: [f64; 2], radius: f64) -> Self {
        Self { center, radius }
    }

    /// Whether `p` lies inside or on the circle, with a small tolerance
    pub fn contains(&self, p: [f64; 2]) -> bool {
        distance(self.center, p) <= self.radius + 1e-7 * (1.0 + self.radius)
    }
}

/// Area and centroid of a closed polygon
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolygonMoments {
    /// Unsigned enclosed area (zeroth moment)
    pub area: f64,
    /// Centroid, `None` when the polygon encloses no area
    pub centroid: Option<[f64; 2]>,
}

/// Signed angle in degrees from `v1` to `v2`, in `(-180, 180]`
pub fn angle_between(v1: [f64; 2], v2: [f64; 2]) -> f64 {
    let cross = v1[0] * v2[1] - v1[1] * v2[0];
    let dot = v1[0] * v2[0] + v1[1] * v2[1];
    // -0.0 would put antiparallel vectors at -180
    (cross + 0.0).atan2(dot).to_degrees()
}

/// Euclidean distance between two points
pub fn distance(a: [f64; 2], b: [f64; 2]) -> f64 {
    (a[0] - b[0]).hypot(a[1] - b[1])
}

/// Algebraic (Kåsa) least-squares circle fit.
///
/// Solves `x² + y² + D·x + E·y + F = 0` in the least-squares sense on
/// mean-centred coordinates. Returns `None` for fewer than three points or
/// when the points are collinear.
pub fn fit_circle(points: &[[f64; 2]]) -> Option<Circle> {
    if points.len() < 3 {
        return None;
    }

    let n = points.len() as f64;
    let mean_x = points.iter().map(|p| p[0]).sum::<f64>() / n;
    let mean_y = points.iter().map(|p| p[1]).sum::<f64>() / n;

    // Normal equations AᵀA·p = Aᵀb with rows [u, v, 1] and b = -(u² + v²)
    let mut ata = Matrix3::<f64>::zeros();
    let mut atb = Vector3::<f64>::zeros();
    for p in points {
        let u = p[0] - mean_x;
        let v = p[1] - mean_y;
        let row = Vector3::new(u, v, 1.0);
        ata += row * row.transpose();
        atb += row * -(u * u + v * v);
    }

    let scale = ata.norm();
    if scale == 0.0 || ata.determinant().abs() <= 1e-12 * scale.powi(3) {
        return None;
    }
    let solution = ata.lu().solve(&atb)?;

    let cu = -solution[0] / 2.0;
    let cv = -solution[1] / 2.0;
    let r_sq = cu * cu + cv * cv - solution[2];
    if !r_sq.is_finite() || r_sq <= 0.0 {
        return None;
    }

    Some(Circle::new([cu + mean_x, cv + mean_y], r_sq.sqrt()))
}

/// Smallest circle enclosing all points (incremental Welzl on the convex hull)
pub fn min_enclosing_circle(points: &[[i32; 2]]) -> Option<Circle> {
    let hull: Vec<[f64; 2]> = convex_hull(points)
        .into_iter()
        .map(|p| [p[0] as f64, p[1] as f64])
        .collect();
    let first = *hull.first()?;

    let mut circle = Circle::new(first, 0.0);
    for i in 1..hull.len() {
        if circle.contains(hull[i]) {
            continue;
        }
        circle = Circle::new(hull[i], 0.0);
        for j in 0..i {
            if circle.contains(hull[j]) {
                continue;
            }
            circle = circle_from_two(hull[i], hull[j]);
            for k in 0..j {
                if !circle.contains(hull[k]) {
                    circle = circle_from_three(hull[i], hull[j], hull[k]);
                }
            }
        }
    }
    Some(circle)
}

/// Moments of a closed polygon given by its vertices in order.
///
/// Integer accumulation keeps symmetric shapes exact, so a disc centred on a
/// pixel yields exactly that pixel as centroid.
pub fn polygon_moments(points: &[[i32; 2]]) -> PolygonMoments {
    let n = points.len();
    let (mut s00, mut s10, mut s01) = (0i64, 0i64, 0i64);
    for i in 0..n {
        let [x0, y0] = points[i];
        let [x1, y1] = points[(i + 1) % n];
        let (x0, y0, x1, y1) = (x0 as i64, y0 as i64, x1 as i64, y1 as i64);
        let cross = x0 * y1 - x1 * y0;
        s00 += cross;
        s10 += (x0 + x1) * cross;
        s01 += (y0 + y1) * cross;
    }

    let area = (s00 as f64 / 2.0).abs();
    let centroid = if s00 == 0 {
        None
    } else {
        let denom = 3.0 * s00 as f64;
        Some([s10 as f64 / denom, s01 as f64 / denom])
    };
    PolygonMoments { area, centroid }
}

/// Convex hull (Andrew's monotone chain), counter-clockwise, without duplicates
pub fn convex_hull(points: &[[i32; 2]]) -> Vec<[i32; 2]> {
    let mut pts = points.to_vec();
    pts.sort_unstable();
    pts.dedup();
    if pts.len() < 3 {
        return pts;
    }

    fn turn(o: [i32; 2], a: [i32; 2], b: [i32; 2]) -> i64 {
        (a[0] - o[0]) as i64 * (b[1] - o[1]) as i64 - (a[1] - o[1]) as i64 * (b[0] - o[0]) as i64
    }

    let mut hull: Vec<[i32; 2]> = Vec::with_capacity(pts.len() * 2);
    for &p in &pts {
        while hull.len() >= 2 && turn(hull[hull.len() - 2], hull[hull.len() - 1], p) <= 0 {
            hull.pop();
        }
        hull.push(p);
    }
    let lower_len = hull.len() + 1;
    for &p in pts.iter().rev().skip(1) {
        while hull.len() >= lower_len && turn(hull[hull.len() - 2], hull[hull.len() - 1], p) <= 0 {
            hull.pop();
        }
        hull.push(p);
    }
    hull.pop();
    hull
}

fn circle_from_two(a: [f64; 2], b: [f64; 2]) -> Circle {
    let center = [(a[0] + b[0]) / 2.0, (a[1] + b[1]) / 2.0];
    Circle::new(center, distance(a, b) / 2.0)
}

fn circle_from_three(a: [f64; 2], b: [f64; 2], c: [f64; 2]) -> Circle {
    let d = 2.0 * (a[0] * (b[1] - c[1]) + b[0] * (c[1] - a[1]) + c[0] * (a[1] - b[1]));
    if d.abs() < 1e-12 {
        // Collinear: the widest pair spans the others
        let candidates = [circle_from_two(a, b), circle_from_two(a, c), circle_from_two(b, c)];
        return candidates
            .into_iter()
            .fold(candidates[0], |best, c| if c.radius > best.radius { c } else { best });
    }
    let a_sq = a[0] * a[0] + a[1] * a[1];
    let b_sq = b[0] * b[0] + b[1] * b[1];
    let c_sq = c[0] * c[0] + c[1] * c[1];
    let ux = (a_sq * (b[1] - c[1]) + b_sq * (c[1] - a[1]) + c_sq * (a[1] - b[1])) / d;
    let uy = (a_sq * (c[0] - b[0]) + b_sq * (a[0] - c[0]) + c_sq * (b[0] - a[0])) / d;
    let center = [ux, uy];
    Circle::new(center, distance(center, a))
}
