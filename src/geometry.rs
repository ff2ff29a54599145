//! The geometry kernel (spec §4.7): coordinate algebra, three-point circle
//! fit, circle/circle intersection, orthogonal-plane detection, and angle
//! and distance helpers shared by Phase 2's arc recognition.

use crate::coord::{Axis, Coord};

/// `atan2(a, b)` in degrees, in the range `(-180, 180]`.
pub fn angle(a: f64, b: f64) -> f64 {
    let deg = a.atan2(b).to_degrees();
    if deg <= -180.0 {
        deg + 360.0
    } else {
        deg
    }
}

/// Euclidean distance between two coords, over whichever axes both have set.
/// (In normal use both coords carry full XYZ, per the Phase-1 invariant.)
pub fn distance(a: Coord, b: Coord) -> f64 {
    let delta = a - b;
    delta
        .set()
        .into_iter()
        .map(|axis| delta.get(axis).unwrap_or(0.0).powi(2))
        .sum::<f64>()
        .sqrt()
}

/// `sign(ΔBx·ΔCy − ΔBy·ΔCx)`, origin at `a`, in 2-D `(u, v)` coordinates.
pub fn direction_of_point(a: (f64, f64), b: (f64, f64), c: (f64, f64)) -> i32 {
    let cross = (b.0 - a.0) * (c.1 - a.1) - (b.1 - a.1) * (c.0 - a.0);
    if cross > 0.0 {
        1
    } else if cross < 0.0 {
        -1
    } else {
        0
    }
}

/// Given a set of coords, returns `(constant_axis, axis_u, axis_v)` — the
/// single axis that is identical across every coord (the plane's normal) and
/// the remaining two axes (in canonical X,Y,Z order), provided every coord
/// also has both of those set. `None` when no single axis qualifies or a
/// projection axis is missing on some input.
pub fn orthogonal_plane(coords: &[Coord]) -> Option<(Axis, Axis, Axis)> {
    let constant = Coord::ortho(coords);
    if constant.len() != 1 {
        return None;
    }
    let const_axis = constant[0];
    let remaining: Vec<Axis> = Axis::ALL.iter().copied().filter(|a| *a != const_axis).collect();
    let (u, v) = (remaining[0], remaining[1]);
    if coords.iter().all(|c| c.is_set(u) && c.is_set(v)) {
        Some((const_axis, u, v))
    } else {
        None
    }
}

fn project(coord: Coord, u: Axis, v: Axis) -> (f64, f64) {
    (coord.get(u).unwrap_or(0.0), coord.get(v).unwrap_or(0.0))
}

/// Result of a successful three-point circle fit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CircleFit {
    pub center: Coord,
    pub radius: f64,
    /// Handedness of the `a -> b -> c` traversal around `center`.
    pub clockwise: bool,
}

/// Fits a circle through three coplanar points (spec §4.7).
///
/// Returns `None` when the points are not coplanar on one of the XY/XZ/YZ
/// orthogonal planes, are colinear, or yield an infinite determinant.
pub fn find_circle(a: Coord, b: Coord, c: Coord) -> Option<CircleFit> {
    let (const_axis, u, v) = orthogonal_plane(&[a, b, c])?;
    let (x1, y1) = project(a, u, v);
    let (x2, y2) = project(b, u, v);
    let (x3, y3) = project(c, u, v);

    let a1 = 2.0 * (x2 - x1);
    let b1 = 2.0 * (y2 - y1);
    let c1 = x2 * x2 + y2 * y2 - x1 * x1 - y1 * y1;
    let a2 = 2.0 * (x3 - x1);
    let b2 = 2.0 * (y3 - y1);
    let c2 = x3 * x3 + y3 * y3 - x1 * x1 - y1 * y1;

    let det = a1 * b2 - a2 * b1;
    if !det.is_finite() || det.abs() < 1e-9 {
        return None;
    }

    let center_u = (c1 * b2 - c2 * b1) / det;
    let center_v = (a1 * c2 - a2 * c1) / det;
    if !center_u.is_finite() || !center_v.is_finite() {
        return None;
    }

    let radius = round5(((x1 - center_u).powi(2) + (y1 - center_v).powi(2)).sqrt());

    let const_value = a.get(const_axis).unwrap_or(0.0);
    let mut center = Coord::empty();
    center = center.with(u, center_u);
    center = center.with(v, center_v);
    center = center.with(const_axis, const_value);

    let direction = direction_of_point((x1, y1), (x2, y2), (center_u, center_v));
    let clockwise = direction < 0;

    Some(CircleFit {
        center,
        radius,
        clockwise,
    })
}

/// Intersections of two circles of radius `r` centred at `a` and `b` (spec
/// §4.7). Returns 0, 1, or 2 coords; 0 when the coords don't share an
/// orthogonal plane, when `dist == 0`, or when `dist > 2r`.
pub fn find_intersections(a: Coord, b: Coord, r: f64) -> Vec<Coord> {
    let Some((const_axis, u, v)) = orthogonal_plane(&[a, b]) else {
        return Vec::new();
    };
    let (ax, ay) = project(a, u, v);
    let (bx, by) = project(b, u, v);
    let dx = bx - ax;
    let dy = by - ay;
    let dist = (dx * dx + dy * dy).sqrt();

    if dist == 0.0 || dist > 2.0 * r {
        return Vec::new();
    }

    let a_len = dist / 2.0;
    let h = (r * r - a_len * a_len).max(0.0).sqrt();
    let mx = ax + a_len * dx / dist;
    let my = ay + a_len * dy / dist;
    let const_value = a.get(const_axis).unwrap_or(0.0);

    let make = |u_val: f64, v_val: f64| -> Coord {
        let mut c = Coord::empty();
        c = c.with(u, u_val);
        c = c.with(v, v_val);
        c = c.with(const_axis, const_value);
        c
    };

    if h.abs() < 1e-9 {
        vec![make(mx, my)]
    } else {
        vec![
            make(mx - h * dy / dist, my + h * dx / dist),
            make(mx + h * dy / dist, my - h * dx / dist),
        ]
    }
}

fn round5(v: f64) -> f64 {
    (v * 100_000.0).round() / 100_000.0
}
