//! Stateless collision kernel
//!
//! Pure intersection tests shared by the resolver and observation building.
//! All distance comparisons use squared distances; bullet checks use the
//! swept segment for the tick so fast projectiles cannot tunnel through
//! thin colliders at high speed multipliers.

/// Check overlap between two circles
pub fn circles_overlap(x1: f32, y1: f32, r1: f32, x2: f32, y2: f32, r2: f32) -> bool {
    let dx = x2 - x1;
    let dy = y2 - y1;
    let combined = r1 + r2;
    dx * dx + dy * dy <= combined * combined
}

/// Check whether a point lies inside the arena bounds
pub fn point_in_bounds(x: f32, y: f32, width: f32, height: f32) -> bool {
    x >= 0.0 && x <= width && y >= 0.0 && y <= height
}

/// Check overlap between a circle and an axis-aligned rectangle
pub fn circle_rect_overlap(
    cx: f32,
    cy: f32,
    radius: f32,
    rx: f32,
    ry: f32,
    rw: f32,
    rh: f32,
) -> bool {
    // Closest point on the rectangle to the circle center
    let closest_x = cx.clamp(rx, rx + rw);
    let closest_y = cy.clamp(ry, ry + rh);

    let dx = cx - closest_x;
    let dy = cy - closest_y;
    dx * dx + dy * dy < radius * radius
}

/// Earliest intersection of the segment p0->p1 with a circle, as a
/// parameter t in [0, 1]. Returns None if the segment misses.
pub fn segment_hits_circle(
    x0: f32,
    y0: f32,
    x1: f32,
    y1: f32,
    cx: f32,
    cy: f32,
    radius: f32,
) -> Option<f32> {
    let dx = x1 - x0;
    let dy = y1 - y0;
    let fx = x0 - cx;
    let fy = y0 - cy;

    let a = dx * dx + dy * dy;
    if a < 1e-12 {
        // Degenerate segment: point test
        return if fx * fx + fy * fy <= radius * radius {
            Some(0.0)
        } else {
            None
        };
    }

    let b = 2.0 * (fx * dx + fy * dy);
    let c = fx * fx + fy * fy - radius * radius;

    let discriminant = b * b - 4.0 * a * c;
    if discriminant < 0.0 {
        return None;
    }

    let sqrt_d = discriminant.sqrt();
    let t1 = (-b - sqrt_d) / (2.0 * a);
    let t2 = (-b + sqrt_d) / (2.0 * a);

    if (0.0..=1.0).contains(&t1) {
        Some(t1)
    } else if t1 < 0.0 && t2 >= 0.0 {
        // Segment starts inside the circle
        Some(0.0)
    } else {
        None
    }
}

/// Intersection of two segments, as a parameter t along the first segment.
/// Returns None if they do not cross.
#[allow(clippy::too_many_arguments)]
pub fn segment_intersection_t(
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    x3: f32,
    y3: f32,
    x4: f32,
    y4: f32,
) -> Option<f32> {
    let denom = (x1 - x2) * (y3 - y4) - (y1 - y2) * (x3 - x4);
    if denom.abs() < 1e-10 {
        return None;
    }

    let t = ((x1 - x3) * (y3 - y4) - (y1 - y3) * (x3 - x4)) / denom;
    let u = -((x1 - x2) * (y1 - y3) - (y1 - y2) * (x1 - x3)) / denom;

    if (0.0..=1.0).contains(&t) && (0.0..=1.0).contains(&u) {
        Some(t)
    } else {
        None
    }
}

/// Check whether two segments intersect
#[allow(clippy::too_many_arguments)]
pub fn segments_intersect(
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    x3: f32,
    y3: f32,
    x4: f32,
    y4: f32,
) -> bool {
    segment_intersection_t(x1, y1, x2, y2, x3, y3, x4, y4).is_some()
}

/// Earliest intersection of the segment p0->p1 with an axis-aligned
/// rectangle, as a parameter t in [0, 1]. A start point already inside the
/// rectangle yields t = 0.
#[allow(clippy::too_many_arguments)]
pub fn segment_rect_hit_t(
    x0: f32,
    y0: f32,
    x1: f32,
    y1: f32,
    rx: f32,
    ry: f32,
    rw: f32,
    rh: f32,
) -> Option<f32> {
    if x0 >= rx && x0 <= rx + rw && y0 >= ry && y0 <= ry + rh {
        return Some(0.0);
    }

    let edges = [
        (rx, ry, rx + rw, ry),           // top
        (rx + rw, ry, rx + rw, ry + rh), // right
        (rx + rw, ry + rh, rx, ry + rh), // bottom
        (rx, ry + rh, rx, ry),           // left
    ];

    edges
        .iter()
        .filter_map(|&(ex0, ey0, ex1, ey1)| {
            segment_intersection_t(x0, y0, x1, y1, ex0, ey0, ex1, ey1)
        })
        .min_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
}

/// Check whether the segment p0->p1 touches an axis-aligned rectangle
pub fn segment_hits_rect(
    x0: f32,
    y0: f32,
    x1: f32,
    y1: f32,
    rx: f32,
    ry: f32,
    rw: f32,
    rh: f32,
) -> bool {
    // Either endpoint inside counts
    let inside = |x: f32, y: f32| x >= rx && x <= rx + rw && y >= ry && y <= ry + rh;
    if inside(x0, y0) || inside(x1, y1) {
        return true;
    }

    // Otherwise the segment must cross one of the four edges
    let edges = [
        (rx, ry, rx + rw, ry),           // top
        (rx + rw, ry, rx + rw, ry + rh), // right
        (rx + rw, ry + rh, rx, ry + rh), // bottom
        (rx, ry + rh, rx, ry),           // left
    ];

    edges
        .iter()
        .any(|&(ex0, ey0, ex1, ey1)| segments_intersect(x0, y0, x1, y1, ex0, ey0, ex1, ey1))
}
