use glam::DVec2;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

// Tolerances are in virtual screen pixels (or pixels squared for areas).
pub const EPSILON: f64 = 1e-9;
const HIT_MERGE_DISTANCE: f64 = 1e-6;
const AREA_EPSILON: f64 = 1e-6;

// --- Screen ---

/// The flat virtual screen demands are projected onto. The origin is the
/// top-left corner, `y` grows downwards.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Screen {
    pub width: u32,
    pub height: u32,
}

impl Screen {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    #[inline(always)]
    pub fn size(&self) -> DVec2 {
        DVec2::new(f64::from(self.width), f64::from(self.height))
    }

    /// Closed-rectangle test: points on the border count as visible.
    #[inline(always)]
    pub fn contains(&self, p: DVec2) -> bool {
        let size = self.size();
        (0.0..=size.x).contains(&p.x) && (0.0..=size.y).contains(&p.y)
    }

    #[inline(always)]
    pub fn clamp(&self, p: DVec2) -> DVec2 {
        p.clamp(DVec2::ZERO, self.size())
    }

    /// Corners in winding order: top-left, top-right, bottom-right, bottom-left.
    pub fn corners(&self) -> [DVec2; 4] {
        let size = self.size();
        [
            DVec2::ZERO,
            DVec2::new(size.x, 0.0),
            size,
            DVec2::new(0.0, size.y),
        ]
    }

    pub fn edges(&self) -> [(DVec2, DVec2); 4] {
        let c = self.corners();
        [(c[0], c[1]), (c[1], c[2]), (c[2], c[3]), (c[3], c[0])]
    }
}

// --- Lines ---

/// Intersection of the two infinite lines through `a` and `b`, or `None`
/// when they are parallel (or either is degenerate).
pub fn line_intersection(a: (DVec2, DVec2), b: (DVec2, DVec2)) -> Option<DVec2> {
    let r = a.1 - a.0;
    let s = b.1 - b.0;
    let denom = r.perp_dot(s);
    let scale = r.length() * s.length();
    if scale <= EPSILON || denom.abs() <= EPSILON * scale {
        return None;
    }
    let t = (b.0 - a.0).perp_dot(s) / denom;
    Some(a.0 + r * t)
}

/// Bounding-box test for a point already known to lie on the segment's line.
#[inline(always)]
fn within_segment(p: DVec2, segment: (DVec2, DVec2)) -> bool {
    let lo = segment.0.min(segment.1) - DVec2::splat(HIT_MERGE_DISTANCE);
    let hi = segment.0.max(segment.1) + DVec2::splat(HIT_MERGE_DISTANCE);
    p.cmpge(lo).all() && p.cmple(hi).all()
}

/// Where the judgment-strip axis through `point` crosses the screen border.
///
/// The axis is perpendicular to the judgment line, i.e. parallel to
/// `direction` rotated by 90 degrees. Hits shared by two edges (corners) are
/// reported once. An axis collinear with an edge does not intersect that edge;
/// it reports the two corners through the perpendicular edges instead.
pub fn strip_axis_hits(
    screen: &Screen,
    point: DVec2,
    direction: DVec2,
) -> SmallVec<[DVec2; 4]> {
    let mut hits: SmallVec<[DVec2; 4]> = SmallVec::new();
    let axis = direction.perp();
    if axis.length_squared() <= EPSILON {
        return hits;
    }
    let line = (point, point + axis);
    for edge in screen.edges() {
        let Some(hit) = line_intersection(line, edge) else {
            continue;
        };
        if !within_segment(hit, edge) {
            continue;
        }
        if hits.iter().all(|h| h.distance(hit) > HIT_MERGE_DISTANCE) {
            hits.push(hit);
        }
    }
    hits
}

// --- Convex polygons ---

/// A convex polygon stored as its vertex ring. Winding may be either way;
/// operations look at the sign of the area when they need it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConvexPolygon {
    vertices: Vec<DVec2>,
}

impl ConvexPolygon {
    pub fn new(vertices: Vec<DVec2>) -> Self {
        Self { vertices }
    }

    pub fn from_screen(screen: &Screen) -> Self {
        Self::new(screen.corners().to_vec())
    }

    pub fn vertices(&self) -> &[DVec2] {
        &self.vertices
    }

    pub fn signed_area(&self) -> f64 {
        let n = self.vertices.len();
        if n < 3 {
            return 0.0;
        }
        let mut twice = 0.0;
        for i in 0..n {
            let a = self.vertices[i];
            let b = self.vertices[(i + 1) % n];
            twice += a.perp_dot(b);
        }
        twice * 0.5
    }

    #[inline(always)]
    pub fn area(&self) -> f64 {
        self.signed_area().abs()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.len() < 3 || self.area() <= AREA_EPSILON
    }

    /// Sutherland-Hodgman step: keeps the part where `(p - origin) . normal <= 0`.
    pub fn clip_half_plane(&self, origin: DVec2, normal: DVec2) -> Self {
        let n = self.vertices.len();
        let mut out = Vec::with_capacity(n + 2);
        for i in 0..n {
            let cur = self.vertices[i];
            let next = self.vertices[(i + 1) % n];
            let dc = (cur - origin).dot(normal);
            let dn = (next - origin).dot(normal);
            if dc <= 0.0 {
                out.push(cur);
            }
            if (dc < 0.0 && dn > 0.0) || (dc > 0.0 && dn < 0.0) {
                let t = dc / (dc - dn);
                out.push(cur + (next - cur) * t);
            }
        }
        Self::new(out)
    }

    pub fn intersection(&self, other: &Self) -> Self {
        if self.is_empty() || other.is_empty() {
            return Self::default();
        }
        let orientation = other.signed_area().signum();
        let n = other.vertices.len();
        let mut clipped = self.clone();
        for i in 0..n {
            let a = other.vertices[i];
            let b = other.vertices[(i + 1) % n];
            let normal = -orientation * (b - a).perp();
            clipped = clipped.clip_half_plane(a, normal);
            if clipped.vertices.is_empty() {
                break;
            }
        }
        clipped
    }

    #[inline(always)]
    pub fn intersects(&self, other: &Self) -> bool {
        !self.intersection(other).is_empty()
    }

    /// Area centroid; falls back to the vertex mean for sliver polygons.
    pub fn centroid(&self) -> Option<DVec2> {
        let n = self.vertices.len();
        if n == 0 {
            return None;
        }
        let area = self.signed_area();
        if area.abs() <= AREA_EPSILON {
            let sum: DVec2 = self.vertices.iter().copied().sum();
            return Some(sum / n as f64);
        }
        let mut acc = DVec2::ZERO;
        for i in 0..n {
            let a = self.vertices[i];
            let b = self.vertices[(i + 1) % n];
            acc += (a + b) * a.perp_dot(b);
        }
        Some(acc / (6.0 * area))
    }

    pub fn contains(&self, p: DVec2) -> bool {
        if self.is_empty() {
            return false;
        }
        let orientation = self.signed_area().signum();
        let n = self.vertices.len();
        (0..n).all(|i| {
            let a = self.vertices[i];
            let b = self.vertices[(i + 1) % n];
            orientation * (b - a).perp_dot(p - a) >= -HIT_MERGE_DISTANCE
        })
    }
}

/// The judgment strip of a note: the band of `width` around the axis through
/// `point` perpendicular to the judgment line, clipped to the screen.
pub fn judgment_strip(
    screen: &Screen,
    point: DVec2,
    direction: DVec2,
    width: f64,
) -> ConvexPolygon {
    let screen_poly = ConvexPolygon::from_screen(screen);
    let d = direction.normalize_or_zero();
    if d == DVec2::ZERO {
        return screen_poly;
    }
    let half = width * 0.5;
    screen_poly
        .clip_half_plane(point + d * half, d)
        .clip_half_plane(point - d * half, -d)
}

/// Distance from `p` to the strip axis through `origin`, measured along the
/// judgment line's `direction`.
#[inline(always)]
pub fn strip_offset(origin: DVec2, direction: DVec2, p: DVec2) -> f64 {
    (p - origin).dot(direction.normalize_or_zero()).abs()
}
