//! Collision shapes and pairwise intersection tests
//!
//! Rotations are stored in radians. Constructors and setters take degrees,
//! matching the entity model, and convert once so intersection tests never do.

use glam::Vec2;

/// Below this, a squared length or a segment-pair determinant is treated as zero.
const EPSILON: f32 = 1e-6;

/// Circle collider
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Circle {
    pub center: Vec2,
    pub radius: f32,
}

impl Circle {
    pub fn new(center: Vec2, radius: f32) -> Self {
        Self { center, radius }
    }
}

/// Oriented rectangle collider
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub center: Vec2,
    pub half_extents: Vec2,
    rotation: f32,
}

impl Rect {
    pub fn new(center: Vec2, half_extents: Vec2, rotation_degrees: f32) -> Self {
        Self {
            center,
            half_extents,
            rotation: rotation_degrees.to_radians(),
        }
    }

    pub fn set_rotation_degrees(&mut self, degrees: f32) {
        self.rotation = degrees.to_radians();
    }

    /// Rotation in radians
    pub fn rotation(&self) -> f32 {
        self.rotation
    }

    /// Local x and y axes in world space
    fn axes(&self) -> (Vec2, Vec2) {
        let x_axis = Vec2::from_angle(self.rotation);
        (x_axis, x_axis.perp())
    }

    /// World point expressed in this rectangle's axis-aligned frame
    fn to_local(&self, point: Vec2) -> Vec2 {
        Vec2::from_angle(-self.rotation).rotate(point - self.center)
    }

    /// Half the rectangle's extent when projected onto `axis` (unit length)
    fn projected_radius(&self, axis: Vec2) -> f32 {
        let (x_axis, y_axis) = self.axes();
        self.half_extents.x * x_axis.dot(axis).abs() + self.half_extents.y * y_axis.dot(axis).abs()
    }

    /// Capsule along the long axis that contains the rectangle
    fn enclosing_capsule(&self) -> Capsule {
        let (x_axis, y_axis) = self.axes();
        let (axis, half_length, radius) = if self.half_extents.x >= self.half_extents.y {
            (x_axis, self.half_extents.x, self.half_extents.y)
        } else {
            (y_axis, self.half_extents.y, self.half_extents.x)
        };
        Capsule::from_segment(
            self.center - axis * half_length,
            self.center + axis * half_length,
            radius,
        )
    }
}

/// Capsule collider: a centerline segment swept by a radius
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Capsule {
    pub center: Vec2,
    pub half_length: f32,
    pub radius: f32,
    rotation: f32,
}

impl Capsule {
    pub fn new(center: Vec2, half_length: f32, radius: f32, rotation_degrees: f32) -> Self {
        Self {
            center,
            half_length,
            radius,
            rotation: rotation_degrees.to_radians(),
        }
    }

    /// Capsule whose centerline runs from `start` to `end`
    pub fn from_segment(start: Vec2, end: Vec2, radius: f32) -> Self {
        let delta = end - start;
        Self {
            center: (start + end) * 0.5,
            half_length: delta.length() * 0.5,
            radius,
            rotation: delta.y.atan2(delta.x),
        }
    }

    pub fn set_rotation_degrees(&mut self, degrees: f32) {
        self.rotation = degrees.to_radians();
    }

    /// Rotation in radians
    pub fn rotation(&self) -> f32 {
        self.rotation
    }

    /// Centerline endpoints
    pub fn segment(&self) -> (Vec2, Vec2) {
        let offset = Vec2::from_angle(self.rotation) * self.half_length;
        (self.center - offset, self.center + offset)
    }
}

/// Shape attached to an entity for intersection testing
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Collider {
    Circle(Circle),
    Rect(Rect),
    Capsule(Capsule),
}

impl Collider {
    /// True when the two shapes overlap (touching counts)
    pub fn intersects(&self, other: &Collider) -> bool {
        match (self, other) {
            (Collider::Circle(a), Collider::Circle(b)) => circle_circle(a, b),
            (Collider::Circle(c), Collider::Rect(r)) | (Collider::Rect(r), Collider::Circle(c)) => {
                circle_rect(c, r)
            }
            (Collider::Circle(c), Collider::Capsule(k))
            | (Collider::Capsule(k), Collider::Circle(c)) => circle_capsule(c, k),
            (Collider::Capsule(a), Collider::Capsule(b)) => capsule_capsule(a, b),
            (Collider::Rect(a), Collider::Rect(b)) => rect_rect(a, b),
            (Collider::Capsule(k), Collider::Rect(r)) | (Collider::Rect(r), Collider::Capsule(k)) => {
                capsule_rect(k, r)
            }
        }
    }

    /// Anchor point of the shape
    pub fn center(&self) -> Vec2 {
        match self {
            Collider::Circle(c) => c.center,
            Collider::Rect(r) => r.center,
            Collider::Capsule(k) => k.center,
        }
    }

    /// Move the shape to an entity's current pose. Circles ignore rotation.
    pub fn sync(&mut self, center: Vec2, rotation_degrees: f32) {
        match self {
            Collider::Circle(c) => c.center = center,
            Collider::Rect(r) => {
                r.center = center;
                r.set_rotation_degrees(rotation_degrees);
            }
            Collider::Capsule(k) => {
                k.center = center;
                k.set_rotation_degrees(rotation_degrees);
            }
        }
    }
}

pub fn circle_circle(a: &Circle, b: &Circle) -> bool {
    let reach = a.radius + b.radius;
    a.center.distance_squared(b.center) <= reach * reach
}

pub fn circle_rect(circle: &Circle, rect: &Rect) -> bool {
    let local = rect.to_local(circle.center);
    let nearest = local.clamp(-rect.half_extents, rect.half_extents);
    local.distance_squared(nearest) <= circle.radius * circle.radius
}

pub fn circle_capsule(circle: &Circle, capsule: &Capsule) -> bool {
    let (start, end) = capsule.segment();
    let reach = circle.radius + capsule.radius;
    point_segment_distance_squared(circle.center, start, end) <= reach * reach
}

pub fn capsule_capsule(a: &Capsule, b: &Capsule) -> bool {
    let (a0, a1) = a.segment();
    let (b0, b1) = b.segment();
    let reach = a.radius + b.radius;
    segment_segment_distance_squared(a0, a1, b0, b1) <= reach * reach
}

/// Exact separating-axis test over the four face normals of two oriented rectangles.
pub fn rect_rect(a: &Rect, b: &Rect) -> bool {
    let (ax, ay) = a.axes();
    let (bx, by) = b.axes();
    let offset = b.center - a.center;

    [ax, ay, bx, by].into_iter().all(|axis| {
        offset.dot(axis).abs() <= a.projected_radius(axis) + b.projected_radius(axis)
    })
}

/// Conservative: the rectangle is replaced by the capsule enclosing it, so
/// contacts near the rectangle's corners may report a false overlap.
pub fn capsule_rect(capsule: &Capsule, rect: &Rect) -> bool {
    capsule_capsule(capsule, &rect.enclosing_capsule())
}

pub fn point_segment_distance_squared(point: Vec2, start: Vec2, end: Vec2) -> f32 {
    let along = end - start;
    let length_sq = along.length_squared();
    let t = if length_sq <= EPSILON {
        0.0
    } else {
        ((point - start).dot(along) / length_sq).clamp(0.0, 1.0)
    };
    (start + along * t).distance_squared(point)
}

/// Squared distance between the closest points of segments `p1-q1` and `p2-q2`.
pub fn segment_segment_distance_squared(p1: Vec2, q1: Vec2, p2: Vec2, q2: Vec2) -> f32 {
    let d1 = q1 - p1;
    let d2 = q2 - p2;
    let r = p1 - p2;
    let a = d1.length_squared();
    let e = d2.length_squared();
    let f = d2.dot(r);

    // Both segments degenerate into points
    if a <= EPSILON && e <= EPSILON {
        return r.length_squared();
    }

    let (s, t) = if a <= EPSILON {
        (0.0, (f / e).clamp(0.0, 1.0))
    } else {
        let c = d1.dot(r);
        if e <= EPSILON {
            ((-c / a).clamp(0.0, 1.0), 0.0)
        } else {
            let b = d1.dot(d2);
            let denom = a * e - b * b;

            // Parallel segments: any s works, start from p1 and let t clamp
            let mut s = if denom > EPSILON * a * e {
                ((b * f - c * e) / denom).clamp(0.0, 1.0)
            } else {
                0.0
            };

            let mut t = (b * s + f) / e;
            if t < 0.0 {
                t = 0.0;
                s = (-c / a).clamp(0.0, 1.0);
            } else if t > 1.0 {
                t = 1.0;
                s = ((b - c) / a).clamp(0.0, 1.0);
            }
            (s, t)
        }
    };

    (p1 + d1 * s).distance_squared(p2 + d2 * t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn circle(x: f32, y: f32, r: f32) -> Collider {
        Collider::Circle(Circle::new(Vec2::new(x, y), r))
    }

    #[test]
    fn tank_sized_circles_collide_only_when_close() {
        let a = circle(0.0, 0.0, 15.0);
        let far = circle(100.0, 0.0, 15.0);
        let near = circle(20.0, 0.0, 15.0);

        assert!(!a.intersects(&far));
        assert!(a.intersects(&near));
    }

    #[test]
    fn circle_collision_is_symmetric_and_reflexive() {
        let shapes = [
            circle(0.0, 0.0, 1.0),
            circle(3.0, 4.0, 4.0),
            circle(-10.0, 2.5, 0.5),
            circle(2.0, 2.0, 0.0),
        ];
        for a in &shapes {
            assert!(a.intersects(a));
            for b in &shapes {
                assert_eq!(a.intersects(b), b.intersects(a));
            }
        }
    }

    #[test]
    fn circle_against_rotated_rect() {
        // 20x4 bar rotated 90 degrees stands vertically around the origin.
        let bar = Collider::Rect(Rect::new(Vec2::ZERO, Vec2::new(10.0, 2.0), 90.0));

        assert!(circle(0.0, 9.0, 1.0).intersects(&bar));
        assert!(!circle(9.0, 0.0, 1.0).intersects(&bar));
        assert!(circle(3.0, 0.0, 1.5).intersects(&bar));
    }

    #[test]
    fn rect_rect_rejects_overlapping_bounding_boxes() {
        // Thin diagonal bar; the small square sits inside its bounding box but
        // well clear of the bar itself.
        let bar = Collider::Rect(Rect::new(Vec2::ZERO, Vec2::new(10.0, 1.0), 45.0));
        let square = Collider::Rect(Rect::new(Vec2::new(5.0, -5.0), Vec2::new(1.0, 1.0), 0.0));
        let touching = Collider::Rect(Rect::new(Vec2::new(5.0, 5.0), Vec2::new(1.0, 1.0), 0.0));

        assert!(!bar.intersects(&square));
        assert!(bar.intersects(&touching));
        assert!(touching.intersects(&bar));
    }

    #[test]
    fn capsule_collision_is_monotonic_in_radius() {
        let mut a = Capsule::new(Vec2::ZERO, 5.0, 0.5, 0.0);
        let mut b = Capsule::new(Vec2::new(3.0, 7.0), 5.0, 0.5, 90.0);

        let mut was_colliding = capsule_capsule(&a, &b);
        assert!(!was_colliding);
        for _ in 0..40 {
            a.radius += 0.1;
            b.radius += 0.05;
            let now_colliding = capsule_capsule(&a, &b);
            assert!(now_colliding || !was_colliding);
            was_colliding = now_colliding;
        }
        assert!(was_colliding);
    }

    #[test]
    fn parallel_capsules_use_gap_between_lines() {
        let a = Capsule::new(Vec2::ZERO, 5.0, 1.0, 0.0);
        let close = Capsule::new(Vec2::new(2.0, 1.9), 5.0, 1.0, 0.0);
        let far = Capsule::new(Vec2::new(2.0, 2.1), 5.0, 1.0, 0.0);

        assert!(capsule_capsule(&a, &close));
        assert!(!capsule_capsule(&a, &far));
    }

    #[test]
    fn degenerate_capsules_behave_like_circles() {
        let a = Capsule::from_segment(Vec2::ZERO, Vec2::ZERO, 2.0);
        let b = Capsule::from_segment(Vec2::new(3.9, 0.0), Vec2::new(3.9, 0.0), 2.0);
        let c = Capsule::from_segment(Vec2::new(4.1, 0.0), Vec2::new(4.1, 0.0), 2.0);

        assert!(capsule_capsule(&a, &b));
        assert!(!capsule_capsule(&a, &c));
    }

    #[test]
    fn crossing_segments_have_zero_distance() {
        let d = segment_segment_distance_squared(
            Vec2::new(-1.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(0.0, -1.0),
            Vec2::new(0.0, 1.0),
        );
        assert_approx_eq!(d, 0.0, 1e-6);
    }

    #[test]
    fn swept_capsule_catches_tunnelling_bullet() {
        let target = circle(50.0, 0.0, 15.0);
        let swept = Collider::Capsule(Capsule::from_segment(
            Vec2::new(0.0, 0.0),
            Vec2::new(100.0, 0.0),
            4.0,
        ));
        let endpoint_only = circle(100.0, 0.0, 4.0);

        assert!(swept.intersects(&target));
        assert!(!endpoint_only.intersects(&target));
    }

    #[test]
    fn capsule_rect_over_approximates_near_corners() {
        let rect = Rect::new(Vec2::ZERO, Vec2::new(10.0, 2.0), 0.0);
        // Just past the short edge, outside the rectangle but inside the enclosing capsule.
        let probe = Capsule::from_segment(Vec2::new(10.5, 1.0), Vec2::new(10.5, 1.0), 0.1);

        assert!(!circle_rect(&Circle::new(probe.center, probe.radius), &rect));
        assert!(capsule_rect(&probe, &rect));
    }

    #[test]
    fn sync_moves_and_rotates_collider() {
        let mut collider = Collider::Rect(Rect::new(Vec2::ZERO, Vec2::new(4.0, 1.0), 0.0));
        collider.sync(Vec2::new(10.0, 10.0), 180.0);

        assert_eq!(collider.center(), Vec2::new(10.0, 10.0));
        match collider {
            Collider::Rect(r) => assert_approx_eq!(r.rotation(), std::f32::consts::PI, 1e-6),
            _ => unreachable!(),
        }
    }
}
