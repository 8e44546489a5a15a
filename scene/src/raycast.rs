//! Viewport raycasting shared by the backends

use crate::contracts::{ComponentRef, EntityRef};
use glam::{Mat4, Vec3};
use std::fmt;

/// A ray in world space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    /// Normalized direction
    pub direction: Vec3,
}

impl Ray {
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize_or_zero(),
        }
    }

    pub fn at(&self, distance: f32) -> Vec3 {
        self.origin + self.direction * distance
    }

    /// Build a ray through viewport pixel (`x`, `y`)
    ///
    /// `camera` is the camera's world transform, `vertical_fov` in radians.
    /// Returns `None` for coordinates outside the viewport.
    pub fn from_viewport(
        x: f32,
        y: f32,
        viewport: (u32, u32),
        camera: Mat4,
        vertical_fov: f32,
    ) -> Option<Self> {
        let (width, height) = viewport;
        if width == 0 || height == 0 {
            return None;
        }
        let (w, h) = (width as f32, height as f32);
        if !(0.0..=w).contains(&x) || !(0.0..=h).contains(&y) {
            return None;
        }

        // Normalized device coordinates, y up
        let ndc_x = 2.0 * x / w - 1.0;
        let ndc_y = 1.0 - 2.0 * y / h;
        let aspect = w / h;
        let half_height = (vertical_fov * 0.5).tan();

        // Camera looks down -Z in its local frame
        let local = Vec3::new(ndc_x * half_height * aspect, ndc_y * half_height, -1.0);
        let origin = camera.w_axis.truncate();
        let direction = camera.transform_vector3(local);
        Some(Self::new(origin, direction))
    }
}

/// Face index of a unit cube hit, in +X, -X, +Y, -Y, +Z, -Z order
fn face_index(normal: Vec3) -> i32 {
    let abs = normal.abs();
    if abs.x >= abs.y && abs.x >= abs.z {
        if normal.x >= 0.0 {
            0
        } else {
            1
        }
    } else if abs.y >= abs.z {
        if normal.y >= 0.0 {
            2
        } else {
            3
        }
    } else if normal.z >= 0.0 {
        4
    } else {
        5
    }
}

/// Hit on an oriented unit cube
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxHit {
    pub distance: f32,
    pub position: Vec3,
    pub face_index: i32,
}

/// Intersect `ray` with the unit cube (-0.5..0.5) placed by `transform`
pub fn intersect_unit_box(ray: &Ray, transform: Mat4) -> Option<BoxHit> {
    if transform.determinant().abs() < f32::EPSILON {
        return None;
    }
    let inverse = transform.inverse();
    let origin = inverse.transform_point3(ray.origin);
    let direction = inverse.transform_vector3(ray.direction);

    // Slab test in the cube's local frame
    let mut t_min = f32::NEG_INFINITY;
    let mut t_max = f32::INFINITY;
    let mut entry_normal = Vec3::ZERO;
    for axis in 0..3 {
        let (o, d) = (origin[axis], direction[axis]);
        if d.abs() < f32::EPSILON {
            if !(-0.5..=0.5).contains(&o) {
                return None;
            }
            continue;
        }
        let mut t0 = (-0.5 - o) / d;
        let mut t1 = (0.5 - o) / d;
        let mut normal = Vec3::ZERO;
        normal[axis] = -d.signum();
        if t0 > t1 {
            std::mem::swap(&mut t0, &mut t1);
        }
        if t0 > t_min {
            t_min = t0;
            entry_normal = normal;
        }
        t_max = t_max.min(t1);
        if t_min > t_max {
            return None;
        }
    }

    // Ray starting inside the box hits on exit
    let t = if t_min >= 0.0 { t_min } else { t_max };
    if t < 0.0 {
        return None;
    }

    let local_hit = origin + direction * t;
    let position = transform.transform_point3(local_hit);
    Some(BoxHit {
        distance: position.distance(ray.origin),
        position,
        face_index: face_index(entry_normal),
    })
}

/// Result of a viewport raycast
#[derive(Clone)]
pub struct RaycastResult {
    pub entity: Option<EntityRef>,
    pub component: Option<ComponentRef>,
    pub pos: Vec3,
    /// Distance from the ray origin, -1 when nothing was hit
    pub distance: f32,
    pub submesh: i32,
    pub face_index: i32,
    pub ray: Option<Ray>,
}

impl Default for RaycastResult {
    fn default() -> Self {
        Self {
            entity: None,
            component: None,
            pos: Vec3::ZERO,
            distance: -1.0,
            submesh: -1,
            face_index: -1,
            ray: None,
        }
    }
}

impl RaycastResult {
    pub fn is_hit(&self) -> bool {
        self.entity.is_some()
    }
}

impl fmt::Debug for RaycastResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RaycastResult")
            .field("entity", &self.entity.as_ref().map(|e| e.id()))
            .field("component", &self.component.as_ref().map(|c| c.id()))
            .field("pos", &self.pos)
            .field("distance", &self.distance)
            .field("submesh", &self.submesh)
            .field("face_index", &self.face_index)
            .field("ray", &self.ray)
            .finish()
    }
}

/// A mesh candidate for raycasting
pub(crate) struct RaycastTarget {
    pub entity: EntityRef,
    pub component: ComponentRef,
    pub transform: Mat4,
}

/// Nearest hit among `targets`
pub(crate) fn nearest_hit(ray: Ray, targets: Vec<RaycastTarget>) -> Option<RaycastResult> {
    targets
        .into_iter()
        .filter_map(|target| {
            intersect_unit_box(&ray, target.transform).map(|hit| (target, hit))
        })
        .min_by(|(_, a), (_, b)| a.distance.total_cmp(&b.distance))
        .map(|(target, hit)| RaycastResult {
            entity: Some(target.entity),
            component: Some(target.component),
            pos: hit.position,
            distance: hit.distance,
            submesh: 0,
            face_index: hit.face_index,
            ray: Some(ray),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_no_hit() {
        let result = RaycastResult::default();
        assert!(!result.is_hit());
        assert_eq!(result.distance, -1.0);
        assert_eq!(result.submesh, -1);
        assert_eq!(result.face_index, -1);
        assert!(result.ray.is_none());
    }

    #[test]
    fn test_center_ray_points_forward() {
        let camera = Mat4::from_translation(Vec3::new(0.0, 0.0, 10.0));
        let ray = Ray::from_viewport(400.0, 300.0, (800, 600), camera, 60f32.to_radians())
            .unwrap();
        assert_eq!(ray.origin, Vec3::new(0.0, 0.0, 10.0));
        assert!((ray.direction - Vec3::NEG_Z).length() < 1e-5);
    }

    #[test]
    fn test_outside_viewport() {
        let ray = Ray::from_viewport(-1.0, 10.0, (800, 600), Mat4::IDENTITY, 1.0);
        assert!(ray.is_none());
        assert!(Ray::from_viewport(0.0, 0.0, (0, 600), Mat4::IDENTITY, 1.0).is_none());
    }

    #[test]
    fn test_unit_box_hit_front_face() {
        let ray = Ray::new(Vec3::new(0.0, 0.0, 10.0), Vec3::NEG_Z);
        let hit = intersect_unit_box(&ray, Mat4::IDENTITY).unwrap();
        assert!((hit.distance - 9.5).abs() < 1e-5);
        assert!((hit.position - Vec3::new(0.0, 0.0, 0.5)).length() < 1e-5);
        assert_eq!(hit.face_index, 4);
    }

    #[test]
    fn test_scaled_box_and_miss() {
        let ray = Ray::new(Vec3::new(3.0, 0.0, 10.0), Vec3::NEG_Z);
        assert!(intersect_unit_box(&ray, Mat4::IDENTITY).is_none());

        let wide = Mat4::from_scale(Vec3::new(8.0, 1.0, 1.0));
        let hit = intersect_unit_box(&ray, wide).unwrap();
        assert!((hit.position.z - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_box_behind_ray() {
        let ray = Ray::new(Vec3::new(0.0, 0.0, 10.0), Vec3::Z);
        assert!(intersect_unit_box(&ray, Mat4::IDENTITY).is_none());
    }
}
