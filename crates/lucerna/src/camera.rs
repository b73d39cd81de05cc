//! Orbit camera for the viewer. Produces the `ViewParams` basis consumed by
//! the kernel each frame; all math is plain f32, no linear-algebra crate.

use render_protocol::ViewParams;

const MIN_PITCH_RADIANS: f32 = -1.5;
const MAX_PITCH_RADIANS: f32 = 1.5;
const MIN_DISTANCE: f32 = 1.5;
const MAX_DISTANCE: f32 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrbitCamera {
    target: [f32; 3],
    distance: f32,
    yaw_radians: f32,
    pitch_radians: f32,
    field_of_view_degrees: f32,
}

impl Default for OrbitCamera {
    fn default() -> Self {
        Self {
            target: [0.0, 0.0, -4.0],
            distance: 6.0,
            yaw_radians: 0.0,
            pitch_radians: 0.3,
            field_of_view_degrees: 60.0,
        }
    }
}

impl OrbitCamera {
    pub fn orbit(&mut self, delta_yaw_radians: f32, delta_pitch_radians: f32) {
        self.yaw_radians += delta_yaw_radians;
        self.pitch_radians =
            (self.pitch_radians + delta_pitch_radians).clamp(MIN_PITCH_RADIANS, MAX_PITCH_RADIANS);
    }

    pub fn zoom(&mut self, factor: f32) {
        if !factor.is_finite() || factor <= 0.0 {
            return;
        }
        self.distance = (self.distance / factor).clamp(MIN_DISTANCE, MAX_DISTANCE);
    }

    pub fn view_params(&self) -> ViewParams {
        let cos_pitch = self.pitch_radians.cos();
        let origin = [
            self.target[0] + self.distance * cos_pitch * self.yaw_radians.sin(),
            self.target[1] + self.distance * self.pitch_radians.sin(),
            self.target[2] + self.distance * cos_pitch * self.yaw_radians.cos(),
        ];
        let forward = normalize(subtract(self.target, origin));
        let right = normalize(cross(forward, [0.0, 1.0, 0.0]));
        let up = cross(right, forward);
        ViewParams {
            origin,
            forward,
            right,
            up,
            field_of_view_degrees: self.field_of_view_degrees,
        }
    }
}

fn subtract(lhs: [f32; 3], rhs: [f32; 3]) -> [f32; 3] {
    [lhs[0] - rhs[0], lhs[1] - rhs[1], lhs[2] - rhs[2]]
}

fn cross(lhs: [f32; 3], rhs: [f32; 3]) -> [f32; 3] {
    [
        lhs[1] * rhs[2] - lhs[2] * rhs[1],
        lhs[2] * rhs[0] - lhs[0] * rhs[2],
        lhs[0] * rhs[1] - lhs[1] * rhs[0],
    ]
}

fn normalize(vector: [f32; 3]) -> [f32; 3] {
    let length =
        (vector[0] * vector[0] + vector[1] * vector[1] + vector[2] * vector[2]).sqrt();
    if length <= f32::EPSILON {
        return [0.0, 0.0, -1.0];
    }
    [vector[0] / length, vector[1] / length, vector[2] / length]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dot(lhs: [f32; 3], rhs: [f32; 3]) -> f32 {
        lhs[0] * rhs[0] + lhs[1] * rhs[1] + lhs[2] * rhs[2]
    }

    #[test]
    fn view_basis_is_orthonormal() {
        let mut camera = OrbitCamera::default();
        camera.orbit(0.7, -0.2);
        let view = camera.view_params();

        assert!((dot(view.forward, view.forward) - 1.0).abs() < 1e-4);
        assert!((dot(view.right, view.right) - 1.0).abs() < 1e-4);
        assert!((dot(view.up, view.up) - 1.0).abs() < 1e-4);
        assert!(dot(view.forward, view.right).abs() < 1e-4);
        assert!(dot(view.forward, view.up).abs() < 1e-4);
        assert!(dot(view.right, view.up).abs() < 1e-4);
    }

    #[test]
    fn forward_points_from_origin_to_target() {
        let camera = OrbitCamera::default();
        let view = camera.view_params();
        let to_target = normalize(subtract([0.0, 0.0, -4.0], view.origin));
        for axis in 0..3 {
            assert!((view.forward[axis] - to_target[axis]).abs() < 1e-4);
        }
    }

    #[test]
    fn zoom_clamps_distance_and_rejects_bad_factors() {
        let mut camera = OrbitCamera::default();
        camera.zoom(1000.0);
        let close = camera.view_params().origin;
        camera.zoom(1000.0);
        assert_eq!(camera.view_params().origin, close);

        let before = camera;
        camera.zoom(0.0);
        camera.zoom(f32::NAN);
        assert_eq!(camera, before);
    }

    #[test]
    fn pitch_is_clamped_short_of_the_poles() {
        let mut camera = OrbitCamera::default();
        camera.orbit(0.0, 100.0);
        let view = camera.view_params();
        assert!(dot(view.right, view.right) > 0.5, "basis must stay stable at max pitch");
    }
}
