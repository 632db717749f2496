//! Smoothed orbit camera.
//!
//! The camera circles a target point using spherical coordinates (radius,
//! azimuth, polar angle) plus a vertical target offset. Every input channel
//! feeds a rate accumulator instead of the value directly; rates integrate
//! into the coordinates each update and then decay multiplicatively, so
//! motion eases out instead of stopping dead.

use std::time::Duration;

use cgmath::{
    EuclideanSpace, InnerSpace, Matrix4, Point3, Rad, SquareMatrix, Vector3, Vector4, perspective,
};

/// Maps cgmath's OpenGL-style clip space (z in -1..1) onto wgpu's (z in 0..1).
#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: Matrix4<f32> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

/// Per-update damping for the orbit rates (azimuth and polar angle).
const ORBIT_DAMPING: f32 = 0.8;
/// Per-update damping for the radius and height rates.
const LINEAR_DAMPING: f32 = 0.9;
/// Distance (radians) from either pole at which the up vector switches to
/// the polar tangent to keep the view basis well conditioned.
const POLE_EPSILON: f32 = 0.05;
/// The camera never collapses onto its target.
const MIN_RADIUS: f32 = 0.1;

/// Height-key rate increments: a quick tap nudges, holding accelerates.
const HEIGHT_TAP_RATE: f32 = 0.4;
const HEIGHT_HOLD_RATE: f32 = 2.0;

/// Orbit camera state: spherical coordinates with decaying rate terms.
///
/// The polar angle is clamped to `[0, pi]` after every update; all other
/// coordinates are unbounded apart from the minimum radius.
#[derive(Clone, Debug)]
pub struct OrbitCamera {
    pub radius: f32,
    pub azimuth: f32,
    pub polar: f32,
    pub height: f32,
    radius_rate: f32,
    azimuth_rate: f32,
    polar_rate: f32,
    height_rate: f32,
    /// Scales all rate integration; exposed so applications can tune feel.
    pub speed: f32,
}

impl OrbitCamera {
    pub fn new(radius: f32, azimuth: f32, polar: f32) -> Self {
        Self {
            radius: radius.max(MIN_RADIUS),
            azimuth,
            polar: polar.clamp(0.0, std::f32::consts::PI),
            height: 0.0,
            radius_rate: 0.0,
            azimuth_rate: 0.0,
            polar_rate: 0.0,
            height_rate: 0.0,
            speed: 1.0,
        }
    }

    /// Feed a pointer-drag delta. Modifier-key scaling is the input layer's
    /// job; this takes the deltas as given.
    pub fn handle_drag(&mut self, dx: f32, dy: f32) {
        self.azimuth_rate += dx;
        self.polar_rate += dy;
    }

    /// Feed a scroll delta; scrolling forward moves the camera closer.
    pub fn handle_scroll(&mut self, delta: f32) {
        self.radius_rate -= delta;
    }

    /// Feed a height-key press. `up` selects the direction, `held`
    /// distinguishes a tap from a sustained press.
    pub fn handle_height_key(&mut self, up: bool, held: bool) {
        let magnitude = if held { HEIGHT_HOLD_RATE } else { HEIGHT_TAP_RATE };
        self.height_rate += if up { magnitude } else { -magnitude };
    }

    /// Integrate the accumulated rates and damp them.
    ///
    /// Rates shrink by a fixed factor per update call, not per second; the
    /// decay therefore converges towards zero without ever reaching it.
    pub fn update(&mut self, dt: Duration) {
        let t = dt.as_secs_f32() * self.speed;

        self.azimuth += self.azimuth_rate * t;
        self.polar += self.polar_rate * t;
        self.radius += self.radius_rate * t;
        self.height += self.height_rate * t;

        self.polar = self.polar.clamp(0.0, std::f32::consts::PI);
        self.radius = self.radius.max(MIN_RADIUS);

        self.azimuth_rate *= ORBIT_DAMPING;
        self.polar_rate *= ORBIT_DAMPING;
        self.radius_rate *= LINEAR_DAMPING;
        self.height_rate *= LINEAR_DAMPING;
    }

    pub fn target(&self) -> Point3<f32> {
        Point3::new(0.0, self.height, 0.0)
    }

    pub fn position(&self) -> Point3<f32> {
        let (sin_p, cos_p) = self.polar.sin_cos();
        let (sin_a, cos_a) = self.azimuth.sin_cos();
        self.target() + self.radius * Vector3::new(sin_p * cos_a, cos_p, sin_p * sin_a)
    }

    /// World up, except near the poles where the straight-up vector becomes
    /// (anti)parallel to the view direction. There the tangent along the
    /// polar coordinate is used instead.
    pub fn up(&self) -> Vector3<f32> {
        if self.polar > POLE_EPSILON && self.polar < std::f32::consts::PI - POLE_EPSILON {
            return Vector3::unit_y();
        }
        let (sin_p, cos_p) = self.polar.sin_cos();
        let (sin_a, cos_a) = self.azimuth.sin_cos();
        // -d(position)/d(polar), normalized: points towards polar = 0.
        Vector3::new(-cos_p * cos_a, sin_p, -cos_p * sin_a).normalize()
    }

    pub fn view_matrix(&self) -> Matrix4<f32> {
        Matrix4::look_at_rh(self.position(), self.target(), self.up())
    }

    #[cfg(test)]
    pub(crate) fn rates(&self) -> [f32; 4] {
        [
            self.azimuth_rate,
            self.polar_rate,
            self.radius_rate,
            self.height_rate,
        ]
    }
}

impl Default for OrbitCamera {
    fn default() -> Self {
        Self::new(10.0, 0.0, std::f32::consts::FRAC_PI_3)
    }
}

/// Perspective projection with wgpu clip-space depth.
#[derive(Clone, Copy, Debug)]
pub struct Projection {
    pub aspect: f32,
    pub fovy: Rad<f32>,
    pub znear: f32,
    pub zfar: f32,
}

impl Projection {
    pub fn new<F: Into<Rad<f32>>>(width: u32, height: u32, fovy: F, znear: f32, zfar: f32) -> Self {
        Self {
            aspect: width as f32 / height.max(1) as f32,
            fovy: fovy.into(),
            znear,
            zfar,
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.aspect = width as f32 / height.max(1) as f32;
    }

    pub fn matrix(&self) -> Matrix4<f32> {
        OPENGL_TO_WGPU_MATRIX * perspective(self.fovy, self.aspect, self.znear, self.zfar)
    }
}

/// A world-space ray, as produced by [`unproject`].
#[derive(Clone, Copy, Debug)]
pub struct Ray {
    pub origin: Point3<f32>,
    pub direction: Vector3<f32>,
}

/// Map a pointer position (pixels, origin top-left) to a world-space ray by
/// pushing the near and far clip-space points through the inverse of
/// projection x view.
pub fn unproject(
    camera: &OrbitCamera,
    projection: &Projection,
    pointer: (f32, f32),
    viewport: (u32, u32),
) -> Option<Ray> {
    let ndc_x = 2.0 * pointer.0 / viewport.0.max(1) as f32 - 1.0;
    let ndc_y = 1.0 - 2.0 * pointer.1 / viewport.1.max(1) as f32;

    let inverse = (projection.matrix() * camera.view_matrix()).invert()?;
    let near = inverse * Vector4::new(ndc_x, ndc_y, 0.0, 1.0);
    let far = inverse * Vector4::new(ndc_x, ndc_y, 1.0, 1.0);
    if near.w.abs() < f32::EPSILON || far.w.abs() < f32::EPSILON {
        return None;
    }
    let near = near.truncate() / near.w;
    let far = far.truncate() / far.w;

    Some(Ray {
        origin: Point3::from_vec(near),
        direction: (far - near).normalize(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::Deg;

    fn assert_close(a: f32, b: f32, eps: f32) {
        assert!((a - b).abs() < eps, "{a} !~ {b}");
    }

    fn updated(camera: &mut OrbitCamera, n: u32) {
        for _ in 0..n {
            camera.update(Duration::from_millis(16));
        }
    }

    #[test]
    fn rates_decay_by_documented_factors() {
        let mut camera = OrbitCamera::default();
        camera.handle_drag(1.0, 1.0);
        camera.handle_scroll(1.0);
        camera.handle_height_key(true, false);

        let before = camera.rates();
        updated(&mut camera, 1);
        let after = camera.rates();

        assert_close(after[0], before[0] * 0.8, 1e-6);
        assert_close(after[1], before[1] * 0.8, 1e-6);
        assert_close(after[2], before[2] * 0.9, 1e-6);
        assert_close(after[3], before[3] * 0.9, 1e-6);
    }

    #[test]
    fn rates_approach_but_never_reach_zero() {
        let mut camera = OrbitCamera::default();
        camera.handle_drag(5.0, -5.0);
        updated(&mut camera, 100);
        let rates = camera.rates();
        assert!(rates[0].abs() < 1e-3 && rates[0] != 0.0);
        assert!(rates[1].abs() < 1e-3 && rates[1] != 0.0);
    }

    #[test]
    fn polar_angle_stays_clamped() {
        let mut camera = OrbitCamera::default();
        for delta in [100.0, -350.0, 42.0, -1.0, 9000.0] {
            camera.handle_drag(0.0, delta);
            updated(&mut camera, 3);
            assert!(camera.polar >= 0.0 && camera.polar <= std::f32::consts::PI);
        }
    }

    #[test]
    fn up_vector_never_parallel_to_view() {
        let mut camera = OrbitCamera::default();
        camera.polar = 0.001; // nearly at the north pole
        let view_dir = (camera.target() - camera.position()).normalize();
        let cross = view_dir.cross(camera.up());
        assert!(cross.magnitude() > 0.5);
    }

    #[test]
    fn radius_never_collapses() {
        let mut camera = OrbitCamera::new(1.0, 0.0, 1.0);
        camera.handle_scroll(1000.0);
        updated(&mut camera, 20);
        assert!(camera.radius >= 0.1);
    }

    #[test]
    fn unproject_center_points_at_target() {
        let camera = OrbitCamera::new(10.0, 0.3, 1.2);
        let projection = Projection::new(640, 480, Deg(45.0), 0.1, 500.0);
        let ray = unproject(&camera, &projection, (320.0, 240.0), (640, 480)).unwrap();

        let to_target = (camera.target() - camera.position()).normalize();
        assert_close(ray.direction.dot(to_target), 1.0, 1e-3);
        assert_close(ray.direction.magnitude(), 1.0, 1e-5);
    }
}
