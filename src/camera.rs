use crate::aliases::{Vec2, Vec3};
use crate::model::records::CameraRecord;
use crate::ray::{Ray, RayDifferential};
use std::f32::consts::PI;

/// Pinhole / thin-lens camera. Primary rays carry differentials for the
/// neighboring pixel in x and y so hits can estimate texture footprints.
pub struct Camera {
    origin: Vec3,
    lower_left_corner: Vec3,
    horizontal: Vec3,
    vertical: Vec3,
    width: u32,
    height: u32,
}

impl Camera {
    pub fn new(record: &CameraRecord, width: u32, height: u32) -> Self {
        let aspect = width as f32 / height as f32;
        let theta = record.vertical_fov_degrees * PI / 180.0;
        let half_height = (theta * 0.5).tan();
        let half_width = aspect * half_height;

        let origin = Vec3::from(record.position);
        let look_at = Vec3::from(record.look_at);
        let view_up = Vec3::from(record.up);
        let w = (origin - look_at).normalize();
        let u = view_up.cross(&w).normalize();
        let v = w.cross(&u);

        let focus = if record.focus_distance > 0.0 {
            record.focus_distance
        } else {
            1.0
        };
        let lower_left_corner = origin - focus * (half_width * u + half_height * v + w);
        let horizontal = u * 2.0 * focus * half_width;
        let vertical = v * 2.0 * focus * half_height;
        Camera {
            origin,
            lower_left_corner,
            horizontal,
            vertical,
            width,
            height,
        }
    }

    fn direction_at(&self, s: f32, t: f32) -> Vec3 {
        self.lower_left_corner + s * self.horizontal + t * self.vertical - self.origin
    }

    /// Primary ray through pixel (x, y) with sub-pixel `jitter` in [0,1)^2.
    /// Pixel (0,0) is the top-left corner of the image.
    pub fn generate_ray(&self, x: u32, y: u32, jitter: Vec2, pixel_index: u32) -> Ray {
        let s = (x as f32 + jitter[0]) / self.width as f32;
        let t = 1.0 - (y as f32 + jitter[1]) / self.height as f32;
        let direction = self.direction_at(s, t).normalize();

        let sx = s + 1.0 / self.width as f32;
        let ty = t - 1.0 / self.height as f32;
        let differentials = RayDifferential {
            rx_origin: self.origin,
            rx_direction: self.direction_at(sx, t).normalize(),
            ry_origin: self.origin,
            ry_direction: self.direction_at(s, ty).normalize(),
        };

        Ray::new(
            self.origin,
            direction,
            Vec3::new(1.0, 1.0, 1.0),
            pixel_index,
            0,
        )
        .with_differentials(differentials)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytemuck::Zeroable;

    fn test_record() -> CameraRecord {
        let mut r = CameraRecord::zeroed();
        r.position = [0.0, 0.0, 5.0];
        r.look_at = [0.0, 0.0, 0.0];
        r.up = [0.0, 1.0, 0.0];
        r.vertical_fov_degrees = 45.0;
        r.focus_distance = 1.0;
        r
    }

    #[test]
    fn center_pixel_looks_down_the_view_axis() {
        let camera = Camera::new(&test_record(), 64, 64);
        let ray = camera.generate_ray(32, 32, Vec2::new(0.0, 0.0), 0);
        assert!(ray.direction[2] < -0.99);
        assert_eq!(ray.bounce_count, 0);
        assert_eq!(ray.throughput, Vec3::new(1.0, 1.0, 1.0));
    }

    #[test]
    fn differentials_span_one_pixel() {
        let camera = Camera::new(&test_record(), 64, 64);
        let ray = camera.generate_ray(10, 20, Vec2::new(0.5, 0.5), 0);
        let d = ray.differentials.unwrap();
        // The x differential deviates toward +x of the image plane.
        assert!((d.rx_direction - ray.direction).norm() > 1e-5);
        assert!((d.rx_direction - ray.direction).norm() < 0.05);
        assert!((d.ry_direction - ray.direction).norm() > 1e-5);
    }

    #[test]
    fn top_left_maps_to_upper_left_of_plane() {
        let camera = Camera::new(&test_record(), 64, 64);
        let ray = camera.generate_ray(0, 0, Vec2::new(0.0, 0.0), 0);
        assert!(ray.direction[0] < 0.0); // left
        assert!(ray.direction[1] > 0.0); // up
    }
}
