use crate::aliases::{RandGen, Vec2, Vec3};
use rand::{Rng, SeedableRng};
use std::f32::consts::PI;

pub fn rnd_in_unit_sphere(rng: &mut RandGen) -> Vec3 {
    loop {
        let p = Vec3::new(
            2.0 * rng.gen::<f32>() - 1.0,
            2.0 * rng.gen::<f32>() - 1.0,
            2.0 * rng.gen::<f32>() - 1.0,
        );
        if p.norm() < 1.0 {
            return p;
        }
    }
}

pub fn rnd_in_unit_disc(rng: &mut RandGen) -> Vec2 {
    loop {
        let p = Vec2::new(2.0 * rng.gen::<f32>() - 1.0, 2.0 * rng.gen::<f32>() - 1.0);
        if p.norm() < 1.0 {
            return p;
        }
    }
}

/// Uniform direction on the full sphere, pdf = 1/(4 pi).
pub fn uniform_sphere_direction(rng: &mut RandGen) -> Vec3 {
    let z = 1.0 - 2.0 * rng.gen::<f32>();
    let r = (1.0 - z * z).max(0.0).sqrt();
    let phi = 2.0 * PI * rng.gen::<f32>();
    Vec3::new(r * phi.cos(), r * phi.sin(), z)
}

pub const UNIFORM_SPHERE_PDF: f32 = 1.0 / (4.0 * PI);

/// Calculates a random point on a unit hemisphere (z >= 0)
/// such that pdf(d) = cos(t)/pi where t is the angle between d and (0,0,1).
pub fn random_cosine_direction(rng: &mut RandGen) -> Vec3 {
    let r0 = rng.gen::<f32>();
    let rr0 = r0.sqrt();
    let r1 = rng.gen::<f32>();
    let angle = 2.0 * PI * r1;
    let z = (1.0 - r0).sqrt();
    Vec3::new(angle.cos() * rr0, angle.sin() * rr0, z)
}

pub fn cosine_hemisphere_pdf(cos_theta: f32) -> f32 {
    (cos_theta / PI).max(0.0)
}

/// Generate uniformly a random (normalized) direction vector in a cone
/// around (0,0,1). `cos_half_angle == -1` covers the full sphere.
pub fn random_in_cone(cos_half_angle: f32, rng: &mut RandGen) -> Vec3 {
    let r1 = rng.gen::<f32>();
    let r2 = rng.gen::<f32>();
    let z = 1.0 + r1 * (cos_half_angle - 1.0);
    let sine = (1.0 - z * z).max(0.0).sqrt();
    let phi = 2.0 * PI * r2;
    Vec3::new(phi.cos() * sine, phi.sin() * sine, z)
}

/// R2 additive recurrence, a low-discrepancy sequence on the unit square.
/// Used to stratify the image-plane jitter across samples of one pixel.
pub fn r2_sequence(index: u32) -> Vec2 {
    const G: f64 = 1.324_717_957_244_746; // plastic constant
    let a1 = 1.0 / G;
    let a2 = 1.0 / (G * G);
    let n = index as f64;
    Vec2::new(
        ((0.5 + a1 * n).fract()) as f32,
        ((0.5 + a2 * n).fract()) as f32,
    )
}

/// Per-(tile, sample) sampler state. Deterministic given the pair: the same
/// seed always replays the same draw sequence, independent of which worker
/// consumes the tile.
pub struct SamplerSession {
    rng: RandGen,
    sample_index: u32,
}

impl SamplerSession {
    pub fn new(tile_index: u32, sample_index: u32) -> Self {
        let seed = ((tile_index as u64) << 32 | sample_index as u64)
            .wrapping_mul(0x9e37_79b9_7f4a_7c15)
            ^ 0x5851_f42d_4c95_7f2d;
        SamplerSession {
            rng: RandGen::seed_from_u64(seed),
            sample_index,
        }
    }
    pub fn uniform_f32(&mut self) -> f32 {
        self.rng.gen::<f32>()
    }
    pub fn uniform_2d(&mut self) -> Vec2 {
        Vec2::new(self.rng.gen::<f32>(), self.rng.gen::<f32>())
    }
    /// Image-plane jitter in [0,1)^2: low-discrepancy base point per sample
    /// index, Cranley-Patterson rotated per pixel.
    pub fn image_jitter(&mut self, pixel_index: u32) -> Vec2 {
        let base = r2_sequence(self.sample_index);
        let rot = pcg_hash_2d(pixel_index);
        Vec2::new((base[0] + rot[0]).fract(), (base[1] + rot[1]).fract())
    }
    pub fn rng(&mut self) -> &mut RandGen {
        &mut self.rng
    }
}

fn pcg_hash_2d(v: u32) -> Vec2 {
    let mut state = v.wrapping_mul(747_796_405).wrapping_add(2_891_336_453);
    let mut out = [0.0f32; 2];
    for slot in out.iter_mut() {
        state = state.wrapping_mul(747_796_405).wrapping_add(2_891_336_453);
        let word = ((state >> ((state >> 28) + 4)) ^ state).wrapping_mul(277_803_737);
        let bits = (word >> 22) ^ word;
        *slot = bits as f32 / u32::MAX as f32;
    }
    Vec2::new(out[0], out[1])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_direction_integrates_to_one() {
        const SAMPLE_CNT: usize = 20000;
        let mut session = SamplerSession::new(0, 0);
        let mut integral = 0.0f32;
        for _ in 0..SAMPLE_CNT {
            let dir = random_in_cone(-1.0, session.rng());
            integral += cosine_hemisphere_pdf(dir[2]);
        }
        integral *= 4.0 * PI / SAMPLE_CNT as f32;
        println!("[cosine_direction_integrates_to_one] integral: {}", integral);
        assert!((integral - 1.0).abs() < 0.05);
    }

    #[test]
    fn uniform_sphere_is_normalized_and_covers_both_hemispheres() {
        let mut session = SamplerSession::new(1, 0);
        let mut up = 0usize;
        for _ in 0..1000 {
            let d = uniform_sphere_direction(session.rng());
            assert!((d.norm() - 1.0).abs() < 1e-4);
            if d[2] > 0.0 {
                up += 1;
            }
        }
        assert!(up > 350 && up < 650);
    }

    #[test]
    fn sessions_replay_deterministically() {
        let mut a = SamplerSession::new(7, 3);
        let mut b = SamplerSession::new(7, 3);
        for _ in 0..32 {
            assert_eq!(a.uniform_f32(), b.uniform_f32());
        }
        let mut c = SamplerSession::new(7, 4);
        let first: Vec<f32> = (0..8).map(|_| c.uniform_f32()).collect();
        let mut d = SamplerSession::new(7, 3);
        let second: Vec<f32> = (0..8).map(|_| d.uniform_f32()).collect();
        assert_ne!(first, second);
    }

    #[test]
    fn r2_sequence_stays_in_unit_square() {
        for i in 0..256 {
            let p = r2_sequence(i);
            assert!(p[0] >= 0.0 && p[0] < 1.0);
            assert!(p[1] >= 0.0 && p[1] < 1.0);
        }
    }
}
