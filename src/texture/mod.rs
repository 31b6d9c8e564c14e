use crate::aliases::{Vec2, Vec4};
use crate::error::{Error, Result};
use std::path::Path;

/// Interpretation of a texture's RGB channels. Color maps (albedo) are
/// sRGB-encoded and decoded to linear on load; data maps
/// (roughness-metallic, normals, displacement) hold raw values and must
/// not be gamma decoded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColorSpace {
    Srgb,
    Linear,
}

/// A decoded texture, RGBA with linear-space values. Thread-safe for
/// concurrent sampling once loaded.
#[derive(Debug)]
pub struct TextureResource {
    pub name: String,
    width: usize,
    height: usize,
    data: Vec<[f32; 4]>, // RGBARGBA...
}

impl TextureResource {
    pub fn read(path: &Path, color_space: ColorSpace) -> Result<Self> {
        if !path.exists() {
            return Err(Error::MissingAsset(path.to_path_buf()));
        }
        let img = image::open(path)
            .map_err(|e| Error::TextureError(format!("{}: {}", path.display(), e)))?
            .to_rgba8();
        let width = img.width() as usize;
        let height = img.height() as usize;
        let decode = |v: u8| match color_space {
            ColorSpace::Srgb => srgb_to_linear(v),
            ColorSpace::Linear => v as f32 / 255.0,
        };
        let mut data = Vec::with_capacity(width * height);
        for px in img.pixels() {
            data.push([
                decode(px[0]),
                decode(px[1]),
                decode(px[2]),
                px[3] as f32 / 255.0, // alpha is always linear
            ]);
        }
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(TextureResource {
            name,
            width,
            height,
            data,
        })
    }

    pub fn from_pixels(name: &str, width: usize, height: usize, data: Vec<[f32; 4]>) -> Self {
        debug_assert_eq!(data.len(), width * height);
        TextureResource {
            name: name.to_string(),
            width,
            height,
            data,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    fn texel(&self, x: isize, y: isize) -> Vec4 {
        // Repeat wrap.
        let x = x.rem_euclid(self.width as isize) as usize;
        let y = y.rem_euclid(self.height as isize) as usize;
        let t = self.data[y * self.width + x];
        Vec4::new(t[0], t[1], t[2], t[3])
    }

    /// Bilinear sample at `uv`; v grows upward (rows stored top-down).
    pub fn sample_bilinear(&self, uv: &Vec2) -> Vec4 {
        let x = uv[0] * self.width as f32 - 0.5;
        let y = (1.0 - uv[1]) * self.height as f32 - 0.5;
        let x0 = x.floor();
        let y0 = y.floor();
        let fx = x - x0;
        let fy = y - y0;
        let (x0, y0) = (x0 as isize, y0 as isize);
        let a = self.texel(x0, y0) * (1.0 - fx) + self.texel(x0 + 1, y0) * fx;
        let b = self.texel(x0, y0 + 1) * (1.0 - fx) + self.texel(x0 + 1, y0 + 1) * fx;
        a * (1.0 - fy) + b * fy
    }

    /// Filtered sample: the screen-space uv derivatives choose a box filter
    /// footprint (up to 4x4 texels) around the bilinear tap.
    pub fn sample(&self, uv: &Vec2, duvdx: &Vec2, duvdy: &Vec2) -> Vec4 {
        let width_texels = (duvdx[0].abs().max(duvdy[0].abs()) * self.width as f32)
            .max(duvdx[1].abs().max(duvdy[1].abs()) * self.height as f32);
        let taps = (width_texels as usize).clamp(1, 4);
        if taps == 1 {
            return self.sample_bilinear(uv);
        }
        let mut sum = Vec4::zeros();
        let step_u = duvdx[0].abs().max(duvdy[0].abs()) / taps as f32;
        let step_v = duvdx[1].abs().max(duvdy[1].abs()) / taps as f32;
        for j in 0..taps {
            for i in 0..taps {
                let offset = Vec2::new(
                    (i as f32 - 0.5 * (taps - 1) as f32) * step_u,
                    (j as f32 - 0.5 * (taps - 1) as f32) * step_v,
                );
                sum += self.sample_bilinear(&(uv + offset));
            }
        }
        sum / (taps * taps) as f32
    }
}

pub fn shutdown_texture_resource(texture: TextureResource) {
    drop(texture);
}

fn srgb_to_linear(v: u8) -> f32 {
    let c = v as f32 / 255.0;
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checker(name: &str) -> TextureResource {
        // 2x2: white / black alternating, opaque.
        let w = [1.0, 1.0, 1.0, 1.0];
        let b = [0.0, 0.0, 0.0, 0.0];
        TextureResource::from_pixels(name, 2, 2, vec![w, b, b, w])
    }

    #[test]
    fn texel_centers_sample_exactly() {
        let t = checker("c");
        // uv (0.25, 0.75) is the center of the top-left texel (white).
        let v = t.sample_bilinear(&Vec2::new(0.25, 0.75));
        assert!((v[0] - 1.0).abs() < 1e-5);
        let v = t.sample_bilinear(&Vec2::new(0.75, 0.75));
        assert!(v[0] < 1e-5);
    }

    #[test]
    fn wraps_around() {
        let t = checker("c");
        let a = t.sample_bilinear(&Vec2::new(0.25, 0.75));
        let b = t.sample_bilinear(&Vec2::new(1.25, 0.75));
        assert!((a - b).norm() < 1e-5);
    }

    #[test]
    fn wide_footprint_averages() {
        let t = checker("c");
        let wide = Vec2::new(1.0, 0.0);
        let v = t.sample(&Vec2::new(0.5, 0.5), &wide, &Vec2::new(0.0, 1.0));
        // Averaging a half-white half-black checker tends to 0.5.
        assert!((v[0] - 0.5).abs() < 0.3);
    }

    #[test]
    fn missing_file_reports_missing_asset() {
        let err = TextureResource::read(Path::new("/nonexistent/tex.png"), ColorSpace::Srgb)
            .unwrap_err();
        assert!(matches!(err, Error::MissingAsset(_)));
    }

    #[test]
    fn data_maps_skip_the_gamma_decode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mid.png");
        image::RgbaImage::from_pixel(1, 1, image::Rgba([128, 128, 128, 255]))
            .save(&path)
            .unwrap();
        let color = TextureResource::read(&path, ColorSpace::Srgb).unwrap();
        let data = TextureResource::read(&path, ColorSpace::Linear).unwrap();
        let uv = Vec2::new(0.5, 0.5);
        // A data map reads the stored value back; a color map decodes it.
        assert!((data.sample_bilinear(&uv)[0] - 128.0 / 255.0).abs() < 1e-3);
        assert!((color.sample_bilinear(&uv)[0] - 0.2158).abs() < 2e-3);
        assert!((data.sample_bilinear(&uv)[3] - 1.0).abs() < 1e-6);
        assert!((color.sample_bilinear(&uv)[3] - 1.0).abs() < 1e-6);
    }
}
