use crate::error::{Error, Result};

/// Kernel configuration. Populated by the embedding application; the core
/// does no argument parsing.
#[derive(Clone, Debug)]
pub struct RenderConfig {
    pub image_width: u32,
    pub image_height: u32,
    pub samples_per_pixel: u32,
    pub max_path_length: u32,
    pub ray_stack_capacity: u32,
    pub roulette_start: u32,
    /// Power of two; tiles partition the image plane across workers.
    pub tile_size: u32,
    pub preserve_ray_differentials: bool,
    pub enable_displacement: bool,
    pub tessellation_rate: f32,
    /// 0 selects the available hardware parallelism.
    pub worker_count: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        RenderConfig {
            image_width: 256,
            image_height: 256,
            samples_per_pixel: 16,
            max_path_length: 8,
            ray_stack_capacity: 16,
            roulette_start: 3,
            tile_size: 16,
            preserve_ray_differentials: true,
            enable_displacement: false,
            tessellation_rate: 64.0,
            worker_count: 0,
        }
    }
}

impl RenderConfig {
    pub fn validate(&self) -> Result<()> {
        if self.image_width == 0 || self.image_height == 0 {
            return Err(Error::NumericInvalid("image dimensions must be nonzero".into()));
        }
        if self.samples_per_pixel < 1 {
            return Err(Error::NumericInvalid("samplesPerPixel must be >= 1".into()));
        }
        if self.max_path_length < 1 {
            return Err(Error::NumericInvalid("maxPathLength must be >= 1".into()));
        }
        if self.ray_stack_capacity < self.max_path_length + 2 {
            return Err(Error::OutOfCapacity(format!(
                "rayStackCapacity {} must be >= maxPathLength + 2 ({})",
                self.ray_stack_capacity,
                self.max_path_length + 2
            )));
        }
        if !self.tile_size.is_power_of_two() {
            return Err(Error::NumericInvalid(format!(
                "tileSize {} must be a power of two",
                self.tile_size
            )));
        }
        if !self.tessellation_rate.is_finite() || self.tessellation_rate <= 0.0 {
            return Err(Error::NumericInvalid("tessellationRate must be positive".into()));
        }
        Ok(())
    }

    pub fn effective_worker_count(&self) -> usize {
        if self.worker_count > 0 {
            self.worker_count
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(RenderConfig::default().validate().is_ok());
    }

    #[test]
    fn stack_capacity_bound_is_enforced() {
        let mut c = RenderConfig::default();
        c.max_path_length = 20;
        c.ray_stack_capacity = 21;
        assert!(matches!(c.validate(), Err(Error::OutOfCapacity(_))));
        c.ray_stack_capacity = 22;
        assert!(c.validate().is_ok());
    }

    #[test]
    fn tile_size_must_be_power_of_two() {
        let mut c = RenderConfig::default();
        c.tile_size = 24;
        assert!(c.validate().is_err());
        c.tile_size = 32;
        assert!(c.validate().is_ok());
    }
}
