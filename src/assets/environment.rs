//! Equirectangular HDR environment maps.

use image::ImageFormat;

/// How an environment map is projected onto directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvironmentMapping {
    EquirectangularReflection,
}

/// One level of the reflection chain, RGBA f32 texels.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvironmentLevel {
    pub width: u32,
    pub height: u32,
    pub rgba32f: Vec<f32>,
}

/// A decoded HDR environment with a box-filtered level chain used for rough reflections.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvironmentMap {
    pub mapping: EnvironmentMapping,
    pub levels: Vec<EnvironmentLevel>,
}

impl EnvironmentMap {
    pub fn decode_hdr(bytes: &[u8]) -> Result<Self, image::ImageError> {
        let image = image::load_from_memory_with_format(bytes, ImageFormat::Hdr)?;
        let rgba = image.to_rgba32f();
        let base = EnvironmentLevel {
            width: rgba.width(),
            height: rgba.height(),
            rgba32f: rgba.into_raw(),
        };
        Ok(Self::from_base_level(base))
    }

    pub fn from_base_level(base: EnvironmentLevel) -> Self {
        let mut levels = vec![base];
        while let Some(next) = levels.last().and_then(downsample) {
            levels.push(next);
        }
        Self {
            mapping: EnvironmentMapping::EquirectangularReflection,
            levels,
        }
    }

    pub fn width(&self) -> u32 {
        self.levels.first().map(|level| level.width).unwrap_or(0)
    }

    pub fn height(&self) -> u32 {
        self.levels.first().map(|level| level.height).unwrap_or(0)
    }

    pub fn level_count(&self) -> u32 {
        self.levels.len() as u32
    }
}

/// Halve both dimensions with a 2x2 box filter. Stops once either side reaches 1.
fn downsample(level: &EnvironmentLevel) -> Option<EnvironmentLevel> {
    if level.width <= 1 || level.height <= 1 {
        return None;
    }
    let width = level.width / 2;
    let height = level.height / 2;
    let src_width = level.width as usize;
    let mut rgba32f = Vec::with_capacity(width as usize * height as usize * 4);
    for y in 0..height as usize {
        for x in 0..width as usize {
            let mut sum = [0.0f32; 4];
            for (dx, dy) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
                let index = ((y * 2 + dy) * src_width + (x * 2 + dx)) * 4;
                for (channel, value) in sum.iter_mut().enumerate() {
                    *value += level.rgba32f[index + channel];
                }
            }
            rgba32f.extend(sum.iter().map(|value| value * 0.25));
        }
    }
    Some(EnvironmentLevel {
        width,
        height,
        rgba32f,
    })
}

#[cfg(test)]
mod tests {
    use super::{EnvironmentLevel, EnvironmentMap};

    fn checker(width: u32, height: u32) -> EnvironmentLevel {
        let mut rgba32f = Vec::new();
        for y in 0..height {
            for x in 0..width {
                let value = if (x + y) % 2 == 0 { 2.0 } else { 0.0 };
                rgba32f.extend_from_slice(&[value, value, value, 1.0]);
            }
        }
        EnvironmentLevel {
            width,
            height,
            rgba32f,
        }
    }

    #[test]
    fn level_chain_stops_at_one_texel_side() {
        let env = EnvironmentMap::from_base_level(checker(16, 8));
        let sizes: Vec<(u32, u32)> = env.levels.iter().map(|l| (l.width, l.height)).collect();
        assert_eq!(sizes, vec![(16, 8), (8, 4), (4, 2), (2, 1)]);
        assert_eq!(env.level_count(), 4);
    }

    #[test]
    fn downsample_averages_texels() {
        let env = EnvironmentMap::from_base_level(checker(4, 2));
        let coarse = &env.levels[1];
        assert_eq!(coarse.rgba32f.len(), (coarse.width * coarse.height * 4) as usize);
        assert!(coarse.rgba32f.chunks(4).all(|texel| (texel[0] - 1.0).abs() < 1e-6));
    }

    #[test]
    fn decode_rejects_non_hdr_bytes() {
        assert!(EnvironmentMap::decode_hdr(b"#?RADIANCE\ngarbage").is_err());
    }
}
