use crate::error::{Result, ViewerError};

/// The four material maps the shader samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureSlot {
    Diffuse,
    Normal,
    Specular,
    Emission,
}

impl TextureSlot {
    pub const ALL: [TextureSlot; 4] = [
        TextureSlot::Diffuse,
        TextureSlot::Normal,
        TextureSlot::Specular,
        TextureSlot::Emission,
    ];

    pub fn index(self) -> usize {
        match self {
            TextureSlot::Diffuse => 0,
            TextureSlot::Normal => 1,
            TextureSlot::Specular => 2,
            TextureSlot::Emission => 3,
        }
    }

    /// Bind group binding; 0 is the uniform buffer and 5 the sampler.
    pub fn binding(self) -> u32 {
        self.index() as u32 + 1
    }

    /// Colour of the 1×1 texture bound when the map is missing. The normal
    /// default has zero alpha, which makes shading keep the vertex normal.
    pub fn default_rgba(self) -> [u8; 4] {
        match self {
            TextureSlot::Diffuse => [255, 255, 255, 255],
            TextureSlot::Normal => [128, 128, 255, 0],
            TextureSlot::Specular => [128, 128, 128, 255],
            TextureSlot::Emission => [0, 0, 0, 255],
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TextureSlot::Diffuse => "Diffuse",
            TextureSlot::Normal => "Normal",
            TextureSlot::Specular => "Specular",
            TextureSlot::Emission => "Emission",
        }
    }

    /// File name under `/source/<model>/`.
    pub fn file_name(self) -> String {
        format!("{} map.png", self.label())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextureImage {
    pub width: u32,
    pub height: u32,
    /// Tightly packed RGBA8 rows, top row first.
    pub rgba: Vec<u8>,
}

impl TextureImage {
    pub fn solid(color: [u8; 4]) -> Self {
        Self {
            width: 1,
            height: 1,
            rgba: color.to_vec(),
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let decoded = image::load_from_memory(bytes)
            .map_err(|e| ViewerError::Texture(e.to_string()))?
            .to_rgba8();
        Ok(Self {
            width: decoded.width(),
            height: decoded.height(),
            rgba: decoded.into_raw(),
        })
    }

    pub fn texel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = ((y * self.width + x) * 4) as usize;
        [self.rgba[i], self.rgba[i + 1], self.rgba[i + 2], self.rgba[i + 3]]
    }

    /// Bilinear sample with repeat addressing; `v` runs bottom-up.
    pub fn sample(&self, u: f32, v: f32) -> [f32; 4] {
        let (w, h) = (self.width as f32, self.height as f32);
        let x = u.rem_euclid(1.0) * w - 0.5;
        let y = (1.0 - v).rem_euclid(1.0) * h - 0.5;
        let (x0, y0) = (x.floor(), y.floor());
        let (fx, fy) = (x - x0, y - y0);

        let wrap = |value: f32, size: u32| (value as i64).rem_euclid(size as i64) as u32;
        let (ix0, ix1) = (wrap(x0, self.width), wrap(x0 + 1.0, self.width));
        let (iy0, iy1) = (wrap(y0, self.height), wrap(y0 + 1.0, self.height));

        let (a, b) = (self.texel(ix0, iy0), self.texel(ix1, iy0));
        let (c, d) = (self.texel(ix0, iy1), self.texel(ix1, iy1));
        let mut out = [0.0; 4];
        for i in 0..4 {
            let top = a[i] as f32 * (1.0 - fx) + b[i] as f32 * fx;
            let bottom = c[i] as f32 * (1.0 - fx) + d[i] as f32 * fx;
            out[i] = (top * (1.0 - fy) + bottom * fy) / 255.0;
        }
        out
    }
}

/// Up to four optional maps; missing ones resolve to their 1×1 default.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextureSet {
    slots: [Option<TextureImage>; 4],
}

impl TextureSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, slot: TextureSlot, image: Option<TextureImage>) {
        self.slots[slot.index()] = image;
    }

    pub fn get(&self, slot: TextureSlot) -> Option<&TextureImage> {
        self.slots[slot.index()].as_ref()
    }

    pub fn resolve(&self, slot: TextureSlot) -> TextureImage {
        self.get(slot)
            .cloned()
            .unwrap_or_else(|| TextureImage::solid(slot.default_rgba()))
    }

    pub fn present(&self) -> impl Iterator<Item = TextureSlot> + '_ {
        TextureSlot::ALL
            .into_iter()
            .filter(move |slot| self.slots[slot.index()].is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_maps_resolve_to_defaults() {
        let set = TextureSet::new();
        assert_eq!(set.resolve(TextureSlot::Diffuse).rgba, vec![255, 255, 255, 255]);
        assert_eq!(set.resolve(TextureSlot::Normal).rgba, vec![128, 128, 255, 0]);
        assert_eq!(set.resolve(TextureSlot::Specular).rgba, vec![128, 128, 128, 255]);
        assert_eq!(set.resolve(TextureSlot::Emission).rgba, vec![0, 0, 0, 255]);
        assert_eq!(set.present().count(), 0);
    }

    #[test]
    fn set_maps_override_defaults() {
        let mut set = TextureSet::new();
        set.set(TextureSlot::Diffuse, Some(TextureImage::solid([1, 2, 3, 255])));
        set.set(TextureSlot::Specular, Some(TextureImage::solid([9, 9, 9, 255])));
        set.set(TextureSlot::Specular, None);

        let present: Vec<_> = set.present().collect();
        assert_eq!(present, vec![TextureSlot::Diffuse]);
        assert_eq!(set.resolve(TextureSlot::Diffuse).rgba, vec![1, 2, 3, 255]);
        assert_eq!(set.resolve(TextureSlot::Specular).rgba, vec![128, 128, 128, 255]);
    }

    #[test]
    fn bindings_follow_the_uniform_buffer() {
        let bindings: Vec<u32> = TextureSlot::ALL.iter().map(|s| s.binding()).collect();
        assert_eq!(bindings, vec![1, 2, 3, 4]);
        assert_eq!(TextureSlot::Emission.file_name(), "Emission map.png");
    }

    #[test]
    fn sampling_wraps_and_flips_v() {
        // 1x2 image: top row red, bottom row blue.
        let image = TextureImage {
            width: 1,
            height: 2,
            rgba: vec![255, 0, 0, 255, 0, 0, 255, 255],
        };
        let top = image.sample(0.5, 0.75);
        let bottom = image.sample(0.5, 0.25);
        assert!((top[0] - 1.0).abs() < 1e-6 && top[2].abs() < 1e-6);
        assert!((bottom[2] - 1.0).abs() < 1e-6 && bottom[0].abs() < 1e-6);

        let wrapped = image.sample(1.5, 1.75);
        assert_eq!(wrapped, top);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(
            TextureImage::decode(b"not a png"),
            Err(ViewerError::Texture(_))
        ));
    }
}
