/// An RGB color, one byte per channel.
pub type RgbColor = [u8; 3];

/// The four shades a 2-bit pixel value maps to, lightest (index 0) first.
/// Applied at `Ppu::take_frame` time, so the same rendered scanlines can be
/// reinterpreted under a different palette without re-rendering.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Palette(pub [RgbColor; 4]);

impl Palette {
    /// The classic DMG four-shade grayscale, matching the teacher's
    /// `GrayShades` mapping (`shade_to_rgb_u8`).
    pub const GRAYSCALE: Palette = Palette([
        [255, 255, 255],
        [170, 170, 170],
        [85, 85, 85],
        [0, 0, 0],
    ]);

    pub fn shade(&self, index: u8) -> RgbColor {
        self.0[(index & 0b11) as usize]
    }
}

impl Default for Palette {
    fn default() -> Self {
        Palette::GRAYSCALE
    }
}

#[cfg(test)]
mod palette_tests {
    use super::*;

    #[test]
    fn grayscale_maps_zero_to_white_and_three_to_black() {
        let p = Palette::default();
        assert_eq!(p.shade(0), [255, 255, 255]);
        assert_eq!(p.shade(3), [0, 0, 0]);
    }
}
