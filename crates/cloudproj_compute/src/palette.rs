//! Color palette for scalar visualization modes
//!
//! 256 entries interpolated through fixed control points of the Inferno
//! color map (black, purple, red, orange, pale yellow).

/// Control points, evenly spaced over `[0, 1]`
const INFERNO_STOPS: [[u8; 3]; 8] = [
    [0, 0, 4],
    [40, 11, 84],
    [101, 21, 110],
    [159, 42, 99],
    [212, 72, 66],
    [245, 125, 21],
    [250, 193, 39],
    [252, 255, 164],
];

/// 256-entry lookup table
#[derive(Clone, Debug, PartialEq)]
pub struct Palette {
    entries: Vec<[u8; 3]>,
}

impl Default for Palette {
    fn default() -> Self {
        Self::inferno()
    }
}

impl Palette {
    pub const SIZE: usize = 256;

    /// Built-in Inferno-like palette
    pub fn inferno() -> Self {
        Self::from_stops(&INFERNO_STOPS)
    }

    /// Linear interpolation through evenly spaced `stops` (at least one)
    pub fn from_stops(stops: &[[u8; 3]]) -> Self {
        let segments = stops.len().saturating_sub(1);
        let entries = (0..Self::SIZE)
            .map(|i| {
                if segments == 0 {
                    return stops.first().copied().unwrap_or([0, 0, 0]);
                }
                let t = i as f32 / (Self::SIZE - 1) as f32 * segments as f32;
                let s = (t.floor() as usize).min(segments - 1);
                let f = t - s as f32;
                let (a, b) = (stops[s], stops[s + 1]);
                [0, 1, 2].map(|c| (a[c] as f32 + (b[c] as f32 - a[c] as f32) * f).round() as u8)
            })
            .collect();
        Self { entries }
    }

    /// Color for `t` in `[0, 1]` (clamped; NaN maps to the first entry)
    #[inline]
    pub fn sample(&self, t: f32) -> [u8; 3] {
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
        let index = (t * (Self::SIZE - 1) as f32).round() as usize;
        self.entries[index]
    }

    pub fn entries(&self) -> &[[u8; 3]] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoints() {
        let palette = Palette::inferno();
        assert_eq!(palette.entries().len(), 256);
        assert_eq!(palette.sample(0.0), [0, 0, 4]);
        assert_eq!(palette.sample(1.0), [252, 255, 164]);
    }

    #[test]
    fn test_clamps_out_of_range() {
        let palette = Palette::inferno();
        assert_eq!(palette.sample(-3.0), palette.sample(0.0));
        assert_eq!(palette.sample(7.0), palette.sample(1.0));
        assert_eq!(palette.sample(f32::NAN), palette.sample(0.0));
    }

    #[test]
    fn test_two_stop_gradient() {
        let palette = Palette::from_stops(&[[0, 0, 0], [255, 255, 255]]);
        assert_eq!(palette.sample(0.5), [128, 128, 128]);
    }

    #[test]
    fn test_brightness_increases() {
        let palette = Palette::inferno();
        let luma = |c: [u8; 3]| c.iter().map(|&v| v as u32).sum::<u32>();
        assert!(luma(palette.sample(0.0)) < luma(palette.sample(0.5)));
        assert!(luma(palette.sample(0.5)) < luma(palette.sample(1.0)));
    }
}
