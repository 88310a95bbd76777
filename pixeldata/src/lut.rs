//! The grayscale rendering pipeline:
//! stored value, modality LUT, VOI LUT, presentation LUT, 8-bit output,
//! applied in that order.

/// Parameters for the linear VOI LUT (window center and width).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowLevel {
    /// The window center.
    pub center: f64,
    /// The window width. Must be at least 1.
    pub width: f64,
    /// Apply an inverse presentation LUT on top of the VOI LUT.
    pub invert: bool,
}

impl WindowLevel {
    /// A window spanning the full range of the given bit depth.
    pub fn full_range(bits_stored: u16) -> Self {
        let max = f64::from((1u32 << bits_stored) - 1);
        WindowLevel {
            center: max / 2.0,
            width: max + 1.0,
            invert: false,
        }
    }
}

/// The rescale (modality LUT) transformation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rescale {
    /// The rescale slope. Defaults to 1.
    pub slope: f64,
    /// The rescale intercept. Defaults to 0.
    pub intercept: f64,
}

impl Default for Rescale {
    fn default() -> Self {
        Rescale {
            slope: 1.0,
            intercept: 0.0,
        }
    }
}

impl Rescale {
    /// Apply the modality LUT to a stored value.
    #[inline]
    pub fn apply(&self, stored: f64) -> f64 {
        stored * self.slope + self.intercept
    }
}

/// Apply the linear window function of PS3.3 C.11.2.1.2
/// to a modality value, producing an 8-bit output level.
#[inline]
pub fn apply_window(value: f64, center: f64, width: f64) -> u8 {
    let width = width.max(1.0);
    let low = center - 0.5 - (width - 1.0) / 2.0;
    let high = center - 0.5 + (width - 1.0) / 2.0;
    if value <= low {
        0
    } else if value > high {
        255
    } else {
        (((value - (center - 0.5)) / (width - 1.0) + 0.5) * 255.0) as u8
    }
}

/// Run the full grayscale pipeline for one stored value.
#[inline]
pub fn render_sample(stored: f64, rescale: Rescale, window: &WindowLevel, monochrome1: bool) -> u8 {
    let value = rescale.apply(stored);
    let level = apply_window(value, window.center, window.width);
    // MONOCHROME1 displays minimum as white; the presentation LUT
    // inverts once more when requested by the caller
    if monochrome1 != window.invert {
        255 - level
    } else {
        level
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_clamps_to_output_range() {
        assert_eq!(apply_window(-1000.0, 40.0, 400.0), 0);
        assert_eq!(apply_window(1000.0, 40.0, 400.0), 255);
    }

    #[test]
    fn window_center_maps_to_midtone() {
        let level = apply_window(40.0, 40.0, 400.0);
        assert!((126..=129).contains(&level), "got {}", level);
    }

    #[test]
    fn rescale_applies_before_window() {
        // stored 0 with intercept -1024 lands far below a soft-tissue window
        let rescale = Rescale {
            slope: 1.0,
            intercept: -1024.0,
        };
        let window = WindowLevel {
            center: 40.0,
            width: 400.0,
            invert: false,
        };
        assert_eq!(render_sample(0.0, rescale, &window, false), 0);
    }

    #[test]
    fn monochrome1_and_invert_cancel_out() {
        let rescale = Rescale::default();
        let window = WindowLevel {
            center: 128.0,
            width: 256.0,
            invert: true,
        };
        let a = render_sample(200.0, rescale, &window, true);
        let window_plain = WindowLevel {
            invert: false,
            ..window
        };
        let b = render_sample(200.0, rescale, &window_plain, false);
        assert_eq!(a, b);
    }
}
