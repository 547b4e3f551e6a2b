// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Intensity view — reduces any decoded image to one 8-bit intensity value per
// pixel so rows can be compared on a single 0-255 scale.

use image::{DynamicImage, GrayImage, Luma, Pixel};

// BT.601 luma weights in 14-bit fixed point. They sum to 1 << 14, so a pixel
// with equal channels maps to exactly that channel value.
const WEIGHT_R: u32 = 4899;
const WEIGHT_G: u32 = 9617;
const WEIGHT_B: u32 = 1868;
const SHIFT: u32 = 14;
const ROUND: u32 = 1 << (SHIFT - 1);

/// Weighted luma of one RGB pixel, rounded to nearest.
#[inline]
pub fn luma(r: u8, g: u8, b: u8) -> u8 {
    let weighted = WEIGHT_R * r as u32 + WEIGHT_G * g as u32 + WEIGHT_B * b as u32;
    ((weighted + ROUND) >> SHIFT) as u8
}

/// Build the single-channel intensity view of `image`.
///
/// 8-bit greyscale passes through untouched and grey+alpha keeps only its
/// grey channel. Colour images are weighted in RGB order (the order the
/// decoder produces); alpha never contributes. Deeper sample types are
/// reduced to 8 bits first.
pub fn intensity_view(image: &DynamicImage) -> GrayImage {
    match image {
        DynamicImage::ImageLuma8(gray) => gray.clone(),
        DynamicImage::ImageLumaA8(gray_alpha) => {
            GrayImage::from_fn(gray_alpha.width(), gray_alpha.height(), |x, y| {
                Luma([gray_alpha.get_pixel(x, y).0[0]])
            })
        }
        DynamicImage::ImageRgb8(rgb) => GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
            let [r, g, b] = rgb.get_pixel(x, y).0;
            Luma([luma(r, g, b)])
        }),
        DynamicImage::ImageRgba8(rgba) => {
            GrayImage::from_fn(rgba.width(), rgba.height(), |x, y| {
                let rgb = rgba.get_pixel(x, y).to_rgb();
                let [r, g, b] = rgb.0;
                Luma([luma(r, g, b)])
            })
        }
        DynamicImage::ImageLuma16(_) | DynamicImage::ImageLumaA16(_) => image.to_luma8(),
        other => {
            let rgb = other.to_rgb8();
            GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
                let [r, g, b] = rgb.get_pixel(x, y).0;
                Luma([luma(r, g, b)])
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{LumaA, Rgb, RgbImage, Rgba, RgbaImage};

    #[test]
    fn luma_of_equal_channels_is_identity() {
        for v in 0..=255u8 {
            assert_eq!(luma(v, v, v), v);
        }
    }

    #[test]
    fn luma_weights_green_most() {
        assert_eq!(luma(255, 0, 0), 76);
        assert_eq!(luma(0, 255, 0), 150);
        assert_eq!(luma(0, 0, 255), 29);
    }

    #[test]
    fn grayscale_passes_through() {
        let gray = GrayImage::from_fn(4, 3, |x, y| Luma([(x * 10 + y) as u8]));
        let view = intensity_view(&DynamicImage::ImageLuma8(gray.clone()));
        assert_eq!(view, gray);
    }

    #[test]
    fn replicated_rgb_matches_grayscale() {
        let gray = GrayImage::from_fn(5, 4, |x, y| Luma([(x * 37 + y * 11) as u8]));
        let rgb = RgbImage::from_fn(5, 4, |x, y| {
            let v = gray.get_pixel(x, y).0[0];
            Rgb([v, v, v])
        });
        assert_eq!(intensity_view(&DynamicImage::ImageRgb8(rgb)), gray);
    }

    #[test]
    fn alpha_is_ignored() {
        let rgba = RgbaImage::from_fn(2, 1, |x, _| Rgba([0, 255, 0, (x * 200) as u8]));
        let view = intensity_view(&DynamicImage::ImageRgba8(rgba));
        assert_eq!(view.get_pixel(0, 0), view.get_pixel(1, 0));

        let la = image::GrayAlphaImage::from_fn(2, 1, |x, _| LumaA([90, (x * 255) as u8]));
        let view = intensity_view(&DynamicImage::ImageLumaA8(la));
        assert_eq!(view.get_pixel(0, 0).0[0], 90);
        assert_eq!(view.get_pixel(1, 0).0[0], 90);
    }

    #[test]
    fn sixteen_bit_grayscale_is_scaled() {
        let gray16 = image::ImageBuffer::from_fn(2, 1, |x, _| Luma([if x == 0 { 0u16 } else { 65535 }]));
        let view = intensity_view(&DynamicImage::ImageLuma16(gray16));
        assert_eq!(view.get_pixel(0, 0).0[0], 0);
        assert_eq!(view.get_pixel(1, 0).0[0], 255);
    }
}
