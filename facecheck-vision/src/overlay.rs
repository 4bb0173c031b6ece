//! Frame annotation: rectangles and labels drawn straight into an `RgbImage`.
//!
//! Labels use a built-in 5x7 bitmap font (upper case letters, digits and a
//! little punctuation; lower case is folded to upper case, anything else
//! renders as a hollow box). All drawing clips to the image.

use image::{Rgb, RgbImage};

pub const GREEN: Rgb<u8> = Rgb([0, 255, 0]);
pub const RED: Rgb<u8> = Rgb([255, 0, 0]);

const GLYPH_W: i32 = 5;
const GLYPH_H: i32 = 7;

/// Match / non-match colour.
pub fn verdict_color(matched: bool) -> Rgb<u8> {
    if matched {
        GREEN
    } else {
        RED
    }
}

fn put(img: &mut RgbImage, x: i32, y: i32, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < img.width() && (y as u32) < img.height() {
        img.put_pixel(x as u32, y as u32, color);
    }
}

fn fill(img: &mut RgbImage, x0: i32, y0: i32, x1: i32, y1: i32, color: Rgb<u8>) {
    let (w, h) = (img.width() as i32, img.height() as i32);
    for y in y0.max(0)..=y1.min(h - 1) {
        for x in x0.max(0)..=x1.min(w - 1) {
            img.put_pixel(x as u32, y as u32, color);
        }
    }
}

/// Outline `(left, top, right, bottom)` with a border `thickness` pixels wide,
/// growing inwards.
pub fn draw_rect(
    img: &mut RgbImage,
    (left, top, right, bottom): (i32, i32, i32, i32),
    color: Rgb<u8>,
    thickness: i32,
) {
    let (left, right) = (left.min(right), left.max(right));
    let (top, bottom) = (top.min(bottom), top.max(bottom));
    let t = thickness.max(1) - 1;

    fill(img, left, top, right, top + t, color);
    fill(img, left, bottom - t, right, bottom, color);
    fill(img, left, top, left + t, bottom, color);
    fill(img, right - t, top, right, bottom, color);
}

/// Width in pixels of `text` rendered at `scale`.
pub fn label_width(text: &str, scale: i32) -> i32 {
    let n = text.chars().count() as i32;
    if n == 0 {
        0
    } else {
        (n * (GLYPH_W + 1) - 1) * scale.max(1)
    }
}

/// Draw `text` with its bottom-left corner on `(x, baseline)`.
pub fn draw_label(img: &mut RgbImage, text: &str, x: i32, baseline: i32, color: Rgb<u8>, scale: i32) {
    let scale = scale.max(1);
    let top = baseline - GLYPH_H * scale;

    for (i, ch) in text.chars().enumerate() {
        let origin = x + i as i32 * (GLYPH_W + 1) * scale;
        for (row, bits) in glyph(ch).iter().enumerate() {
            for col in 0..GLYPH_W {
                if bits & (1 << (GLYPH_W - 1 - col)) == 0 {
                    continue;
                }
                let px = origin + col * scale;
                let py = top + row as i32 * scale;
                for dy in 0..scale {
                    for dx in 0..scale {
                        put(img, px + dx, py + dy, color);
                    }
                }
            }
        }
    }
}

fn glyph(ch: char) -> [u8; 7] {
    match ch.to_ascii_uppercase() {
        ' ' => [0; 7],
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        'A' => [0x0E, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'B' => [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E],
        'C' => [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
        'D' => [0x1C, 0x12, 0x11, 0x11, 0x11, 0x12, 0x1C],
        'E' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F],
        'F' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10],
        'G' => [0x0E, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0F],
        'H' => [0x11, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'I' => [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
        'J' => [0x07, 0x02, 0x02, 0x02, 0x02, 0x12, 0x0C],
        'K' => [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11],
        'L' => [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F],
        'M' => [0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11],
        'N' => [0x11, 0x11, 0x19, 0x15, 0x13, 0x11, 0x11],
        'O' => [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'P' => [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10],
        'Q' => [0x0E, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0D],
        'R' => [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11],
        'S' => [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E],
        'T' => [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
        'U' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'V' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04],
        'W' => [0x11, 0x11, 0x11, 0x15, 0x15, 0x15, 0x0A],
        'X' => [0x11, 0x11, 0x0A, 0x04, 0x0A, 0x11, 0x11],
        'Y' => [0x11, 0x11, 0x11, 0x0A, 0x04, 0x04, 0x04],
        'Z' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1F],
        '(' => [0x02, 0x04, 0x08, 0x08, 0x08, 0x04, 0x02],
        ')' => [0x08, 0x04, 0x02, 0x02, 0x02, 0x04, 0x08],
        '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C],
        ',' => [0x00, 0x00, 0x00, 0x00, 0x0C, 0x04, 0x08],
        ':' => [0x00, 0x0C, 0x0C, 0x00, 0x0C, 0x0C, 0x00],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        '_' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x1F],
        _ => [0x1F, 0x11, 0x11, 0x11, 0x11, 0x11, 0x1F],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(img: &RgbImage, color: Rgb<u8>) -> usize {
        img.pixels().filter(|p| **p == color).count()
    }

    #[test]
    fn test_rect_border_only() {
        let mut img = RgbImage::new(20, 20);
        draw_rect(&mut img, (2, 2, 17, 17), GREEN, 2);
        assert_eq!(*img.get_pixel(2, 2), GREEN);
        assert_eq!(*img.get_pixel(3, 10), GREEN);
        assert_eq!(*img.get_pixel(17, 17), GREEN);
        assert_eq!(*img.get_pixel(10, 10), Rgb([0, 0, 0]));
        assert_eq!(*img.get_pixel(4, 10), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_drawing_clips_out_of_bounds() {
        let mut img = RgbImage::new(10, 10);
        draw_rect(&mut img, (-50, -50, 500, 500), RED, 2);
        draw_rect(&mut img, (100, 100, 200, 200), RED, 2);
        draw_label(&mut img, "NO MATCH (0.41)", -30, -2, RED, 3);
        draw_label(&mut img, "MATCH", 8, 12, RED, 1);
        assert!(lit(&img, RED) < 100);
    }

    #[test]
    fn test_label_sits_on_baseline() {
        let mut img = RgbImage::new(40, 20);
        draw_label(&mut img, "1", 0, 14, GREEN, 1);
        // Glyph occupies rows 7..14
        assert!(img.rows().take(7).all(|row| row.into_iter().all(|p| *p != GREEN)));
        assert!((7..14).any(|y| (0..5).any(|x| *img.get_pixel(x, y) == GREEN)));
        assert!((14..20).all(|y| (0..40).all(|x| *img.get_pixel(x, y) != GREEN)));
    }

    #[test]
    fn test_label_width_and_case_folding() {
        assert_eq!(label_width("", 2), 0);
        assert_eq!(label_width("AB", 1), 11);
        assert_eq!(label_width("AB", 2), 22);
        assert_eq!(glyph('m'), glyph('M'));
        assert_eq!(glyph(' '), [0; 7]);
    }
}
