use image::{DynamicImage, Rgb, RgbImage};

use crate::compositor::encode_png;

pub const PLACEHOLDER_EDGE: u32 = 512;

const BACKGROUND: Rgb<u8> = Rgb([0xf8, 0xf9, 0xfa]);
const TEXT: Rgb<u8> = Rgb([0x6c, 0x75, 0x7d]);

const GLYPH_COLS: u32 = 5;
const GLYPH_ROWS: u32 = 7;
const SCALE: u32 = 4;
const ADVANCE: u32 = (GLYPH_COLS + 1) * SCALE;
const LINE_HEIGHT: u32 = (GLYPH_ROWS + 2) * SCALE;
const MARGIN: u32 = 32;
const MAX_CHARS_PER_LINE: usize = ((PLACEHOLDER_EDGE - 2 * MARGIN) / ADVANCE) as usize;
const MAX_LINES: usize = ((PLACEHOLDER_EDGE - 2 * MARGIN) / LINE_HEIGHT) as usize;

const HOLLOW_BOX: [u8; 7] = [0x1f, 0x11, 0x11, 0x11, 0x11, 0x11, 0x1f];

/// Gray 512x512 card with the item name, used wherever a real image is
/// missing. Output depends on `name` only.
pub fn render_placeholder(name: &str) -> anyhow::Result<Vec<u8>> {
    encode_png(&DynamicImage::ImageRgb8(placeholder_image(name)))
}

pub fn placeholder_image(name: &str) -> RgbImage {
    let mut canvas = RgbImage::from_pixel(PLACEHOLDER_EDGE, PLACEHOLDER_EDGE, BACKGROUND);
    let lines = wrap_words(name.trim(), MAX_CHARS_PER_LINE, MAX_LINES);
    let block_height = lines.len() as u32 * LINE_HEIGHT;
    let mut y = (PLACEHOLDER_EDGE.saturating_sub(block_height)) / 2 + SCALE;

    for line in &lines {
        let width = line.chars().count() as u32 * ADVANCE;
        let mut x = (PLACEHOLDER_EDGE.saturating_sub(width)) / 2 + SCALE / 2;
        for ch in line.chars() {
            draw_glyph(&mut canvas, x, y, glyph(ch));
            x += ADVANCE;
        }
        y += LINE_HEIGHT;
    }
    canvas
}

fn draw_glyph(canvas: &mut RgbImage, origin_x: u32, origin_y: u32, rows: [u8; 7]) {
    for (row_idx, bits) in rows.iter().enumerate() {
        for col in 0..GLYPH_COLS {
            if bits & (1 << (GLYPH_COLS - 1 - col)) == 0 {
                continue;
            }
            let px = origin_x + col * SCALE;
            let py = origin_y + row_idx as u32 * SCALE;
            for dy in 0..SCALE {
                for dx in 0..SCALE {
                    let (x, y) = (px + dx, py + dy);
                    if x < canvas.width() && y < canvas.height() {
                        canvas.put_pixel(x, y, TEXT);
                    }
                }
            }
        }
    }
}

/// Greedy word wrap; words longer than a line are split.
fn wrap_words(text: &str, width: usize, max_lines: usize) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let mut word = word.chars().collect::<Vec<char>>();
        while word.len() > width {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            lines.push(word.drain(..width).collect());
        }
        let word = word.into_iter().collect::<String>();
        if word.is_empty() {
            continue;
        }
        let needed = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if needed > width {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines.truncate(max_lines);
    lines
}

fn glyph(ch: char) -> [u8; 7] {
    match ch.to_ascii_uppercase() {
        'A' => [0x0e, 0x11, 0x11, 0x1f, 0x11, 0x11, 0x11],
        'B' => [0x1e, 0x11, 0x11, 0x1e, 0x11, 0x11, 0x1e],
        'C' => [0x0e, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0e],
        'D' => [0x1c, 0x12, 0x11, 0x11, 0x11, 0x12, 0x1c],
        'E' => [0x1f, 0x10, 0x10, 0x1e, 0x10, 0x10, 0x1f],
        'F' => [0x1f, 0x10, 0x10, 0x1e, 0x10, 0x10, 0x10],
        'G' => [0x0e, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0f],
        'H' => [0x11, 0x11, 0x11, 0x1f, 0x11, 0x11, 0x11],
        'I' => [0x0e, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0e],
        'J' => [0x07, 0x02, 0x02, 0x02, 0x02, 0x12, 0x0c],
        'K' => [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11],
        'L' => [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1f],
        'M' => [0x11, 0x1b, 0x15, 0x15, 0x11, 0x11, 0x11],
        'N' => [0x11, 0x11, 0x19, 0x15, 0x13, 0x11, 0x11],
        'O' => [0x0e, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0e],
        'P' => [0x1e, 0x11, 0x11, 0x1e, 0x10, 0x10, 0x10],
        'Q' => [0x0e, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0d],
        'R' => [0x1e, 0x11, 0x11, 0x1e, 0x14, 0x12, 0x11],
        'S' => [0x0f, 0x10, 0x10, 0x0e, 0x01, 0x01, 0x1e],
        'T' => [0x1f, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
        'U' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0e],
        'V' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x0a, 0x04],
        'W' => [0x11, 0x11, 0x11, 0x15, 0x15, 0x15, 0x0a],
        'X' => [0x11, 0x11, 0x0a, 0x04, 0x0a, 0x11, 0x11],
        'Y' => [0x11, 0x11, 0x0a, 0x04, 0x04, 0x04, 0x04],
        'Z' => [0x1f, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1f],
        '0' => [0x0e, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0e],
        '1' => [0x04, 0x0c, 0x04, 0x04, 0x04, 0x04, 0x0e],
        '2' => [0x0e, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1f],
        '3' => [0x1f, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0e],
        '4' => [0x02, 0x06, 0x0a, 0x12, 0x1f, 0x02, 0x02],
        '5' => [0x1f, 0x10, 0x1e, 0x01, 0x01, 0x11, 0x0e],
        '6' => [0x06, 0x08, 0x10, 0x1e, 0x11, 0x11, 0x0e],
        '7' => [0x1f, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0e, 0x11, 0x11, 0x0e, 0x11, 0x11, 0x0e],
        '9' => [0x0e, 0x11, 0x11, 0x0f, 0x01, 0x02, 0x0c],
        ' ' => [0x00; 7],
        '-' => [0x00, 0x00, 0x00, 0x1f, 0x00, 0x00, 0x00],
        '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x0c, 0x0c],
        ',' => [0x00, 0x00, 0x00, 0x00, 0x0c, 0x04, 0x08],
        '\'' => [0x0c, 0x04, 0x08, 0x00, 0x00, 0x00, 0x00],
        '&' => [0x0c, 0x12, 0x14, 0x08, 0x15, 0x12, 0x0d],
        '(' => [0x02, 0x04, 0x08, 0x08, 0x08, 0x04, 0x02],
        ')' => [0x08, 0x04, 0x02, 0x02, 0x02, 0x04, 0x08],
        '/' => [0x00, 0x01, 0x02, 0x04, 0x08, 0x10, 0x00],
        '!' => [0x04, 0x04, 0x04, 0x04, 0x04, 0x00, 0x04],
        '?' => [0x0e, 0x11, 0x01, 0x02, 0x04, 0x00, 0x04],
        ':' => [0x00, 0x0c, 0x0c, 0x00, 0x0c, 0x0c, 0x00],
        '+' => [0x00, 0x04, 0x04, 0x1f, 0x04, 0x04, 0x00],
        _ => HOLLOW_BOX,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_pixels(image: &RgbImage) -> usize {
        image.pixels().filter(|pixel| **pixel == TEXT).count()
    }

    #[test]
    fn placeholder_is_512_square_png_and_deterministic() -> anyhow::Result<()> {
        let first = render_placeholder("Kimchi Stew")?;
        let second = render_placeholder("Kimchi Stew")?;
        assert_eq!(first, second);
        assert_ne!(first, render_placeholder("Seaweed Soup")?);

        let decoded = image::load_from_memory(&first)?.to_rgb8();
        assert_eq!(decoded.dimensions(), (PLACEHOLDER_EDGE, PLACEHOLDER_EDGE));
        assert_eq!(*decoded.get_pixel(0, 0), BACKGROUND);
        assert!(text_pixels(&decoded) > 0);
        Ok(())
    }

    #[test]
    fn non_ascii_characters_render_as_hollow_boxes() {
        let box_pixels = HOLLOW_BOX
            .iter()
            .map(|row| row.count_ones() as usize)
            .sum::<usize>();
        assert_eq!(
            text_pixels(&placeholder_image("김치찌개")),
            4 * box_pixels * (SCALE * SCALE) as usize
        );
    }

    #[test]
    fn empty_name_is_a_blank_card() {
        assert_eq!(text_pixels(&placeholder_image("   ")), 0);
    }

    #[test]
    fn wrap_words_breaks_on_spaces_and_splits_long_words() {
        assert_eq!(
            wrap_words("Spicy Stir-fried Pork with Rice", 12, 10),
            vec!["Spicy", "Stir-fried", "Pork with", "Rice"]
        );
        assert_eq!(wrap_words("abcdefghij", 4, 10), vec!["abcd", "efgh", "ij"]);
        assert_eq!(wrap_words("a b c d", 1, 2), vec!["a", "b"]);
    }
}
