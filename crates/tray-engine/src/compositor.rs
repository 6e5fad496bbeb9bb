use anyhow::Context;
use image::codecs::png::PngEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgb, RgbImage};
use serde::Serialize;
use serde_json::json;
use tray_contracts::events::{payload, EventWriter};
use tray_contracts::templates::{resolve_template, Rect};

use crate::generator::ItemImage;
use crate::placeholder::placeholder_image;

pub const CANVAS_WIDTH: u32 = 1200;
pub const CANVAS_HEIGHT: u32 = 800;

const WHITE: Rgb<u8> = Rgb([0xff, 0xff, 0xff]);
const OUTER_BORDER: Rgb<u8> = Rgb([0xe0, 0xe0, 0xe0]);
const INNER_OUTLINE: Rgb<u8> = Rgb([0xf0, 0xf0, 0xf0]);
const OUTER_BORDER_PX: u32 = 4;
const INNER_OUTLINE_PX: u32 = 2;
const INNER_INSET: u32 = 20;

const MOCK_WIDTH: u32 = 800;
const MOCK_HEIGHT: u32 = 600;
const MOCK_BLOCK: Rect = Rect::new(100, 100, 600, 400);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlacedItem {
    pub name: String,
    pub rect: Rect,
    pub placeholder: bool,
}

#[derive(Debug, Clone)]
pub struct Composite {
    pub png: Vec<u8>,
    pub template_id: &'static str,
    pub placed: Vec<PlacedItem>,
    /// Items beyond the template's slot count.
    pub dropped: usize,
}

impl Composite {
    pub fn degraded_items(&self) -> Vec<String> {
        self.placed
            .iter()
            .filter(|placed| placed.placeholder)
            .map(|placed| placed.name.clone())
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct TrayCompositor {
    events: EventWriter,
}

impl TrayCompositor {
    pub fn new(events: EventWriter) -> Self {
        Self { events }
    }

    /// Paints `images` into the template's slots in order; the i-th image
    /// goes to the i-th slot and anything past the last slot is dropped.
    pub fn compose(&self, images: &[ItemImage], template_id: &str) -> anyhow::Result<Composite> {
        let template = resolve_template(template_id);
        let mut canvas = blank_tray();
        let mut placed = Vec::with_capacity(template.capacity().min(images.len()));

        for (image, rect) in images.iter().zip(template.positions()) {
            let (source, placeholder) = match image::load_from_memory(&image.bytes) {
                Ok(decoded) => (decoded, image.placeholder),
                Err(err) => {
                    self.events.record(
                        "slot_decode_failed",
                        payload(json!({
                            "item": image.item.name,
                            "template": template.id,
                            "error": err.to_string(),
                        })),
                    );
                    (
                        DynamicImage::ImageRgb8(placeholder_image(&image.item.name)),
                        true,
                    )
                }
            };
            let tile = source
                .resize_to_fill(rect.width, rect.height, FilterType::Lanczos3)
                .to_rgb8();
            imageops::replace(&mut canvas, &tile, i64::from(rect.x), i64::from(rect.y));
            placed.push(PlacedItem {
                name: image.item.name.clone(),
                rect,
                placeholder,
            });
        }

        let dropped = images.len().saturating_sub(placed.len());
        if dropped > 0 {
            self.events.record(
                "items_dropped",
                payload(json!({
                    "template": template.id,
                    "capacity": template.capacity(),
                    "dropped": dropped,
                })),
            );
        }

        let png = encode_png(&DynamicImage::ImageRgb8(canvas))
            .with_context(|| format!("failed to encode {} tray", template.id))?;
        Ok(Composite {
            png,
            template_id: template.id,
            placed,
            dropped,
        })
    }
}

/// Stand-in tray for when per-item generation is unavailable.
pub fn render_mock_tray() -> anyhow::Result<Vec<u8>> {
    let mut canvas = RgbImage::from_pixel(MOCK_WIDTH, MOCK_HEIGHT, WHITE);
    fill_rect(&mut canvas, MOCK_BLOCK, INNER_OUTLINE);
    encode_png(&DynamicImage::ImageRgb8(canvas)).context("failed to encode mock tray")
}

pub fn encode_png(image: &DynamicImage) -> anyhow::Result<Vec<u8>> {
    let mut bytes = Vec::new();
    image.write_with_encoder(PngEncoder::new(&mut bytes))?;
    Ok(bytes)
}

fn blank_tray() -> RgbImage {
    let mut canvas = RgbImage::from_pixel(CANVAS_WIDTH, CANVAS_HEIGHT, WHITE);
    stroke_rect(
        &mut canvas,
        Rect::new(0, 0, CANVAS_WIDTH, CANVAS_HEIGHT),
        OUTER_BORDER_PX,
        OUTER_BORDER,
    );
    stroke_rect(
        &mut canvas,
        Rect::new(
            INNER_INSET,
            INNER_INSET,
            CANVAS_WIDTH - 2 * INNER_INSET,
            CANVAS_HEIGHT - 2 * INNER_INSET,
        ),
        INNER_OUTLINE_PX,
        INNER_OUTLINE,
    );
    canvas
}

fn stroke_rect(canvas: &mut RgbImage, rect: Rect, thickness: u32, color: Rgb<u8>) {
    let t = thickness.min(rect.width / 2).min(rect.height / 2);
    fill_rect(canvas, Rect::new(rect.x, rect.y, rect.width, t), color);
    fill_rect(canvas, Rect::new(rect.x, rect.bottom() - t, rect.width, t), color);
    fill_rect(canvas, Rect::new(rect.x, rect.y, t, rect.height), color);
    fill_rect(canvas, Rect::new(rect.right() - t, rect.y, t, rect.height), color);
}

fn fill_rect(canvas: &mut RgbImage, rect: Rect, color: Rgb<u8>) {
    let right = rect.right().min(canvas.width());
    let bottom = rect.bottom().min(canvas.height());
    for y in rect.y..bottom {
        for x in rect.x..right {
            canvas.put_pixel(x, y, color);
        }
    }
}

#[cfg(test)]
mod tests {
    use tray_contracts::menu::{Category, MenuItem};
    use tray_contracts::templates::STANDARD_TEMPLATE;

    use super::*;

    fn swatch(name: &str, color: [u8; 3]) -> anyhow::Result<ItemImage> {
        let bytes = encode_png(&DynamicImage::ImageRgb8(RgbImage::from_pixel(
            64,
            48,
            Rgb(color),
        )))?;
        Ok(ItemImage {
            item: MenuItem::new(name, Category::Side),
            bytes,
            placeholder: false,
            attempts: 1,
            error: None,
        })
    }

    fn compositor(temp: &tempfile::TempDir) -> TrayCompositor {
        TrayCompositor::new(EventWriter::new(temp.path().join("events.jsonl"), "test"))
    }

    fn close_to(pixel: &Rgb<u8>, expected: [u8; 3]) -> bool {
        pixel
            .0
            .iter()
            .zip(expected)
            .all(|(got, want)| got.abs_diff(want) <= 2)
    }

    #[test]
    fn compose_paints_frame_and_slots_in_order() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let images = vec![
            swatch("Bulgogi", [200, 30, 30])?,
            swatch("Kimchi", [30, 200, 30])?,
        ];
        let composite = compositor(&temp).compose(&images, "standard")?;
        let canvas = image::load_from_memory(&composite.png)?.to_rgb8();

        assert_eq!(canvas.dimensions(), (CANVAS_WIDTH, CANVAS_HEIGHT));
        assert_eq!(*canvas.get_pixel(1, 1), OUTER_BORDER);
        assert_eq!(*canvas.get_pixel(10, 10), WHITE);
        assert_eq!(*canvas.get_pixel(20, 400), INNER_OUTLINE);

        let main = STANDARD_TEMPLATE.sections[0].position;
        let side = STANDARD_TEMPLATE.sections[1].position;
        assert!(close_to(
            canvas.get_pixel(main.x + main.width / 2, main.y + main.height / 2),
            [200, 30, 30]
        ));
        assert!(close_to(
            canvas.get_pixel(side.x + side.width / 2, side.y + side.height / 2),
            [30, 200, 30]
        ));
        assert_eq!(composite.placed.len(), 2);
        assert_eq!(composite.placed[0].rect, main);
        assert!(composite.degraded_items().is_empty());
        Ok(())
    }

    #[test]
    fn compose_drops_items_beyond_capacity() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let images = (0..6)
            .map(|idx| swatch(&format!("Item {idx}"), [idx * 40, 10, 10]))
            .collect::<anyhow::Result<Vec<ItemImage>>>()?;

        let standard = compositor(&temp).compose(&images, "standard")?;
        assert_eq!(standard.placed.len(), 5);
        assert_eq!(standard.dropped, 1);

        let compact = compositor(&temp).compose(&images, "lunchbox")?;
        assert_eq!(compact.template_id, "compact");
        assert_eq!(compact.placed.len(), 2);
        assert_eq!(compact.placed[1].name, "Item 1");
        Ok(())
    }

    #[test]
    fn undecodable_slot_falls_back_to_placeholder() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let mut broken = swatch("Japchae", [0, 0, 0])?;
        broken.bytes = b"truncated".to_vec();
        let composite = compositor(&temp).compose(&[broken], "compact")?;

        assert_eq!(composite.degraded_items(), vec!["Japchae".to_string()]);
        let log = std::fs::read_to_string(temp.path().join("events.jsonl"))?;
        assert!(log.contains("slot_decode_failed"));
        Ok(())
    }

    #[test]
    fn mock_tray_has_gray_block() -> anyhow::Result<()> {
        let mock = image::load_from_memory(&render_mock_tray()?)?.to_rgb8();
        assert_eq!(mock.dimensions(), (MOCK_WIDTH, MOCK_HEIGHT));
        assert_eq!(*mock.get_pixel(50, 50), WHITE);
        assert_eq!(*mock.get_pixel(400, 300), INNER_OUTLINE);
        assert_eq!(*mock.get_pixel(750, 550), WHITE);
        Ok(())
    }
}
