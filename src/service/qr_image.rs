//! Printable tag image: the QR symbol on a white card with the edit password underneath.

use crate::config::QrCodeConfig;
use crate::error::app_error::AppError;
use ab_glyph::{FontRef, PxScale};
use image::{ImageFormat, Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use qrcode::{Color, EcLevel, QrCode};
use std::io::Cursor;

/// Embedded so the printed caption never depends on fonts installed on the host.
static CAPTION_FONT: &[u8] = include_bytes!("../../assets/fonts/DejaVuSans.ttf");

const CAPTION_BAND: u32 = 40;
const CAPTION_FONT_SIZE: f32 = 20.0;
const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedImage {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
    pub extension: &'static str,
}

#[derive(Debug, Clone, Copy)]
pub struct QrImageRenderer {
    scale: u32,
    margin_modules: u32,
}

impl QrImageRenderer {
    pub fn new(scale: u32, margin_modules: u32) -> Self {
        Self {
            scale: scale.max(1),
            margin_modules,
        }
    }

    pub fn from_config(config: &QrCodeConfig) -> Self {
        Self::new(config.module_scale, config.margin_modules)
    }

    /// PNG of the symbol encoding `data`, with `Password: <password>` centred in a band below it.
    pub fn render_tag(&self, data: &str, password: &str) -> Result<RenderedImage, AppError> {
        let code = QrCode::with_error_correction_level(data.as_bytes(), EcLevel::H)
            .map_err(|e| AppError::render(format!("Failed to encode QR code: {}", e)))?;

        let mut canvas = self.draw_symbol(&code);
        draw_caption(&mut canvas, &format!("Password: {}", password))?;

        let mut bytes = Vec::new();
        canvas
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .map_err(|e| AppError::render(format!("Failed to encode tag image: {}", e)))?;

        Ok(RenderedImage {
            bytes,
            content_type: "image/png",
            extension: "png",
        })
    }

    fn draw_symbol(&self, code: &QrCode) -> RgbaImage {
        let modules = code.width() as u32;
        let margin = self.margin_modules * self.scale;
        let side = modules * self.scale + 2 * margin;

        let mut canvas = RgbaImage::from_pixel(side, side + CAPTION_BAND, WHITE);
        for (index, color) in code.to_colors().into_iter().enumerate() {
            if color != Color::Dark {
                continue;
            }
            let index = index as u32;
            let x = margin + (index % modules) * self.scale;
            let y = margin + (index / modules) * self.scale;
            draw_filled_rect_mut(&mut canvas, Rect::at(x as i32, y as i32).of_size(self.scale, self.scale), BLACK);
        }
        canvas
    }
}

fn draw_caption(canvas: &mut RgbaImage, caption: &str) -> Result<(), AppError> {
    let font = FontRef::try_from_slice(CAPTION_FONT).map_err(|e| AppError::render(format!("Failed to load caption font: {}", e)))?;
    let scale = PxScale::from(CAPTION_FONT_SIZE);

    let (text_width, text_height) = text_size(scale, &font, caption);
    let band_top = canvas.height() - CAPTION_BAND;
    let x = (canvas.width() as i32 - text_width as i32) / 2;
    let y = band_top as i32 + (CAPTION_BAND as i32 - text_height as i32) / 2;

    draw_text_mut(canvas, BLACK, x.max(0), y, scale, &font, caption);
    Ok(())
}
