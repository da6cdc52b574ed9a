// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 叠加层渲染 (Overlay renderer)
//!
//! 每个检测: 边框 + 标签横幅 + 序号徽章; 左上角显示总人数.

use std::fs;
use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size,
};
use imageproc::rect::Rect;

use crate::detection::RankedDetection;

/// 叠加层样式
#[derive(Clone, Debug)]
pub struct OverlayStyle {
    pub box_color: Rgb<u8>,
    pub badge_color: Rgb<u8>,
    pub text_color: Rgb<u8>,
    pub header_color: Rgb<u8>,
    pub thickness: u32,
    pub font_size: f32,
    pub badge_radius: i32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            box_color: Rgb([0, 200, 83]),
            badge_color: Rgb([255, 179, 0]),
            text_color: Rgb([255, 255, 255]),
            header_color: Rgb([27, 94, 32]),
            thickness: 2,
            font_size: 16.0,
            badge_radius: 11,
        }
    }
}

pub struct OverlayRenderer {
    font: Option<FontArc>,
    style: OverlayStyle,
}

impl OverlayRenderer {
    /// Without a font only the shapes are drawn.
    pub fn new(font: Option<FontArc>, style: OverlayStyle) -> Self {
        Self { font, style }
    }

    pub fn with_font_file(path: &Path, style: OverlayStyle) -> Result<Self> {
        let data =
            fs::read(path).with_context(|| format!("failed to read font {}", path.display()))?;
        let font = FontArc::try_from_vec(data)
            .with_context(|| format!("invalid font {}", path.display()))?;
        Ok(Self::new(Some(font), style))
    }

    pub fn style(&self) -> &OverlayStyle {
        &self.style
    }

    /// 绘制全部检测与人数
    pub fn draw(&self, image: &mut RgbImage, detections: &[RankedDetection]) {
        for det in detections {
            self.draw_detection(image, det);
        }
        self.draw_header(image, detections.len());
    }

    fn draw_detection(&self, image: &mut RgbImage, ranked: &RankedDetection) {
        let bbox = &ranked.detection.bbox;
        if !bbox.is_well_formed() {
            return;
        }

        // 裁剪到画面内, 完全在画面外的框不画
        let left = bbox.x.max(0.0).round();
        let top = bbox.y.max(0.0).round();
        let right = bbox.xmax().min(image.width() as f32).round();
        let bottom = bbox.ymax().min(image.height() as f32).round();
        if right <= left || bottom <= top {
            return;
        }
        let x = left as i32;
        let y = top as i32;
        let w = (right - left) as u32;
        let h = (bottom - top) as u32;

        // 边框 (向内加粗)
        for t in 0..self.style.thickness.min(w / 2).min(h / 2).max(1) {
            let rect = Rect::at(x + t as i32, y + t as i32).of_size(w - 2 * t, h - 2 * t);
            draw_hollow_rect_mut(image, rect, self.style.box_color);
        }

        // 标签横幅, 放不下时画在框内
        let label = label_text(ranked);
        let (text_w, text_h) = self.measure(&label);
        let banner_h = text_h + 6;
        let banner_y = if y >= banner_h as i32 { y - banner_h as i32 } else { y };
        let banner = Rect::at(x, banner_y).of_size(text_w + 8, banner_h);
        draw_filled_rect_mut(image, banner, self.style.box_color);
        if let Some(font) = &self.font {
            draw_text_mut(
                image,
                self.style.text_color,
                x + 4,
                banner_y + 3,
                self.scale(),
                font,
                &label,
            );
        }

        // 序号徽章 (右上角)
        let r = self.style.badge_radius;
        let center = (x + w as i32 - r, y + r);
        draw_filled_circle_mut(image, center, r, self.style.badge_color);
        if let Some(font) = &self.font {
            let rank = ranked.rank.to_string();
            let (rw, rh) = text_size(self.scale(), font, &rank);
            draw_text_mut(
                image,
                self.style.text_color,
                center.0 - rw as i32 / 2,
                center.1 - rh as i32 / 2,
                self.scale(),
                font,
                &rank,
            );
        }
    }

    fn draw_header(&self, image: &mut RgbImage, count: usize) {
        let text = format!("Jamaah: {}", count);
        let (text_w, text_h) = self.measure(&text);
        let header = Rect::at(0, 0).of_size(text_w + 16, text_h + 12);
        draw_filled_rect_mut(image, header, self.style.header_color);
        if let Some(font) = &self.font {
            draw_text_mut(image, self.style.text_color, 8, 6, self.scale(), font, &text);
        }
    }

    fn scale(&self) -> PxScale {
        PxScale::from(self.style.font_size)
    }

    /// 文字尺寸; 无字体时按字号估算
    fn measure(&self, text: &str) -> (u32, u32) {
        match &self.font {
            Some(font) => {
                let (w, h) = text_size(self.scale(), font, text);
                (w.max(1), h.max(1))
            }
            None => {
                let size = self.style.font_size;
                (
                    ((text.chars().count() as f32) * size * 0.6).ceil().max(1.0) as u32,
                    size.ceil().max(1.0) as u32,
                )
            }
        }
    }
}

/// 横幅文字, 例如 "Jamaah 90%"
pub fn label_text(ranked: &RankedDetection) -> String {
    format!("Jamaah {:.0}%", ranked.detection.score * 100.0)
}
