//! SVG backend used for raster export.
//!
//! Pages are drawn at layout width ([`PageGeometry::width_px`]). The height is the page height,
//! or taller when the content runs past the bottom margin, so a long report is never clipped.
//! The rasterizer applies the output scale. Text is wrapped by an average glyph width, which is
//! close enough for the sans-serif faces the rasterizer falls back to.

use super::layout::{Block, LabeledValue, PageLayout};
use super::{embeddable_image, escape_markup};
use crate::config::PageGeometry;
use std::fmt::Write;

const FONT_FAMILY: &str = "Arial, Helvetica, sans-serif";
const ACCENT: &str = "#1a5276";
const TEXT: &str = "#222222";
const MUTED: &str = "#666666";
const GLYPH_WIDTH_RATIO: f32 = 0.55;
const LINE_HEIGHT_RATIO: f32 = 1.4;
const SIGNATURE_BOX: (f32, f32) = (200.0, 80.0);
/// Vertical space kept free below an attachment image for its caption and footer.
const ATTACHMENT_RESERVE: f32 = 140.0;

#[derive(Clone, Copy)]
enum Anchor {
    Start,
    Middle,
}

/// One page as a standalone SVG document, with its size in layout pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct PageSvg {
    pub markup: String,
    pub width: u32,
    pub height: u32,
}

impl PageSvg {
    /// Output bitmap size at `scale`.
    pub fn raster_size(&self, scale: f32) -> (u32, u32) {
        (
            (self.width as f32 * scale).round() as u32,
            (self.height as f32 * scale).round() as u32,
        )
    }
}

struct Canvas {
    out: String,
    page_width: u32,
    page_height: u32,
    padding: f32,
    left: f32,
    width: f32,
    y: f32,
    bottom: f32,
}

impl Canvas {
    fn new(geometry: &PageGeometry) -> Self {
        let page_width = geometry.width_px();
        let page_height = geometry.height_px();
        let padding = geometry.padding_px();
        let width = page_width as f32;
        Self {
            out: String::new(),
            page_width,
            page_height,
            padding,
            left: padding,
            width: width - 2.0 * padding,
            y: padding,
            bottom: page_height as f32 - padding,
        }
    }

    fn finish(self) -> PageSvg {
        let content_height = (self.y + self.padding).ceil() as u32;
        let height = self.page_height.max(content_height);
        let mut markup = String::with_capacity(self.out.len() + 256);
        let _ = write!(
            markup,
            r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" width="{w}" height="{h}" viewBox="0 0 {w} {h}"><rect x="0" y="0" width="{w}" height="{h}" fill="white"/>"#,
            w = self.page_width,
            h = height
        );
        markup.push_str(&self.out);
        markup.push_str("</svg>");
        PageSvg {
            markup,
            width: self.page_width,
            height,
        }
    }

    fn gap(&mut self, amount: f32) {
        self.y += amount;
    }

    fn line(&mut self, size: f32, text: &str, bold: bool, color: &str, anchor: Anchor) {
        self.y += size;
        let (x, anchor_attr) = match anchor {
            Anchor::Start => (self.left, "start"),
            Anchor::Middle => (self.left + self.width / 2.0, "middle"),
        };
        let _ = write!(
            self.out,
            r#"<text x="{:.1}" y="{:.1}" font-family="{}" font-size="{}" font-weight="{}" fill="{}" text-anchor="{}">{}</text>"#,
            x,
            self.y,
            FONT_FAMILY,
            size,
            if bold { "bold" } else { "normal" },
            color,
            anchor_attr,
            escape_markup(text)
        );
        self.y += size * (LINE_HEIGHT_RATIO - 1.0);
    }

    fn paragraph(&mut self, size: f32, text: &str, bold: bool, color: &str, anchor: Anchor) {
        let max_chars = ((self.width / (size * GLYPH_WIDTH_RATIO)).floor() as usize).max(10);
        for line in wrap_text(text, max_chars) {
            self.line(size, &line, bold, color, anchor);
        }
    }

    fn rule(&mut self) {
        self.y += 6.0;
        let _ = write!(
            self.out,
            r#"<line x1="{:.1}" y1="{:.1}" x2="{:.1}" y2="{:.1}" stroke="{}" stroke-width="2"/>"#,
            self.left,
            self.y,
            self.left + self.width,
            self.y,
            ACCENT
        );
        self.y += 10.0;
    }

    fn image(&mut self, src: &str, width: f32, height: f32) {
        let x = self.left + (self.width - width) / 2.0;
        let _ = write!(
            self.out,
            r#"<image x="{:.1}" y="{:.1}" width="{:.1}" height="{:.1}" preserveAspectRatio="xMidYMid meet" xlink:href="{}"/>"#,
            x,
            self.y,
            width,
            height,
            escape_markup(src)
        );
        self.y += height + 8.0;
    }

    fn labeled(&mut self, size: f32, items: &[LabeledValue]) {
        for item in items {
            self.paragraph(
                size,
                &format!("{}: {}", item.label, item.value),
                false,
                TEXT,
                Anchor::Start,
            );
        }
    }
}

/// Standalone SVG document for one page.
pub fn render_svg(page: &PageLayout, geometry: &PageGeometry) -> PageSvg {
    let mut canvas = Canvas::new(geometry);
    for block in &page.blocks {
        draw_block(&mut canvas, block);
    }
    canvas.finish()
}

fn draw_block(canvas: &mut Canvas, block: &Block) {
    match block {
        Block::Header { title, subtitle } => {
            canvas.line(22.0, title, true, ACCENT, Anchor::Middle);
            canvas.line(13.0, subtitle, false, MUTED, Anchor::Middle);
        }
        Block::Divider => canvas.rule(),
        Block::SectionTitle(title) => {
            canvas.gap(4.0);
            canvas.line(15.0, title, true, ACCENT, Anchor::Start);
        }
        Block::FieldGrid(items) => canvas.labeled(12.0, items),
        Block::ExamInfo { title, description } => {
            canvas.paragraph(16.0, title, true, TEXT, Anchor::Start);
            canvas.paragraph(12.0, description, false, MUTED, Anchor::Start);
        }
        Block::Results(items) => {
            canvas.line(13.0, "Resultados", true, TEXT, Anchor::Start);
            canvas.labeled(12.0, items);
        }
        Block::Observations(items) => {
            for item in items {
                canvas.line(13.0, &item.label, true, TEXT, Anchor::Start);
                canvas.paragraph(12.0, &item.value, false, TEXT, Anchor::Start);
            }
        }
        Block::AttachmentIndicator(count) => canvas.line(
            11.0,
            &format!("{count} anexo(s) - Ver próximas páginas para visualizar"),
            false,
            MUTED,
            Anchor::Start,
        ),
        Block::Conclusion {
            statement,
            exam_conclusion,
        } => {
            canvas.paragraph(12.0, statement, false, TEXT, Anchor::Start);
            if let Some(text) = exam_conclusion {
                canvas.line(12.0, "Conclusão do Exame:", true, TEXT, Anchor::Start);
                canvas.paragraph(12.0, text, false, TEXT, Anchor::Start);
            }
        }
        Block::Signature(image) => match image.as_ref().and_then(embeddable_image) {
            Some(src) => canvas.image(src, SIGNATURE_BOX.0, SIGNATURE_BOX.1),
            None => {
                canvas.gap(SIGNATURE_BOX.1 / 2.0 - 12.0);
                canvas.line(12.0, "Assinatura não disponível", false, MUTED, Anchor::Middle);
                canvas.gap(SIGNATURE_BOX.1 / 2.0 - 12.0);
            }
        },
        Block::ProfessionalInfo {
            name,
            registration,
            date_time,
        } => {
            canvas.line(13.0, name, true, TEXT, Anchor::Middle);
            canvas.line(12.0, registration, false, TEXT, Anchor::Middle);
            canvas.line(12.0, date_time, false, MUTED, Anchor::Middle);
        }
        Block::FooterNotes(notes) => {
            for note in notes {
                canvas.paragraph(10.0, note, false, MUTED, Anchor::Middle);
            }
        }
        Block::AttachmentTitle(title) => {
            canvas.paragraph(15.0, title, true, ACCENT, Anchor::Start);
            canvas.gap(6.0);
        }
        Block::AttachmentImage { image, alt } => match embeddable_image(image) {
            Some(src) => {
                let height = (canvas.bottom - canvas.y - ATTACHMENT_RESERVE).max(50.0);
                let width = canvas.width;
                canvas.image(src, width, height);
            }
            None => canvas.line(12.0, alt, false, MUTED, Anchor::Middle),
        },
        Block::AttachmentCaption(caption) => {
            canvas.paragraph(11.0, caption, false, MUTED, Anchor::Middle)
        }
    }
}

/// Greedy word wrap at `max_chars` characters. Explicit newlines are kept and words longer than
/// a line are split.
pub fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut lines = Vec::new();
    for raw_line in text.lines() {
        let mut current = String::new();
        let mut current_len = 0;
        for word in raw_line.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();
            while word.len() > max_chars {
                if current_len > 0 {
                    lines.push(std::mem::take(&mut current));
                    current_len = 0;
                }
                let rest = word.split_off(max_chars);
                lines.push(word.into_iter().collect());
                word = rest;
            }
            let needed = if current_len == 0 {
                word.len()
            } else {
                current_len + 1 + word.len()
            };
            if needed > max_chars && current_len > 0 {
                lines.push(std::mem::take(&mut current));
                current_len = 0;
            }
            if current_len > 0 {
                current.push(' ');
                current_len += 1;
            }
            current_len += word.len();
            current.extend(word);
        }
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}
