//! Raster export of report pages.
//!
//! Export checks its preconditions before any rendering, forces the main page, waits the settle
//! delay, rasterizes the page SVG and writes the PNG into the export directory. The bitmap is the
//! page width; its height follows the content.

use crate::config::{Branding, CoreConfig, PageGeometry};
use crate::pagination::{go_to_page, total_pages};
use crate::preview::layout::layout_page;
use crate::preview::svg::{render_svg, PageSvg};
use crate::state::ReportState;
use crate::{LaudoError, LaudoResult};
use resvg::{tiny_skia, usvg};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const PATIENT_NAME_MAX_CHARS: usize = 30;
const EXAM_NAME_MAX_CHARS: usize = 20;

/// An encoded PNG and its pixel size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterImage {
    pub width: u32,
    pub height: u32,
    pub png: Vec<u8>,
}

/// Turns a page SVG into a PNG at `scale` times its layout size.
pub trait Rasterizer: Send + Sync {
    fn rasterize(&self, page: &PageSvg, scale: f32) -> LaudoResult<RasterImage>;
}

/// [`Rasterizer`] backed by resvg, using the system fonts.
pub struct SvgRasterizer {
    fontdb: Arc<usvg::fontdb::Database>,
}

impl Default for SvgRasterizer {
    fn default() -> Self {
        Self::new()
    }
}

impl SvgRasterizer {
    pub fn new() -> Self {
        let mut fontdb = usvg::fontdb::Database::new();
        fontdb.load_system_fonts();
        tracing::debug!(faces = fontdb.len(), "loaded system fonts");
        Self {
            fontdb: Arc::new(fontdb),
        }
    }
}

impl Rasterizer for SvgRasterizer {
    fn rasterize(&self, page: &PageSvg, scale: f32) -> LaudoResult<RasterImage> {
        let options = usvg::Options {
            fontdb: Arc::clone(&self.fontdb),
            ..Default::default()
        };
        let tree = usvg::Tree::from_str(&page.markup, &options)
            .map_err(|e| LaudoError::Render(format!("invalid page svg: {e}")))?;

        let (width, height) = page.raster_size(scale);
        let mut pixmap = tiny_skia::Pixmap::new(width, height).ok_or_else(|| {
            LaudoError::Render(format!("cannot allocate a {width}x{height} render target"))
        })?;
        pixmap.fill(tiny_skia::Color::WHITE);
        resvg::render(
            &tree,
            tiny_skia::Transform::from_scale(scale, scale),
            &mut pixmap.as_mut(),
        );

        // The background is opaque, so premultiplied and straight alpha coincide.
        let rgba = image::RgbaImage::from_raw(width, height, pixmap.take())
            .ok_or_else(|| LaudoError::Render("render target size mismatch".into()))?;
        let mut png = Cursor::new(Vec::new());
        rgba.write_to(&mut png, image::ImageFormat::Png)
            .map_err(|e| LaudoError::Render(format!("png encoding failed: {e}")))?;

        Ok(RasterImage {
            width,
            height,
            png: png.into_inner(),
        })
    }
}

/// A PNG written by the exporter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedFile {
    pub path: PathBuf,
    pub page: usize,
    pub width: u32,
    pub height: u32,
}

impl ExportedFile {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

pub struct ExportPipeline {
    rasterizer: Arc<dyn Rasterizer>,
    export_dir: PathBuf,
    settle_delay: Duration,
    page: PageGeometry,
    branding: Branding,
}

impl ExportPipeline {
    pub fn new(rasterizer: Arc<dyn Rasterizer>, config: &CoreConfig) -> Self {
        Self {
            rasterizer,
            export_dir: config.export_dir().to_path_buf(),
            settle_delay: config.settle_delay(),
            page: *config.page(),
            branding: config.branding().clone(),
        }
    }

    pub fn export_dir(&self) -> &Path {
        &self.export_dir
    }

    /// Checks the export preconditions in order: patient name, professional name, exam.
    ///
    /// # Errors
    ///
    /// Returns `LaudoError::Validation` with the message to show for the first unmet one.
    pub fn validate(state: &ReportState) -> LaudoResult<()> {
        if !state.patient().has_name() {
            return Err(LaudoError::Validation("Preencha o nome do paciente".into()));
        }
        if !state.professional().has_name() {
            return Err(LaudoError::Validation(
                "Preencha o nome do profissional".into(),
            ));
        }
        if state.current_exam().is_none() {
            return Err(LaudoError::Validation("Selecione um exame".into()));
        }
        Ok(())
    }

    /// Exports the main page, whatever page is being viewed.
    ///
    /// # Errors
    ///
    /// `Validation` when a precondition fails (nothing is rendered); `Render` or `Storage` when
    /// rasterizing or writing fails. Only the current page changes.
    pub async fn export(&self, state: &mut ReportState) -> LaudoResult<ExportedFile> {
        Self::validate(state)?;
        go_to_page(state, 0);
        let file_name = export_file_name(state, chrono::Utc::now().timestamp_millis(), None);
        self.capture(state, 0, file_name).await
    }

    /// Exports every page in order, as `..._p<N>.png`, then returns to the main page.
    ///
    /// # Errors
    ///
    /// Stops at the first page that fails; files already written are kept.
    pub async fn export_all_pages(&self, state: &mut ReportState) -> LaudoResult<Vec<ExportedFile>> {
        Self::validate(state)?;
        let stamp = chrono::Utc::now().timestamp_millis();
        let mut written = Vec::new();
        let mut failure = None;

        for page in 0..total_pages(state) {
            go_to_page(state, page as isize);
            let file_name = export_file_name(state, stamp, Some(page + 1));
            match self.capture(state, page, file_name).await {
                Ok(file) => written.push(file),
                Err(e) => {
                    tracing::error!(page = page + 1, "batch export stopped: {}", e);
                    failure = Some(LaudoError::Render(format!(
                        "failed to export page {}: {}",
                        page + 1,
                        e
                    )));
                    break;
                }
            }
        }

        go_to_page(state, 0);
        match failure {
            Some(err) => Err(err),
            None => {
                tracing::info!(pages = written.len(), "batch export finished");
                Ok(written)
            }
        }
    }

    async fn capture(
        &self,
        state: &ReportState,
        page: usize,
        file_name: String,
    ) -> LaudoResult<ExportedFile> {
        let layout = layout_page(state, &self.branding, page)
            .ok_or_else(|| LaudoError::Render(format!("page {page} does not exist")))?;
        let svg = render_svg(&layout, &self.page);

        if !self.settle_delay.is_zero() {
            tokio::time::sleep(self.settle_delay).await;
        }

        let rasterizer = Arc::clone(&self.rasterizer);
        let scale = self.page.raster_scale;
        let path = self.export_dir.join(file_name);
        let export_dir = self.export_dir.clone();

        let file = tokio::task::spawn_blocking(move || -> LaudoResult<ExportedFile> {
            let image = rasterizer.rasterize(&svg, scale)?;
            if image.width == 0 || image.height == 0 || image.png.is_empty() {
                return Err(LaudoError::Render("rasterizer produced an empty image".into()));
            }
            std::fs::create_dir_all(&export_dir).map_err(LaudoError::Storage)?;
            std::fs::write(&path, &image.png).map_err(LaudoError::Storage)?;
            Ok(ExportedFile {
                path,
                page,
                width: image.width,
                height: image.height,
            })
        })
        .await
        .map_err(|e| LaudoError::Render(format!("export task failed: {e}")))??;

        tracing::info!(path = %file.path.display(), page, "page exported");
        Ok(file)
    }
}

/// `Laudo_<patient>_<exam>_<millis>[_p<N>].png`
pub fn export_file_name(state: &ReportState, millis: i64, page: Option<usize>) -> String {
    let patient = sanitize_component(&state.patient().name, PATIENT_NAME_MAX_CHARS, "Paciente");
    let exam = sanitize_component(
        state.current_exam().map(|e| e.name.as_str()).unwrap_or(""),
        EXAM_NAME_MAX_CHARS,
        "Exame",
    );
    match page {
        Some(n) => format!("Laudo_{patient}_{exam}_{millis}_p{n}.png"),
        None => format!("Laudo_{patient}_{exam}_{millis}.png"),
    }
}

/// Whitespace runs become `_`; anything but letters, digits, `-`, `_` and `.` is dropped.
pub fn sanitize_component(text: &str, max_chars: usize, fallback: &str) -> String {
    let joined = text.split_whitespace().collect::<Vec<_>>().join("_");
    let cleaned: String = joined
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.'))
        .take(max_chars)
        .collect();
    if cleaned.is_empty() {
        fallback.to_string()
    } else {
        cleaned
    }
}
