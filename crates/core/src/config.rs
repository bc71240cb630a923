//! Core runtime configuration.
//!
//! This module defines configuration that should be resolved once at process startup and then
//! passed into core services. The environment is only read by [`CoreConfig::from_env`], which
//! the binaries call before anything else runs.

use crate::constants::{
    DEFAULT_AUTOSAVE_INTERVAL_SECS, DEFAULT_CATALOG_PATH, DEFAULT_COUNTER_BASELINE,
    DEFAULT_DATA_DIR, DEFAULT_EXPORT_DIR, DEFAULT_INSTITUTION, DEFAULT_SAVE_STATUS_WINDOW_MS,
    DEFAULT_SETTLE_DELAY_MS, DEFAULT_SUBTITLE, MAX_DRAFT_ATTACHMENTS, PAGE_HEIGHT_MM,
    PAGE_PADDING_MM, PAGE_WIDTH_MM, PX_PER_MM, RASTER_SCALE,
};
use crate::{LaudoError, LaudoResult};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Physical page size and the pixel ratio used to lay it out.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PageGeometry {
    pub width_mm: f32,
    pub height_mm: f32,
    pub px_per_mm: f32,
    pub padding_mm: f32,
    pub raster_scale: f32,
}

impl Default for PageGeometry {
    fn default() -> Self {
        Self {
            width_mm: PAGE_WIDTH_MM,
            height_mm: PAGE_HEIGHT_MM,
            px_per_mm: PX_PER_MM,
            padding_mm: PAGE_PADDING_MM,
            raster_scale: RASTER_SCALE,
        }
    }
}

impl PageGeometry {
    /// Layout width in pixels (794 for A4).
    pub fn width_px(&self) -> u32 {
        (self.width_mm * self.px_per_mm).round() as u32
    }

    /// Layout height in pixels (1123 for A4).
    pub fn height_px(&self) -> u32 {
        (self.height_mm * self.px_per_mm).round() as u32
    }

    pub fn padding_px(&self) -> f32 {
        self.padding_mm * self.px_per_mm
    }
}

/// Institution name and subtitle printed in page headers and footers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Branding {
    institution: String,
    subtitle: String,
}

impl Default for Branding {
    fn default() -> Self {
        Self {
            institution: DEFAULT_INSTITUTION.to_string(),
            subtitle: DEFAULT_SUBTITLE.to_string(),
        }
    }
}

impl Branding {
    pub fn new(institution: impl Into<String>, subtitle: impl Into<String>) -> LaudoResult<Self> {
        let institution = institution.into();
        if institution.trim().is_empty() {
            return Err(LaudoError::Config("institution cannot be empty".into()));
        }
        Ok(Self {
            institution,
            subtitle: subtitle.into(),
        })
    }

    pub fn institution(&self) -> &str {
        &self.institution
    }

    pub fn subtitle(&self) -> &str {
        &self.subtitle
    }
}

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    data_dir: PathBuf,
    catalog_path: PathBuf,
    export_dir: PathBuf,
    autosave_interval: Duration,
    save_status_window: Duration,
    settle_delay: Duration,
    counter_baseline: u64,
    max_draft_attachments: usize,
    page: PageGeometry,
    branding: Branding,
}

impl CoreConfig {
    /// Create a new `CoreConfig` with default timings, geometry and branding.
    ///
    /// # Errors
    ///
    /// Returns `LaudoError::Config` if any of the paths is empty.
    pub fn new(data_dir: PathBuf, catalog_path: PathBuf, export_dir: PathBuf) -> LaudoResult<Self> {
        for (name, path) in [
            ("data_dir", &data_dir),
            ("catalog_path", &catalog_path),
            ("export_dir", &export_dir),
        ] {
            if path.as_os_str().is_empty() {
                return Err(LaudoError::Config(format!("{name} cannot be empty")));
            }
        }

        Ok(Self {
            data_dir,
            catalog_path,
            export_dir,
            autosave_interval: Duration::from_secs(DEFAULT_AUTOSAVE_INTERVAL_SECS),
            save_status_window: Duration::from_millis(DEFAULT_SAVE_STATUS_WINDOW_MS),
            settle_delay: Duration::from_millis(DEFAULT_SETTLE_DELAY_MS),
            counter_baseline: DEFAULT_COUNTER_BASELINE,
            max_draft_attachments: MAX_DRAFT_ATTACHMENTS,
            page: PageGeometry::default(),
            branding: Branding::default(),
        })
    }

    /// Resolve configuration from `LAUDO_*` environment variables.
    ///
    /// Unset variables fall back to the defaults in [`crate::constants`].
    ///
    /// # Errors
    ///
    /// Returns `LaudoError::Config` if a variable is set to an unparseable or out-of-range value.
    pub fn from_env() -> LaudoResult<Self> {
        let var = |name: &str| std::env::var(name).ok();

        let config = Self::new(
            path_from_env_value(var("LAUDO_DATA_DIR"), DEFAULT_DATA_DIR),
            path_from_env_value(var("LAUDO_CATALOG"), DEFAULT_CATALOG_PATH),
            path_from_env_value(var("LAUDO_EXPORT_DIR"), DEFAULT_EXPORT_DIR),
        )?
        .with_autosave_interval(Duration::from_secs(u64_from_env_value(
            "LAUDO_AUTOSAVE_SECS",
            var("LAUDO_AUTOSAVE_SECS"),
            DEFAULT_AUTOSAVE_INTERVAL_SECS,
        )?))?
        .with_settle_delay(Duration::from_millis(u64_from_env_value(
            "LAUDO_SETTLE_MS",
            var("LAUDO_SETTLE_MS"),
            DEFAULT_SETTLE_DELAY_MS,
        )?));

        match var("LAUDO_INSTITUTION").filter(|v| !v.trim().is_empty()) {
            Some(institution) => Ok(config.with_branding(Branding::new(
                institution.trim(),
                DEFAULT_SUBTITLE,
            )?)),
            None => Ok(config),
        }
    }

    /// # Errors
    ///
    /// Returns `LaudoError::Config` if `interval` is zero.
    pub fn with_autosave_interval(mut self, interval: Duration) -> LaudoResult<Self> {
        if interval.is_zero() {
            return Err(LaudoError::Config(
                "autosave interval must be greater than zero".into(),
            ));
        }
        self.autosave_interval = interval;
        Ok(self)
    }

    pub fn with_save_status_window(mut self, window: Duration) -> Self {
        self.save_status_window = window;
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn with_counter_baseline(mut self, baseline: u64) -> Self {
        self.counter_baseline = baseline;
        self
    }

    pub fn with_branding(mut self, branding: Branding) -> Self {
        self.branding = branding;
        self
    }

    pub fn with_page(mut self, page: PageGeometry) -> Self {
        self.page = page;
        self
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn catalog_path(&self) -> &Path {
        &self.catalog_path
    }

    pub fn export_dir(&self) -> &Path {
        &self.export_dir
    }

    pub fn autosave_interval(&self) -> Duration {
        self.autosave_interval
    }

    pub fn save_status_window(&self) -> Duration {
        self.save_status_window
    }

    pub fn settle_delay(&self) -> Duration {
        self.settle_delay
    }

    pub fn counter_baseline(&self) -> u64 {
        self.counter_baseline
    }

    pub fn max_draft_attachments(&self) -> usize {
        self.max_draft_attachments
    }

    pub fn page(&self) -> &PageGeometry {
        &self.page
    }

    pub fn branding(&self) -> &Branding {
        &self.branding
    }
}

/// Use `value` as a path unless it is unset or blank.
pub fn path_from_env_value(value: Option<String>, default: &str) -> PathBuf {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(default))
}

/// Parse an unsigned integer from an optional environment value.
///
/// If `value` is `None` or empty/whitespace, returns `default`.
pub fn u64_from_env_value(name: &str, value: Option<String>, default: u64) -> LaudoResult<u64> {
    let value = value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());
    match value {
        Some(v) => v
            .parse::<u64>()
            .map_err(|e| LaudoError::Config(format!("{name}={v:?}: {e}"))),
        None => Ok(default),
    }
}
