//! Constants used throughout the laudo core crate.
//!
//! Storage keys, defaults and layout dimensions live here so that the hosts and the tests agree
//! on them.

/// Store key holding the JSON-encoded draft.
pub const DRAFT_KEY: &str = "laudoDraft";

/// Store key holding the bare sequence counter.
pub const COUNTER_KEY: &str = "ultimoNumeroExame";

/// Counter value used when nothing has been persisted yet.
pub const DEFAULT_COUNTER_BASELINE: u64 = 1000;

/// Drafts keep at most this many attachments.
pub const MAX_DRAFT_ATTACHMENTS: usize = 10;

pub const DEFAULT_AUTOSAVE_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_SAVE_STATUS_WINDOW_MS: u64 = 1000;
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 500;

/// Default directory for the key-value store when no explicit directory is configured.
pub const DEFAULT_DATA_DIR: &str = "laudo_data";

/// Default location of the exam catalog document.
pub const DEFAULT_CATALOG_PATH: &str = "assets/exames.json";

/// Default directory receiving exported PNG files.
pub const DEFAULT_EXPORT_DIR: &str = "exports";

pub const DEFAULT_INSTITUTION: &str = "Hospital São Rafael";
pub const DEFAULT_SUBTITLE: &str = "Sistema de Laudos Digitais";

/// Identity document type shown when none was chosen.
pub const DEFAULT_DOCUMENT_TYPE: &str = "Passaporte";

/// Category id that selects every exam.
pub const ALL_CATEGORIES: &str = "todos";

/// Field id whose value is echoed in the conclusion block.
pub const CONCLUSION_FIELD_ID: &str = "conclusao";

/// A4 width in millimetres.
pub const PAGE_WIDTH_MM: f32 = 210.0;
/// A4 height in millimetres.
pub const PAGE_HEIGHT_MM: f32 = 297.0;
/// Pixels per millimetre at 96 DPI.
pub const PX_PER_MM: f32 = 3.78;
pub const PAGE_PADDING_MM: f32 = 8.0;
/// Raster output is this many times the layout size.
pub const RASTER_SCALE: f32 = 2.0;
