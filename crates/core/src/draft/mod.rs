//! Draft persistence.
//!
//! - [`codec`]: the stored record and its JSON encoding (schema, legacy keys, decode errors).
//! - [`manager`]: saving, startup detection and the staged restoration sequence.

pub mod codec;
pub mod manager;

pub use codec::Draft;
pub use manager::{DraftManager, RestoreReport, RestoreStep, StepOutcome};
