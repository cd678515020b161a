//! CSV export of stored index data.
//!
//! An `ExportBundle` collects performance, dated composition rows and
//! composition changes for a range; each `ExportSheet` renders to its own
//! CSV document.

pub mod bundle;
pub mod error;

pub use bundle::{ExportBundle, ExportSheet};
pub use error::ExportError;
