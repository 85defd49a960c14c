//! Human-readable reports and JSON export documents.
//!
//! - [`text`]: stream comparison, detection summary, confidence histogram and
//!   correlation reports.
//! - [`export`]: serialisable documents plus [`write_json`].

pub mod export;
pub mod text;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use export::{
    correlation_document, export_document, write_json, CorrelationExport, ExportDocument,
    StreamExport,
};
pub use text::{
    render_comparison, render_confidence_histogram, render_correlation, render_detection_summary,
};

// ---------------------------------------------------------------------------
// Test fixtures
// ---------------------------------------------------------------------------
