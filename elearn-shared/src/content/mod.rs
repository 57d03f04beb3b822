/// Content rendering
///
/// - `markdown`: lesson and course Markdown to sanitized HTML
/// - `certificate_pdf`: landscape A4 certificate documents

pub mod certificate_pdf;
pub mod markdown;

/// Rendering failures
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("PDF rendering failed: {0}")]
    Pdf(String),
}
