/// Certificate PDF rendering
///
/// Produces a single landscape A4 page using the PDF built-in Helvetica
/// family, so no font files ship with the binary.
///
/// ```text
/// ┌─────────────────────────────────────────────┐
/// │  INSTITUTION                                │
/// │          CERTIFICATE OF COMPLETION          │
/// │              Student Name                   │
/// │   has successfully completed the course     │
/// │               Course Title                  │
/// │  Date ............ Instructor ..............│
/// │  Verification code: IFRI-1A2B-3C4D          │
/// └─────────────────────────────────────────────┘
/// ```

use chrono::{DateTime, Utc};
use printpdf::{
    BuiltinFont, Color, IndirectFontRef, Line, Mm, PdfDocument, PdfLayerReference, Point, Rgb,
};

use super::RenderError;

const PAGE_WIDTH: f32 = 297.0;
const PAGE_HEIGHT: f32 = 210.0;

/// Average Helvetica glyph width as a fraction of the font size
const GLYPH_WIDTH_RATIO: f32 = 0.5;

/// Everything printed on a certificate
#[derive(Debug, Clone)]
pub struct CertificateDocument {
    pub institution: String,
    pub student_name: String,
    pub course_title: String,
    pub instructor_name: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub verification_code: String,
}

/// Renders the certificate to PDF bytes
///
/// # Errors
///
/// Returns `RenderError::Pdf` if printpdf fails to load a font or serialize.
pub fn render_certificate(doc: &CertificateDocument) -> Result<Vec<u8>, RenderError> {
    let title = format!("Certificate - {}", doc.course_title);
    let (pdf, page, layer) =
        PdfDocument::new(title, Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Certificate");

    let regular = pdf
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| RenderError::Pdf(e.to_string()))?;
    let bold = pdf
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|e| RenderError::Pdf(e.to_string()))?;
    let oblique = pdf
        .add_builtin_font(BuiltinFont::HelveticaOblique)
        .map_err(|e| RenderError::Pdf(e.to_string()))?;

    let layer = pdf.get_page(page).get_layer(layer);

    draw_frame(&layer);

    let navy = Color::Rgb(Rgb::new(0.07, 0.20, 0.40, None));
    let gold = Color::Rgb(Rgb::new(0.72, 0.55, 0.15, None));
    let ink = Color::Rgb(Rgb::new(0.15, 0.15, 0.15, None));

    layer.set_fill_color(navy.clone());
    centered(&layer, &doc.institution.to_uppercase(), 14.0, 180.0, &bold);

    layer.set_fill_color(gold);
    centered(&layer, "CERTIFICATE OF COMPLETION", 30.0, 155.0, &bold);

    layer.set_fill_color(ink.clone());
    centered(&layer, "This certifies that", 13.0, 135.0, &oblique);

    layer.set_fill_color(navy);
    centered(&layer, &doc.student_name, 28.0, 118.0, &bold);

    layer.set_fill_color(ink.clone());
    centered(&layer, "has successfully completed the course", 13.0, 102.0, &oblique);

    let mut y = 86.0;
    for line in wrap_text(&doc.course_title, 22.0, PAGE_WIDTH - 70.0) {
        centered(&layer, &line, 22.0, y, &bold);
        y -= 10.0;
    }

    layer.set_fill_color(ink);
    let date = doc.issued_at.format("%d %B %Y").to_string();
    layer.use_text(format!("Date: {}", date), 12.0, Mm(35.0), Mm(42.0), &regular);

    if let Some(instructor) = doc.instructor_name.as_deref().filter(|n| !n.trim().is_empty()) {
        let label = format!("Instructor: {}", instructor.trim());
        let x = PAGE_WIDTH - 35.0 - text_width(&label, 12.0);
        layer.use_text(label, 12.0, Mm(x), Mm(42.0), &regular);
    }

    centered(
        &layer,
        &format!("Verification code: {}", doc.verification_code),
        10.0,
        24.0,
        &regular,
    );

    pdf.save_to_bytes().map_err(|e| RenderError::Pdf(e.to_string()))
}

/// Double border around the page
fn draw_frame(layer: &PdfLayerReference) {
    layer.set_outline_color(Color::Rgb(Rgb::new(0.07, 0.20, 0.40, None)));

    for (inset, thickness) in [(10.0_f32, 2.0_f32), (14.0, 0.75)] {
        layer.set_outline_thickness(thickness);
        let points = vec![
            (Point::new(Mm(inset), Mm(inset)), false),
            (Point::new(Mm(PAGE_WIDTH - inset), Mm(inset)), false),
            (Point::new(Mm(PAGE_WIDTH - inset), Mm(PAGE_HEIGHT - inset)), false),
            (Point::new(Mm(inset), Mm(PAGE_HEIGHT - inset)), false),
        ];
        layer.add_line(Line {
            points,
            is_closed: true,
        });
    }
}

/// Approximate rendered width in millimetres
fn text_width(text: &str, font_size: f32) -> f32 {
    // 1pt = 0.3528mm
    text.chars().count() as f32 * font_size * GLYPH_WIDTH_RATIO * 0.3528
}

fn centered(layer: &PdfLayerReference, text: &str, font_size: f32, y: f32, font: &IndirectFontRef) {
    let x = ((PAGE_WIDTH - text_width(text, font_size)) / 2.0).max(15.0);
    layer.use_text(text, font_size, Mm(x), Mm(y), font);
}

/// Greedy word wrap to a maximum width in millimetres
fn wrap_text(text: &str, font_size: f32, max_width: f32) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{} {}", current, word)
        };

        if text_width(&candidate, font_size) > max_width && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
            current = word.to_string();
        } else {
            current = candidate;
        }
    }

    if !current.is_empty() {
        lines.push(current);
    }
    lines
}
