//! PDF export
//!
//! A4 pages set in the built-in Helvetica faces. Each major section starts
//! on a new page; long paragraphs wrap on word boundaries.

use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference, PdfLayerReference};

use super::requirements::BrdRequirements;
use crate::error::AppError;

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN: f32 = 20.0;

/// Points to millimetres
const PT_TO_MM: f32 = 0.3528;
/// Average Helvetica glyph width relative to the font size
const AVG_GLYPH_WIDTH: f32 = 0.5;

/// Render requirements as a PDF document
pub fn to_pdf(requirements: &BrdRequirements) -> Result<Vec<u8>, AppError> {
    let mut writer = PdfWriter::new("Requirements Document")?;

    writer.text("Requirements Document", 20.0, true);
    writer.gap(5.0);

    if let Some(metadata) = &requirements.metadata {
        writer.text(&format!("Document: {}", metadata.document_name), 10.0, false);
        writer.text(&format!("Processed: {}", metadata.processed_at), 10.0, false);
        writer.text(
            &format!("Total Requirements: {}", metadata.total_requirements),
            10.0,
            false,
        );
        writer.gap(10.0);
    }

    writer.text("Business Requirements Summary", 16.0, true);
    let summary = requirements.business_requirements_summary.trim();
    writer.text(
        if summary.is_empty() { "No summary available." } else { summary },
        11.0,
        false,
    );

    if !requirements.functional_requirements.is_empty() {
        writer.section("Functional Requirements");
        for (idx, req) in requirements.functional_requirements.iter().enumerate() {
            writer.text(&format!("{}. {}", idx + 1, req.title), 12.0, true);
            writer.text(&req.description, 11.0, false);
            if let Some(priority) = &req.priority {
                writer.text(&format!("Priority: {}", priority), 10.0, false);
            }
            writer.gap(5.0);
        }
    }

    if !requirements.non_functional_requirements.is_empty() {
        writer.section("Non-Functional Requirements");
        for (idx, req) in requirements.non_functional_requirements.iter().enumerate() {
            writer.text(&format!("{}. {} ({})", idx + 1, req.title, req.kind), 12.0, true);
            writer.text(&req.description, 11.0, false);
            writer.gap(5.0);
        }
    }

    if !requirements.frontend_requirements.is_empty() {
        writer.section("Frontend Requirements");
        for (idx, req) in requirements.frontend_requirements.iter().enumerate() {
            writer.text(&format!("{}. {}", idx + 1, req.title), 12.0, true);
            writer.text(&req.description, 11.0, false);
            for (label, value) in [
                ("Component", &req.component),
                ("Page", &req.page),
                ("Technology", &req.technology),
            ] {
                if let Some(value) = value {
                    writer.text(&format!("{}: {}", label, value), 10.0, false);
                }
            }
            writer.gap(5.0);
        }
    }

    if !requirements.user_stories.is_empty() {
        writer.section("User Stories");
        for (idx, story) in requirements.user_stories.iter().enumerate() {
            writer.text(&format!("{}. {}", idx + 1, story.story), 12.0, true);
            writer.text("Acceptance Criteria:", 11.0, true);
            for criterion in &story.acceptance_criteria {
                writer.text(&format!("  - {}", criterion), 10.0, false);
            }
            if !story.frontend_tasks.is_empty() {
                writer.text("Frontend Tasks:", 11.0, true);
                for task in &story.frontend_tasks {
                    writer.text(&format!("  - {}", task), 10.0, false);
                }
            }
            writer.gap(5.0);
        }
    }

    if !requirements.task_breakdown.is_empty() {
        writer.section("Task Breakdown");
        for (idx, task) in requirements.task_breakdown.iter().enumerate() {
            writer.text(&format!("{}. {}", idx + 1, task.title), 12.0, true);
            writer.text(&task.description, 11.0, false);
            writer.text(&format!("Priority: {}", task.priority), 10.0, false);
            if let Some(hours) = task.estimated_hours.as_ref().filter(|h| h.as_f64() > Some(0.0)) {
                writer.text(&format!("Estimated Hours: {}h", hours), 10.0, false);
            }
            if let Some(component) = &task.frontend_component {
                writer.text(&format!("Component: {}", component), 10.0, false);
            }
            writer.gap(5.0);
        }
    }

    writer.finish()
}

struct PdfWriter {
    doc: PdfDocumentReference,
    layer: PdfLayerReference,
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    /// Distance from the top edge, in mm
    cursor: f32,
}

impl PdfWriter {
    fn new(title: &str) -> Result<Self, AppError> {
        let (doc, page, layer) =
            PdfDocument::new(title, Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
        let regular = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(pdf_error)?;
        let bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(pdf_error)?;
        let layer = doc.get_page(page).get_layer(layer);
        Ok(Self {
            doc,
            layer,
            regular,
            bold,
            cursor: MARGIN,
        })
    }

    fn new_page(&mut self) {
        let (page, layer) = self
            .doc
            .add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
        self.layer = self.doc.get_page(page).get_layer(layer);
        self.cursor = MARGIN;
    }

    fn section(&mut self, heading: &str) {
        self.new_page();
        self.text(heading, 16.0, true);
    }

    fn gap(&mut self, mm: f32) {
        self.cursor += mm;
    }

    fn text(&mut self, text: &str, size: f32, bold: bool) {
        let line_height = size * 0.4;
        let lines = wrap(&to_latin(text), chars_per_line(size));
        if self.cursor + lines.len() as f32 * line_height > PAGE_HEIGHT - MARGIN {
            self.new_page();
        }

        let font = if bold { self.bold.clone() } else { self.regular.clone() };
        for line in lines {
            self.cursor += line_height;
            self.layer.use_text(
                line,
                size,
                Mm(MARGIN),
                Mm(PAGE_HEIGHT - self.cursor),
                &font,
            );
            if self.cursor > PAGE_HEIGHT - MARGIN {
                self.new_page();
            }
        }
        self.cursor += 5.0;
    }

    fn finish(self) -> Result<Vec<u8>, AppError> {
        self.doc.save_to_bytes().map_err(pdf_error)
    }
}

fn pdf_error(e: impl std::fmt::Debug) -> AppError {
    AppError::Internal(anyhow::anyhow!("PDF rendering failed: {:?}", e))
}

fn chars_per_line(size: f32) -> usize {
    let glyph = size * PT_TO_MM * AVG_GLYPH_WIDTH;
    (((PAGE_WIDTH - 2.0 * MARGIN) / glyph) as usize).max(10)
}

/// The built-in faces only cover Latin-1
fn to_latin(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{2018}' | '\u{2019}' => '\'',
            '\u{201C}' | '\u{201D}' => '"',
            '\u{2013}' | '\u{2014}' => '-',
            '\u{2022}' => '-',
            '\t' | '\n' | '\r' => ' ',
            c if (c as u32) < 0x20 => ' ',
            c if (c as u32) <= 0xFF => c,
            _ => '?',
        })
        .collect()
}

/// Greedy word wrap; words longer than a line are split
fn wrap(text: &str, width: usize) -> Vec<String> {
    let indent: String = text.chars().take_while(|c| *c == ' ').collect();
    let mut lines = Vec::new();
    let mut current = indent.clone();

    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > width {
            if !current.trim().is_empty() {
                lines.push(std::mem::replace(&mut current, indent.clone()));
            }
            let rest = word.split_off(width);
            lines.push(word.into_iter().collect());
            word = rest;
        }

        let needed = current.chars().count() + usize::from(!current.trim().is_empty()) + word.len();
        if !current.trim().is_empty() && needed > width {
            lines.push(std::mem::replace(&mut current, indent.clone()));
        }
        if !current.trim().is_empty() {
            current.push(' ');
        }
        current.extend(word);
    }

    if !current.trim().is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}
