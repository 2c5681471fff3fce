use std::time::Instant;

use printpdf::{
    BuiltinFont, ColorBits, ColorSpace, Image, ImageTransform, ImageXObject, IndirectFontRef, Mm,
    PdfDocument, PdfDocumentReference, PdfLayerReference, Px,
};

use crate::chart::{self, ChartImage};
use crate::error::{ReportError, Result};
use crate::models::SurveyMetrics;
use crate::risk::{DmfCounts, RiskAssessment};

pub const DOCUMENT_TITLE: &str = "Laporan Survey IDCRA";

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN_LEFT: f32 = 15.0;
const MARGIN_TOP: f32 = 15.0;
const MARGIN_RIGHT: f32 = 10.0;
const MARGIN_BOTTOM: f32 = 15.0;
const CONTENT_WIDTH: f32 = PAGE_WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
const LABEL_WIDTH: f32 = CONTENT_WIDTH * 3.0 / 12.0;
const CHART_ROW_HEIGHT: f32 = 45.0;
const BODY_SIZE: f32 = 10.0;
const BULLET: &str = "- ";

/// Average Helvetica glyph advance as a fraction of the point size.
const AVG_GLYPH_EM: f32 = 0.5;
const PT_TO_MM: f32 = 0.3528;

#[derive(Clone, Copy, PartialEq)]
enum Align {
    Left,
    Center,
}

#[derive(Clone, Copy)]
struct ChartRenderers {
    percentage: fn(f64) -> Result<ChartImage>,
    dmf: fn(&DmfCounts) -> Result<ChartImage>,
}

const PLOTTED: ChartRenderers = ChartRenderers {
    percentage: chart::risk_percentage_chart,
    dmf: chart::dmf_chart,
};

struct Composed {
    bytes: Vec<u8>,
    pages: usize,
    images: usize,
    /// Page number and content of every text run, in writing order.
    placed: Vec<(usize, String)>,
}

/// Composes a student's risk report into PDF bytes.
///
/// Sections are emitted in a fixed order: title, identity, charts, operator,
/// parent and teacher suggestions. Content that does not fit flows onto a
/// fresh A4 page.
pub fn compose(assessment: &RiskAssessment, metrics: &SurveyMetrics) -> Result<Vec<u8>> {
    let begin = Instant::now();
    let composed = lay_out(assessment, metrics, PLOTTED)?;
    tracing::debug!(
        student = %metrics.student_name,
        pages = composed.pages,
        images = composed.images,
        text_runs = composed.placed.len(),
        bytes = composed.bytes.len(),
        elapsed_ms = begin.elapsed().as_millis() as u64,
        "composed report document"
    );
    Ok(composed.bytes)
}

fn lay_out(
    assessment: &RiskAssessment,
    metrics: &SurveyMetrics,
    charts: ChartRenderers,
) -> Result<Composed> {
    let mut page = PageWriter::new(DOCUMENT_TITLE)?;

    page.text_row(9.0, DOCUMENT_TITLE, 16.0, true, Align::Center);

    page.text_row(6.0, "Identitas", 12.0, true, Align::Center);
    page.labeled_row("Nama Siswa", &metrics.student_name);
    page.labeled_row("Nama Sekolah", &metrics.school_name);
    page.labeled_row(
        "Tanggal Survey",
        &metrics.surveyed_on.format("%d %B %Y").to_string(),
    );
    page.labeled_row("Profil Risiko", &assessment.tier.as_str().to_uppercase());

    page.spacer(6.0);
    page.text_row(6.0, "Grafik Hasil Survey", 12.0, true, Align::Center);
    page.chart_row(assessment, charts);

    let operator = &assessment.guidance.operator;
    page.text_row(6.0, "Operator's Suggestions", 12.0, true, Align::Center);
    page.labeled_row("RECURRING", operator.recurring);
    page.labeled_row("FLUORIDE", operator.fluoride);
    page.labeled_row("DIET", operator.diet);
    page.labeled_row("SEALANT", operator.sealant);
    page.labeled_row("ART", operator.restorative);

    let parent = &assessment.guidance.parent;
    page.spacer(12.0);
    page.text_row(6.0, "Parent's Suggestions", 12.0, true, Align::Center);
    page.bullet_group("Reminder", parent.reminder);
    page.bullet_group("Guidance", parent.guidance);
    page.bullet_group("Supervision", parent.supervision);

    let teacher = &assessment.guidance.teacher;
    page.spacer(12.0);
    page.text_row(6.0, "Teacher's Suggestions", 12.0, true, Align::Center);
    page.bullet_group("Reminder", teacher.reminder);
    page.bullet_group("Guidance", teacher.guidance);

    let bytes = page
        .doc
        .save_to_bytes()
        .map_err(|e| ReportError::Render(e.to_string()))?;
    Ok(Composed {
        bytes,
        pages: page.page_count,
        images: page.images,
        placed: page.placed,
    })
}

/// Top-down cursor over the pages of one document.
struct PageWriter {
    doc: PdfDocumentReference,
    layer: PdfLayerReference,
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    /// Distance from the top edge of the current page, in millimetres.
    cursor: f32,
    page_count: usize,
    images: usize,
    placed: Vec<(usize, String)>,
}

impl PageWriter {
    fn new(title: &str) -> Result<Self> {
        let (doc, page, layer) =
            PdfDocument::new(title, Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "content");
        let regular = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| ReportError::Render(e.to_string()))?;
        let bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|e| ReportError::Render(e.to_string()))?;
        let layer = doc.get_page(page).get_layer(layer);
        Ok(Self {
            doc,
            layer,
            regular,
            bold,
            cursor: MARGIN_TOP,
            page_count: 1,
            images: 0,
            placed: Vec::new(),
        })
    }

    fn reserve(&mut self, height: f32) {
        if self.cursor + height > PAGE_HEIGHT - MARGIN_BOTTOM {
            let (page, layer) = self.doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "content");
            self.layer = self.doc.get_page(page).get_layer(layer);
            self.cursor = MARGIN_TOP;
            self.page_count += 1;
        }
    }

    fn spacer(&mut self, height: f32) {
        self.reserve(height);
        self.cursor += height;
    }

    /// Baseline in PDF space for text sitting at the bottom of a row.
    fn baseline(&self, row_height: f32) -> Mm {
        Mm(PAGE_HEIGHT - self.cursor - row_height + 1.0)
    }

    fn put_text(&mut self, text: &str, size: f32, bold: bool, x: f32, y: Mm) {
        let font = if bold { &self.bold } else { &self.regular };
        self.layer.use_text(text, size, Mm(x), y, font);
        self.placed.push((self.page_count, text.to_string()));
    }

    fn text_row(&mut self, height: f32, text: &str, size: f32, bold: bool, align: Align) {
        self.reserve(height);
        let x = match align {
            Align::Left => MARGIN_LEFT,
            Align::Center => {
                let width = text_width_mm(text, size);
                MARGIN_LEFT + ((CONTENT_WIDTH - width) / 2.0).max(0.0)
            }
        };
        self.put_text(text, size, bold, x, self.baseline(height));
        self.cursor += height;
    }

    fn labeled_row(&mut self, label: &str, value: &str) {
        let lines = wrap(value, chars_per_line(CONTENT_WIDTH - LABEL_WIDTH, BODY_SIZE));
        for (idx, line) in lines.iter().enumerate() {
            self.reserve(6.0);
            let baseline = self.baseline(6.0);
            if idx == 0 {
                self.put_text(label, BODY_SIZE, true, MARGIN_LEFT, baseline);
            }
            self.put_text(line, BODY_SIZE, false, MARGIN_LEFT + LABEL_WIDTH, baseline);
            self.cursor += 6.0;
        }
    }

    fn bullet_group(&mut self, heading: &str, items: &[&str]) {
        self.text_row(10.0, heading, BODY_SIZE, true, Align::Left);
        let width = chars_per_line(CONTENT_WIDTH, BODY_SIZE);
        for item in items {
            let body = format!("{BULLET}{item}");
            for line in wrap(&body, width) {
                self.text_row(6.0, &line, BODY_SIZE, false, Align::Left);
            }
        }
    }

    fn chart_row(&mut self, assessment: &RiskAssessment, charts: ChartRenderers) {
        // chart titles and bar labels sit in the rows above and below the images
        self.reserve(6.0 + CHART_ROW_HEIGHT + 6.0);
        let percent_x = MARGIN_LEFT;
        let dmf_x = MARGIN_LEFT + CONTENT_WIDTH * 4.0 / 12.0;

        let title_baseline = self.baseline(6.0);
        self.put_text("Subjective Score", BODY_SIZE, true, percent_x, title_baseline);
        self.put_text("DMF", BODY_SIZE, true, dmf_x, title_baseline);
        self.cursor += 6.0;

        match (charts.percentage)(assessment.score) {
            Ok(image) => self.place_chart(&image, percent_x, &["Risk (%)"]),
            Err(err) => tracing::warn!(error = %err, "skipping subjective score chart"),
        }
        match (charts.dmf)(&assessment.dmf) {
            Ok(image) => {
                let labels = chart::dmf_bars(&assessment.dmf).map(|bar| bar.label);
                self.place_chart(&image, dmf_x, &labels)
            }
            Err(err) => tracing::warn!(error = %err, "skipping DMF chart"),
        }
        self.cursor += CHART_ROW_HEIGHT + 6.0;
    }

    fn place_chart(&mut self, image: &ChartImage, x: f32, labels: &[&str]) {
        let dpi = image.height as f32 / (CHART_ROW_HEIGHT / 25.4);
        let width_mm = image.width as f32 / dpi * 25.4;
        let bottom = PAGE_HEIGHT - self.cursor - CHART_ROW_HEIGHT;

        let xobject = ImageXObject {
            width: Px(image.width as usize),
            height: Px(image.height as usize),
            color_space: ColorSpace::Rgb,
            bits_per_component: ColorBits::Bit8,
            interpolate: true,
            image_data: image.rgb.clone(),
            image_filter: None,
            smask: None,
            clipping_bbox: None,
        };
        Image::from(xobject).add_to_layer(
            self.layer.clone(),
            ImageTransform {
                translate_x: Some(Mm(x)),
                translate_y: Some(Mm(bottom)),
                dpi: Some(dpi),
                ..Default::default()
            },
        );
        self.images += 1;

        let slot = width_mm / labels.len().max(1) as f32;
        for (idx, label) in labels.iter().enumerate() {
            let center = x + slot * (idx as f32 + 0.5);
            let left = center - text_width_mm(label, BODY_SIZE) / 2.0;
            self.put_text(label, BODY_SIZE, false, left, Mm(bottom - 5.0));
        }
    }
}

fn text_width_mm(text: &str, size: f32) -> f32 {
    text.chars().count() as f32 * size * AVG_GLYPH_EM * PT_TO_MM
}

fn chars_per_line(width_mm: f32, size: f32) -> usize {
    ((width_mm / (size * AVG_GLYPH_EM * PT_TO_MM)) as usize).max(1)
}

/// Greedy word wrap. Words longer than a line are split hard.
fn wrap(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > max_chars {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            let rest = word.split_off(max_chars);
            lines.push(word.into_iter().collect());
            word = rest;
        }

        let needed = if current.is_empty() {
            word.len()
        } else {
            current.chars().count() + 1 + word.len()
        };
        if needed > max_chars && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.extend(word);
    }

    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}
