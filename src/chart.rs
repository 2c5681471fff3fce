use plotters::prelude::*;

use crate::error::{ReportError, Result};
use crate::risk::DmfCounts;

const ORANGE: RGBColor = RGBColor(255, 165, 0);
const DMF_RED: RGBColor = RGBColor(215, 38, 56);

/// Raster height of both charts. Images are embedded as raw RGB, so every
/// pixel here costs three bytes in the document.
pub const CHART_HEIGHT_PX: u32 = 128;

/// Raw 8-bit RGB raster, row-major, three bytes per pixel.
#[derive(Debug, Clone)]
pub struct ChartImage {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct Bar {
    pub label: &'static str,
    pub value: f64,
    pub color: RGBColor,
}

/// Y-axis ceiling for the D/M/F chart. Never below one so an all-zero
/// survey still gets a drawable axis.
pub fn dmf_axis_max(dmf: &DmfCounts) -> f64 {
    [dmf.decayed, dmf.missing, dmf.filled]
        .into_iter()
        .fold(1.0_f64, |acc, v| if v > acc { v } else { acc })
}

/// Renders bars into an in-memory bitmap.
///
/// Text is not rasterised here: labels travel with the chart and the document
/// composer prints them underneath, so rendering needs no system fonts.
pub fn render_bar(
    bars: &[Bar],
    y_range: (f64, f64),
    (width, height): (u32, u32),
) -> Result<ChartImage> {
    if bars.is_empty() {
        return Err(ReportError::Render("bar chart needs at least one bar".into()));
    }
    let (y_min, y_max) = y_range;
    if !(y_max > y_min) {
        return Err(ReportError::Render(format!(
            "degenerate y range {y_min}..{y_max}"
        )));
    }

    let mut rgb = vec![0u8; width as usize * height as usize * 3];
    {
        let root = BitMapBackend::with_buffer(&mut rgb, (width, height)).into_drawing_area();
        root.fill(&WHITE).map_err(render_error)?;

        let slots = bars.len() as f64;
        let mut chart = ChartBuilder::on(&root)
            .margin(8)
            .build_cartesian_2d(0f64..slots, y_min..y_max)
            .map_err(render_error)?;

        chart
            .draw_series(bars.iter().enumerate().map(|(idx, bar)| {
                let top = bar.value.clamp(y_min, y_max);
                let left = idx as f64 + 0.2;
                Rectangle::new([(left, y_min), (left + 0.6, top)], bar.color.filled())
            }))
            .map_err(render_error)?;

        chart
            .draw_series(std::iter::once(PathElement::new(
                vec![(0.0, y_max), (0.0, y_min), (slots, y_min)],
                BLACK.stroke_width(2),
            )))
            .map_err(render_error)?;

        root.present().map_err(render_error)?;
    }

    Ok(ChartImage { width, height, rgb })
}

pub fn risk_percentage_chart(score: f64) -> Result<ChartImage> {
    let bars = [Bar {
        label: "Risk (%)",
        value: score,
        color: ORANGE,
    }];
    render_bar(&bars, (0.0, 100.0), (CHART_HEIGHT_PX, CHART_HEIGHT_PX))
}

pub fn dmf_chart(dmf: &DmfCounts) -> Result<ChartImage> {
    let bars = dmf_bars(dmf);
    render_bar(
        &bars,
        (0.0, dmf_axis_max(dmf)),
        (CHART_HEIGHT_PX * 2, CHART_HEIGHT_PX),
    )
}

pub fn dmf_bars(dmf: &DmfCounts) -> [Bar; 3] {
    [
        Bar {
            label: "D",
            value: dmf.decayed,
            color: DMF_RED,
        },
        Bar {
            label: "M",
            value: dmf.missing,
            color: DMF_RED,
        },
        Bar {
            label: "F",
            value: dmf.filled,
            color: DMF_RED,
        },
    ]
}

fn render_error<E: std::fmt::Display>(err: E) -> ReportError {
    ReportError::Render(err.to_string())
}
