//! PNG charts drawn from the analysis tables into `<account>/charts/`.
//!
//! Titles and axis labels need a font registered through [`use_font`].
//! Without one the charts are drawn bare and the CSV tables carry the
//! labels.
use crate::engagement::MonthlyEngagement;
use crate::keywords::KeywordCount;
use crate::patterns::{Heatmap, MonthCount, WEEKDAYS};
use crate::sentiment::{MonthSentiment, NEUTRAL};
use plotters::prelude::*;
use plotters::style::{FontStyle, register_font};
use std::error::Error;
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

pub const CHARTS_DIR: &str = "charts";
pub const SENTIMENT_TREND_PNG: &str = "sentiment_trend.png";
pub const TOP_KEYWORDS_PNG: &str = "top_keywords.png";
pub const ENGAGEMENT_TREND_PNG: &str = "engagement_trend.png";
pub const POSTING_FREQUENCY_PNG: &str = "posting_frequency.png";
pub const ACTIVITY_HEATMAP_PNG: &str = "activity_heatmap.png";

const FONT_FAMILY: &str = "sans-serif";
const PRIMARY: RGBColor = RGBColor(0x4A, 0x90, 0xD9);
const SECONDARY: RGBColor = RGBColor(0xE8, 0x53, 0x4A);
const TERTIARY: RGBColor = RGBColor(0xF5, 0xA6, 0x23);
const MUTED: RGBColor = RGBColor(0x99, 0x99, 0x99);

static FONT: OnceLock<PathBuf> = OnceLock::new();

#[derive(Debug, thiserror::Error)]
pub enum ChartError {
    #[error("failed to read chart font {path}: {source}")]
    FontRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{0} is not a usable TTF/OTF font")]
    FontInvalid(PathBuf),
    #[error("failed to render {path}: {message}")]
    Render { path: PathBuf, message: String },
}

type DrawResult = Result<(), Box<dyn Error>>;

/// Register the font used for titles and labels. Only the first
/// successful call in a process takes effect.
pub fn use_font(path: &Path) -> Result<(), ChartError> {
    if FONT.get().is_some() {
        return Ok(());
    }
    let bytes = fs::read(path).map_err(|source| ChartError::FontRead {
        path: path.to_path_buf(),
        source,
    })?;
    // plotters keeps registered fonts for the life of the process
    let bytes: &'static [u8] = Box::leak(bytes.into_boxed_slice());
    register_font(FONT_FAMILY, FontStyle::Normal, bytes)
        .map_err(|_| ChartError::FontInvalid(path.to_path_buf()))?;
    let _ = FONT.set(path.to_path_buf());
    tracing::debug!(font=%path.display(), "analysis.charts.font");
    Ok(())
}

fn labelled() -> bool {
    FONT.get().is_some()
}

fn render(
    path: &Path,
    draw: impl FnOnce(&Path, bool) -> DrawResult,
) -> Result<PathBuf, ChartError> {
    draw(path, labelled()).map_err(|e| ChartError::Render {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    tracing::debug!(path=%path.display(), "analysis.chart.written");
    Ok(path.to_path_buf())
}

/// One slot per category, centred on the integers `0..n`.
fn slots(n: usize) -> Range<f64> {
    -0.5..(n.max(1) as f64 - 0.5)
}

/// Category name for an axis position, empty between slots.
fn label_at(labels: &[&str], v: f64) -> String {
    let i = v.round();
    if (v - i).abs() > 1e-6 || i < 0.0 {
        return String::new();
    }
    labels
        .get(i as usize)
        .map(|s| s.to_string())
        .unwrap_or_default()
}

/// Light yellow through orange to dark red as `t` goes from 0 to 1.
fn heat_color(t: f64) -> RGBColor {
    const STOPS: [(f64, (u8, u8, u8)); 3] = [
        (0.0, (255, 255, 204)),
        (0.5, (253, 141, 60)),
        (1.0, (189, 0, 38)),
    ];
    let t = t.clamp(0.0, 1.0);
    let (lo, hi) = if t <= 0.5 {
        (STOPS[0], STOPS[1])
    } else {
        (STOPS[1], STOPS[2])
    };
    let f = (t - lo.0) / (hi.0 - lo.0);
    let mix = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * f).round() as u8;
    RGBColor(
        mix((lo.1).0, (hi.1).0),
        mix((lo.1).1, (hi.1).1),
        mix((lo.1).2, (hi.1).2),
    )
}

pub fn sentiment_trend(path: &Path, trend: &[MonthSentiment]) -> Result<PathBuf, ChartError> {
    render(path, |path, labels| {
        let root = BitMapBackend::new(path, (1200, 500)).into_drawing_area();
        root.fill(&WHITE)?;

        let mut builder = ChartBuilder::on(&root);
        builder.margin(20);
        if labels {
            builder
                .caption("Monthly Sentiment Trend", (FONT_FAMILY, 24))
                .x_label_area_size(70)
                .y_label_area_size(60);
        }
        let mut chart = builder.build_cartesian_2d(slots(trend.len()), 0f64..1f64)?;
        if labels {
            let months: Vec<&str> = trend.iter().map(|m| m.month.as_str()).collect();
            chart
                .configure_mesh()
                .x_labels(months.len())
                .x_label_formatter(&|x: &f64| label_at(&months, *x))
                .y_desc("Avg Sentiment Score")
                .draw()?;
        }

        let end = trend.len().max(1) as f64 - 0.5;
        chart.draw_series(LineSeries::new([(-0.5, NEUTRAL), (end, NEUTRAL)], &MUTED))?;
        let points: Vec<(f64, f64)> = trend
            .iter()
            .enumerate()
            .map(|(i, m)| (i as f64, m.avg_sentiment))
            .collect();
        chart.draw_series(LineSeries::new(points.iter().copied(), PRIMARY.stroke_width(2)))?;
        chart.draw_series(points.iter().map(|&p| Circle::new(p, 4, PRIMARY.filled())))?;
        root.present()?;
        Ok(())
    })
}

/// Horizontal bars, most frequent keyword on top.
pub fn top_keywords(path: &Path, top: &[KeywordCount]) -> Result<PathBuf, ChartError> {
    render(path, |path, labels| {
        let root = BitMapBackend::new(path, (1200, 700)).into_drawing_area();
        root.fill(&WHITE)?;

        let max = top.iter().map(|k| k.count).max().unwrap_or(0).max(1) as f64;
        let mut builder = ChartBuilder::on(&root);
        builder.margin(20);
        if labels {
            builder
                .caption(format!("Top {} Keywords", top.len()), (FONT_FAMILY, 24))
                .x_label_area_size(50)
                .y_label_area_size(120);
        }
        let mut chart = builder.build_cartesian_2d(0f64..max * 1.05, slots(top.len()))?;
        if labels {
            let names: Vec<&str> = top.iter().rev().map(|k| k.keyword.as_str()).collect();
            chart
                .configure_mesh()
                .disable_y_mesh()
                .y_labels(names.len())
                .y_label_formatter(&|y: &f64| label_at(&names, *y))
                .x_desc("Frequency")
                .draw()?;
        }

        chart.draw_series(top.iter().rev().enumerate().map(|(i, k)| {
            let y = i as f64;
            Rectangle::new([(0.0, y - 0.4), (k.count as f64, y + 0.4)], PRIMARY.filled())
        }))?;
        root.present()?;
        Ok(())
    })
}

/// Views, likes and reposts per month, one panel each.
pub fn engagement_trend(
    path: &Path,
    monthly: &[MonthlyEngagement],
) -> Result<PathBuf, ChartError> {
    render(path, |path, labels| {
        let root = BitMapBackend::new(path, (1200, 1000)).into_drawing_area();
        root.fill(&WHITE)?;

        let months: Vec<&str> = monthly.iter().map(|m| m.month.as_str()).collect();
        let panels: [(&str, fn(&MonthlyEngagement) -> f64, RGBColor); 3] = [
            ("Avg Views", |m| m.avg_views, PRIMARY),
            ("Avg Likes", |m| m.avg_likes, SECONDARY),
            ("Avg Reposts", |m| m.avg_reposts, TERTIARY),
        ];

        for (idx, (area, (desc, value, color))) in
            root.split_evenly((3, 1)).iter().zip(panels).enumerate()
        {
            let values: Vec<f64> = monthly.iter().map(value).collect();
            let ceiling = values.iter().copied().fold(0.0, f64::max).max(1.0) * 1.1;

            let mut builder = ChartBuilder::on(area);
            builder.margin(15);
            if labels {
                if idx == 0 {
                    builder.caption("Monthly Engagement Trend", (FONT_FAMILY, 24));
                }
                builder.x_label_area_size(50).y_label_area_size(70);
            }
            let mut chart = builder.build_cartesian_2d(slots(monthly.len()), 0f64..ceiling)?;
            if labels {
                chart
                    .configure_mesh()
                    .x_labels(months.len())
                    .x_label_formatter(&|x: &f64| label_at(&months, *x))
                    .y_desc(desc)
                    .draw()?;
            }

            let points: Vec<(f64, f64)> = values
                .iter()
                .enumerate()
                .map(|(i, v)| (i as f64, *v))
                .collect();
            chart.draw_series(AreaSeries::new(points.iter().copied(), 0.0, color.mix(0.15)))?;
            chart.draw_series(LineSeries::new(points.iter().copied(), color.stroke_width(2)))?;
            chart.draw_series(points.iter().map(|&p| Circle::new(p, 3, color.filled())))?;
        }
        root.present()?;
        Ok(())
    })
}

pub fn posting_frequency(path: &Path, freq: &[MonthCount]) -> Result<PathBuf, ChartError> {
    render(path, |path, labels| {
        let root = BitMapBackend::new(path, (1200, 500)).into_drawing_area();
        root.fill(&WHITE)?;

        let max = freq.iter().map(|m| m.tweets).max().unwrap_or(0).max(1) as f64;
        let mut builder = ChartBuilder::on(&root);
        builder.margin(20);
        if labels {
            builder
                .caption("Posting Frequency Over Time", (FONT_FAMILY, 24))
                .x_label_area_size(70)
                .y_label_area_size(60);
        }
        let mut chart = builder.build_cartesian_2d(slots(freq.len()), 0f64..max * 1.15)?;
        if labels {
            let months: Vec<&str> = freq.iter().map(|m| m.month.as_str()).collect();
            chart
                .configure_mesh()
                .disable_x_mesh()
                .x_labels(months.len())
                .x_label_formatter(&|x: &f64| label_at(&months, *x))
                .y_desc("Number of Tweets")
                .draw()?;
        }

        chart.draw_series(freq.iter().enumerate().map(|(i, m)| {
            let x = i as f64;
            Rectangle::new([(x - 0.4, 0.0), (x + 0.4, m.tweets as f64)], PRIMARY.mix(0.8).filled())
        }))?;
        if labels {
            chart.draw_series(freq.iter().enumerate().map(|(i, m)| {
                Text::new(
                    m.tweets.to_string(),
                    (i as f64 - 0.15, m.tweets as f64 + max * 0.06),
                    (FONT_FAMILY, 12).into_font(),
                )
            }))?;
        }
        root.present()?;
        Ok(())
    })
}

/// Weekday by hour-of-day grid, Monday on top.
pub fn activity_heatmap(path: &Path, heatmap: &Heatmap) -> Result<PathBuf, ChartError> {
    render(path, |path, labels| {
        let root = BitMapBackend::new(path, (1400, 500)).into_drawing_area();
        root.fill(&WHITE)?;

        let max = heatmap.cells.iter().flatten().copied().max().unwrap_or(0).max(1) as f64;
        let mut builder = ChartBuilder::on(&root);
        builder.margin(20);
        if labels {
            builder
                .caption("Posting Activity Heatmap", (FONT_FAMILY, 24))
                .x_label_area_size(50)
                .y_label_area_size(60);
        }
        let mut chart = builder.build_cartesian_2d(slots(24), slots(WEEKDAYS.len()))?;
        if labels {
            let hours: Vec<String> = (0..24).map(|h| format!("{h}:00")).collect();
            let hours: Vec<&str> = hours.iter().map(String::as_str).collect();
            let days: Vec<&str> = WEEKDAYS.iter().rev().copied().collect();
            chart
                .configure_mesh()
                .disable_mesh()
                .x_labels(hours.len())
                .x_label_formatter(&|x: &f64| label_at(&hours, *x))
                .y_labels(days.len())
                .y_label_formatter(&|y: &f64| label_at(&days, *y))
                .x_desc("Hour (UTC)")
                .y_desc("Day of Week")
                .draw()?;
        }

        let rows = WEEKDAYS.len() - 1;
        chart.draw_series(heatmap.cells.iter().enumerate().flat_map(|(day, row)| {
            row.iter().enumerate().map(move |(hour, &count)| {
                let (x, y) = (hour as f64, (rows - day) as f64);
                Rectangle::new(
                    [(x - 0.5, y - 0.5), (x + 0.5, y + 0.5)],
                    heat_color(count as f64 / max).filled(),
                )
            })
        }))?;
        root.present()?;
        Ok(())
    })
}
