use std::path::Path;

use anyhow::{Context, Result};
use tiny_skia::{Color, FillRule, Paint, PathBuilder, Pixmap, Rect, Stroke, Transform};

use crate::state::history::{uptimes, HistoryEntry};

const WIDTH: u32 = 420;
const HEIGHT: u32 = 60;
const PAD_X: f32 = 8.0;

/// Line height for up runs and down runs.
const UP_Y: f32 = 10.0;
const DOWN_Y: f32 = 38.0;

/// Uptime gauges under the line: 24h first, then 7d.
const GAUGE_24H_Y: f32 = 45.0;
const GAUGE_7D_Y: f32 = 52.0;
const GAUGE_HEIGHT: f32 = 4.0;

fn rgb(r: u8, g: u8, b: u8) -> Color {
    Color::from_rgba8(r, g, b, 255)
}

fn paint(color: Color) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color(color);
    paint.anti_alias = true;
    paint
}

/// Pixel coordinates of each history entry on the line.
pub fn line_points(history: &[HistoryEntry]) -> Vec<(f32, f32)> {
    let n = history.len().max(2);
    let step = (WIDTH as f32 - 2.0 * PAD_X) / (n - 1) as f32;
    history
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let y = if entry.ok { UP_Y } else { DOWN_Y };
            (PAD_X + i as f32 * step, y)
        })
        .collect()
}

fn draw_gauge(pixmap: &mut Pixmap, y: f32, percent: u8) {
    let full = WIDTH as f32 - 2.0 * PAD_X;
    if let Some(track) = Rect::from_xywh(PAD_X, y, full, GAUGE_HEIGHT) {
        pixmap.fill_rect(track, &paint(rgb(60, 60, 60)), Transform::identity(), None);
    }
    let filled = full * f32::from(percent.min(100)) / 100.0;
    if let Some(bar) = Rect::from_xywh(PAD_X, y, filled, GAUGE_HEIGHT) {
        pixmap.fill_rect(bar, &paint(rgb(46, 204, 113)), Transform::identity(), None);
    }
}

/// Render the history as a PNG sparkline: up runs on the top line, down
/// runs on the bottom line, with 24h and 7d uptime gauges underneath.
/// Empty history renders nothing.
pub fn render_png(history: &[HistoryEntry]) -> Result<Option<Vec<u8>>> {
    if history.is_empty() {
        return Ok(None);
    }

    let mut pixmap = Pixmap::new(WIDTH, HEIGHT).context("allocating sparkline canvas")?;
    pixmap.fill(rgb(24, 26, 27));

    if let Some(frame) = Rect::from_xywh(0.5, 0.5, WIDTH as f32 - 1.0, HEIGHT as f32 - 1.0) {
        pixmap.stroke_path(
            &PathBuilder::from_rect(frame),
            &paint(rgb(60, 60, 60)),
            &Stroke::default(),
            Transform::identity(),
            None,
        );
    }

    let line = paint(rgb(230, 230, 230));
    let points = line_points(history);
    match points.as_slice() {
        [(x, y)] => {
            if let Some(dot) = PathBuilder::from_circle(*x, *y, 2.0) {
                pixmap.fill_path(&dot, &line, FillRule::Winding, Transform::identity(), None);
            }
        }
        [(x0, y0), rest @ ..] => {
            let mut pb = PathBuilder::new();
            pb.move_to(*x0, *y0);
            for (x, y) in rest {
                pb.line_to(*x, *y);
            }
            if let Some(path) = pb.finish() {
                let stroke = Stroke {
                    width: 2.0,
                    ..Stroke::default()
                };
                pixmap.stroke_path(&path, &line, &stroke, Transform::identity(), None);
            }
        }
        [] => {}
    }

    let uptime = uptimes(history);
    draw_gauge(&mut pixmap, GAUGE_24H_Y, uptime.last_24);
    draw_gauge(&mut pixmap, GAUGE_7D_Y, uptime.last_7d);

    let png = pixmap.encode_png().context("encoding sparkline PNG")?;
    Ok(Some(png))
}

/// Write the sparkline to `path`, creating parent directories.
///
/// Returns whether a file was written.
pub fn write_sparkline(path: &Path, history: &[HistoryEntry]) -> Result<bool> {
    let Some(png) = render_png(history)? else {
        return Ok(false);
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    std::fs::write(path, png).with_context(|| format!("writing {}", path.display()))?;

    Ok(true)
}
