use data::annotation::{Annotation, AnnotationKind, DrawingPoint, LineStyle, Style, fibo_level_prices};
use data::series::MondayRange;
use data::util::count_decimals;
use exchange::Candle;

use iced::theme::palette::Extended;
use iced::widget::canvas::{Frame, LineDash, Path, Stroke, Text};
use iced::{Color, Point, Rectangle, Size};

use super::ViewState;

const DASH: [f32; 2] = [4.0, 4.0];
const DOT: [f32; 2] = [1.0, 3.0];
const HANDLE_SIZE: f32 = 6.0;

fn with_alpha(color: Color, a: f32) -> Color {
    Color { a, ..color }
}

/// `#rrggbb` or `#rrggbbaa`.
pub fn parse_hex_color(raw: &str) -> Option<Color> {
    let hex = raw.strip_prefix('#')?;
    if hex.len() != 6 && hex.len() != 8 {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    let (r, g, b) = (channel(0)?, channel(2)?, channel(4)?);
    let a = if hex.len() == 8 { channel(6)? } else { 255 };
    Some(Color::from_rgba8(r, g, b, f32::from(a) / 255.0))
}

fn line_color(style: &Style, palette: &Extended) -> Color {
    style
        .color
        .as_deref()
        .and_then(parse_hex_color)
        .unwrap_or(palette.primary.base.color)
}

fn fill_color(style: &Style, palette: &Extended) -> Color {
    style
        .fill
        .as_deref()
        .and_then(parse_hex_color)
        .unwrap_or(with_alpha(palette.primary.base.color, 0.15))
}

fn annotation_stroke(style: &Style, palette: &Extended) -> Stroke<'static> {
    let base = Stroke::default()
        .with_color(line_color(style, palette))
        .with_width(style.width.unwrap_or(1.0));
    match style.line_style.unwrap_or_default() {
        LineStyle::Solid => base,
        LineStyle::Dashed => Stroke {
            line_dash: LineDash {
                segments: &DASH,
                offset: 0,
            },
            ..base
        },
        LineStyle::Dotted => Stroke {
            line_dash: LineDash {
                segments: &DOT,
                offset: 0,
            },
            ..base
        },
    }
}

pub fn draw_candles(frame: &mut Frame, state: &ViewState, candles: &[Candle], palette: &Extended) {
    let candle_width = state.cell_width() * 0.8;

    for (index, candle) in candles.iter().enumerate() {
        let x = state.index_to_x(index as f64);
        let (Some(y_open), Some(y_high), Some(y_low), Some(y_close)) = (
            state.price_to_y(candle.open),
            state.price_to_y(candle.high),
            state.price_to_y(candle.low),
            state.price_to_y(candle.close),
        ) else {
            continue;
        };

        let color = if candle.close >= candle.open {
            palette.success.base.color
        } else {
            palette.danger.base.color
        };

        frame.fill_rectangle(
            Point::new(x - 0.5, y_high),
            Size::new(1.0, (y_low - y_high).max(1.0)),
            color,
        );
        frame.fill_rectangle(
            Point::new(x - candle_width / 2.0, y_open.min(y_close)),
            Size::new(candle_width, (y_open - y_close).abs().max(1.0)),
            color,
        );
    }
}

pub fn draw_emas(frame: &mut Frame, state: &ViewState, emas: &[(usize, Vec<f64>)]) {
    for (slot, (_period, values)) in emas.iter().enumerate() {
        if values.len() < 2 {
            continue;
        }
        let color = match slot % 2 {
            0 => Color::from_rgb8(41, 98, 255),
            _ => Color::from_rgb8(255, 167, 38),
        };

        let path = Path::new(|builder| {
            let mut started = false;
            for (index, value) in values.iter().enumerate() {
                let Some(y) = state.price_to_y(*value) else {
                    continue;
                };
                let point = Point::new(state.index_to_x(index as f64), y);
                if started {
                    builder.line_to(point);
                } else {
                    builder.move_to(point);
                    started = true;
                }
            }
        });
        frame.stroke(&path, Stroke::default().with_color(color).with_width(1.0));
    }
}

pub fn draw_monday_bands(
    frame: &mut Frame,
    state: &ViewState,
    bands: &[MondayRange],
    palette: &Extended,
) {
    for band in bands {
        let (Some(x0), Some(x1), Some(y_high), Some(y_low)) = (
            state.time_to_x(band.week_start),
            state.time_to_x(band.week_end),
            state.price_to_y(band.high),
            state.price_to_y(band.low),
        ) else {
            continue;
        };

        let color = palette.primary.base.color;
        frame.fill_rectangle(
            Point::new(x0, y_high),
            Size::new(x1 - x0, y_low - y_high),
            with_alpha(color, 0.06),
        );
        for y in [y_high, y_low] {
            frame.stroke(
                &Path::line(Point::new(x0, y), Point::new(x1, y)),
                Stroke::default()
                    .with_color(with_alpha(color, 0.35))
                    .with_width(1.0),
            );
        }
    }
}

/// Dim everything to the right of the last revealed bar while a
/// replay is active.
pub fn draw_replay_boundary(
    frame: &mut Frame,
    state: &ViewState,
    region: &Rectangle,
    palette: &Extended,
) {
    let edge = state.cell_width() / 2.0;
    let right = region.x + region.width;
    if right <= edge {
        return;
    }

    frame.fill_rectangle(
        Point::new(edge, region.y),
        Size::new(right - edge, region.height),
        with_alpha(palette.background.base.text, 0.05),
    );
    frame.stroke(
        &Path::line(
            Point::new(edge, region.y),
            Point::new(edge, region.y + region.height),
        ),
        Stroke {
            line_dash: LineDash {
                segments: &DASH,
                offset: 0,
            },
            ..Stroke::default()
                .with_color(with_alpha(palette.background.base.text, 0.4))
                .with_width(1.0)
        },
    );
}

pub fn draw_annotation(
    frame: &mut Frame,
    state: &ViewState,
    region: &Rectangle,
    annotation: &Annotation,
    selected: bool,
    palette: &Extended,
) {
    let points = &annotation.points;
    let stroke = annotation_stroke(&annotation.style, palette);

    match annotation.kind {
        AnnotationKind::HLine => {
            let Some(y) = state.price_to_y(points[0].price) else {
                return;
            };
            frame.stroke(
                &Path::line(
                    Point::new(region.x, y),
                    Point::new(region.x + region.width, y),
                ),
                stroke,
            );
        }
        AnnotationKind::Rect | AnnotationKind::PriceRange => {
            let Some((x0, y0, x1, y1)) = corner_pixels(state, points) else {
                return;
            };
            let top_left = Point::new(x0.min(x1), y0.min(y1));
            let size = Size::new((x1 - x0).abs(), (y1 - y0).abs());
            frame.fill_rectangle(top_left, size, fill_color(&annotation.style, palette));
            frame.stroke(&Path::rectangle(top_left, size), stroke);

            if annotation.kind == AnnotationKind::PriceRange {
                let (from, to) = (points[0].price, points[1].price);
                let delta = to - from;
                let percent = if from.abs() > f64::EPSILON {
                    delta / from * 100.0
                } else {
                    0.0
                };
                let decimals = count_decimals(from.abs());
                frame.fill_text(Text {
                    content: format!("{delta:+.decimals$} ({percent:+.2}%)"),
                    position: Point::new(top_left.x + 4.0, top_left.y - 12.0),
                    color: line_color(&annotation.style, palette),
                    size: iced::Pixels(10.0),
                    ..Text::default()
                });
            }
        }
        AnnotationKind::Fibo => {
            let (Some(x0), Some(x1)) = (
                state.time_to_x(points[0].time),
                state.time_to_x(points[1].time),
            ) else {
                return;
            };
            let left = x0.min(x1);
            let right = x0.max(x1);
            let levels = annotation.style.levels_or_default();
            let prices = fibo_level_prices(&points[0], &points[1], &levels);
            let decimals = count_decimals(points[0].price.abs());

            for (level, price) in levels.iter().zip(&prices) {
                let Some(y) = state.price_to_y(*price) else {
                    continue;
                };
                frame.stroke(
                    &Path::line(Point::new(left, y), Point::new(right, y)),
                    stroke.clone(),
                );
                frame.fill_text(Text {
                    content: format!("{level:.3}  {price:.decimals$}"),
                    position: Point::new(right + 4.0, y - 5.0),
                    color: line_color(&annotation.style, palette),
                    size: iced::Pixels(10.0),
                    ..Text::default()
                });
            }
        }
        AnnotationKind::LongPos | AnnotationKind::ShortPos => {
            draw_position(frame, state, annotation, selected, palette);
            return;
        }
    }

    if selected {
        for point in points {
            if let (Some(x), Some(y)) = (
                state.time_to_x(point.time),
                state.price_to_y(point.price),
            ) {
                draw_handle(frame, x, y, palette);
            }
        }
    }
}

fn draw_position(
    frame: &mut Frame,
    state: &ViewState,
    annotation: &Annotation,
    selected: bool,
    palette: &Extended,
) {
    let points = &annotation.points;
    let (entry, stop_loss, take_profit, extent) =
        (&points[0], &points[1], &points[2], &points[3]);

    let (Some(x0), Some(x1)) = (
        state.time_to_x(entry.time),
        state.time_to_x(extent.time),
    ) else {
        return;
    };
    let (Some(y_entry), Some(y_sl), Some(y_tp)) = (
        state.price_to_y(entry.price),
        state.price_to_y(stop_loss.price),
        state.price_to_y(take_profit.price),
    ) else {
        return;
    };

    let width = (x1 - x0).abs().max(1.0);
    let left = x0.min(x1);
    let profit = palette.success.base.color;
    let loss = palette.danger.base.color;

    frame.fill_rectangle(
        Point::new(left, y_entry.min(y_tp)),
        Size::new(width, (y_tp - y_entry).abs().max(1.0)),
        with_alpha(profit, 0.15),
    );
    frame.fill_rectangle(
        Point::new(left, y_entry.min(y_sl)),
        Size::new(width, (y_sl - y_entry).abs().max(1.0)),
        with_alpha(loss, 0.15),
    );
    frame.stroke(
        &Path::line(Point::new(left, y_entry), Point::new(left + width, y_entry)),
        Stroke::default()
            .with_color(line_color(&annotation.style, palette))
            .with_width(annotation.style.width.unwrap_or(1.0)),
    );

    if selected {
        draw_handle(frame, x1, y_tp, palette);
        draw_handle(frame, x1, y_sl, palette);
        draw_handle(frame, x1, y_entry, palette);
    }
}

fn draw_handle(frame: &mut Frame, x: f32, y: f32, palette: &Extended) {
    frame.fill_rectangle(
        Point::new(x - HANDLE_SIZE / 2.0, y - HANDLE_SIZE / 2.0),
        Size::new(HANDLE_SIZE, HANDLE_SIZE),
        palette.primary.strong.color,
    );
}

/// Rubber-band preview for the shape under construction.
pub fn draw_pending(
    frame: &mut Frame,
    state: &ViewState,
    region: &Rectangle,
    tool: AnnotationKind,
    pending: &[DrawingPoint],
    cursor: Point,
    palette: &Extended,
) {
    let color = with_alpha(palette.primary.strong.color, 0.8);
    let stroke = Stroke {
        line_dash: LineDash {
            segments: &DASH,
            offset: 0,
        },
        ..Stroke::default().with_color(color).with_width(1.0)
    };

    match (tool.point_count(), pending.first()) {
        // One-click tools preview at the cursor row.
        (1, _) => {
            frame.stroke(
                &Path::line(
                    Point::new(region.x, cursor.y),
                    Point::new(region.x + region.width, cursor.y),
                ),
                stroke,
            );
        }
        // Two-click tools rubber-band from the committed corner.
        (2, Some(first)) => {
            if let (Some(x0), Some(y0)) = (
                state.time_to_x(first.time),
                state.price_to_y(first.price),
            ) {
                let top_left = Point::new(x0.min(cursor.x), y0.min(cursor.y));
                let size = Size::new((cursor.x - x0).abs(), (cursor.y - y0).abs());
                frame.fill_rectangle(top_left, size, with_alpha(color, 0.08));
                frame.stroke(&Path::rectangle(top_left, size), stroke);
            }
        }
        _ => {}
    }
}

pub fn draw_crosshair(
    frame: &mut Frame,
    state: &ViewState,
    region: &Rectangle,
    cursor: Point,
    palette: &Extended,
) {
    // Snap the vertical guide to the nearest bar column.
    let snapped_x = state.index_to_x(state.x_to_index(cursor.x).round());
    let color = with_alpha(palette.background.base.text, 0.5);
    let stroke = Stroke {
        line_dash: LineDash {
            segments: &DASH,
            offset: 0,
        },
        ..Stroke::default().with_color(color).with_width(1.0)
    };

    frame.stroke(
        &Path::line(
            Point::new(snapped_x, region.y),
            Point::new(snapped_x, region.y + region.height),
        ),
        stroke.clone(),
    );
    frame.stroke(
        &Path::line(
            Point::new(region.x, cursor.y),
            Point::new(region.x + region.width, cursor.y),
        ),
        stroke,
    );
}

fn corner_pixels(state: &ViewState, points: &[DrawingPoint]) -> Option<(f32, f32, f32, f32)> {
    let x0 = state.time_to_x(points[0].time)?;
    let x1 = state.time_to_x(points[1].time)?;
    let y0 = state.price_to_y(points[0].price)?;
    let y1 = state.price_to_y(points[1].price)?;
    Some((x0, y0, x1, y1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_colors() {
        let c = parse_hex_color("#2962ff").unwrap();
        assert!((c.r - 41.0 / 255.0).abs() < 1e-6);
        assert!((c.a - 1.0).abs() < 1e-6);

        let translucent = parse_hex_color("#2962ff26").unwrap();
        assert!(translucent.a < 0.16);

        assert!(parse_hex_color("2962ff").is_none());
        assert!(parse_hex_color("#12345").is_none());
    }
}
