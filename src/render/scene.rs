//! What the render loop paints: a ball that rolls towards the side the board is
//! tilted to, and a gauge for the height relative to the first reading.

use std::time::Duration;
use embedded_graphics::mono_font::ascii::FONT_6X10;
use embedded_graphics::mono_font::MonoTextStyle;
use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{Circle, Line, PrimitiveStyle, Rectangle};
use embedded_graphics::text::{Alignment, Text};

use crate::device::types::SensorSample;
use crate::render::surface::Canvas;

/// Standard gravity (m/s²): a tilt of this much acceleration moves the ball to the edge.
const GRAVITY: f32 = 9.81;

/// Height difference (m) that fills the gauge completely.
const HEIGHT_RANGE: f32 = 2.0;

/// How quickly (per second) the ball closes the distance to its target.
const SMOOTHING: f32 = 8.0;

const GAUGE_WIDTH: u32 = 12;
const MARGIN: i32 = 8;

pub const BACKGROUND: Rgb888 = Rgb888::new(0x20, 0x24, 0x2a);
pub const BALL: Rgb888 = Rgb888::new(0xf0, 0x80, 0x20);
pub const NO_DATA: Rgb888 = Rgb888::new(0x80, 0x80, 0x80);
const CROSSHAIR: Rgb888 = Rgb888::new(0x50, 0x58, 0x60);
const GAUGE: Rgb888 = Rgb888::new(0x40, 0xc0, 0x60);
const TEXT: Rgb888 = Rgb888::new(0xe0, 0xe0, 0xe0);

#[derive(Debug, Default)]
pub struct Scene {
    // ball center as a fraction of the free area, [-1, 1] on both axes
    ball: Option<(f32, f32)>,
    baseline_height: Option<f32>,
}

impl Scene {
    pub fn new() -> Self {
        Scene::default()
    }

    pub fn paint(&mut self, canvas: &mut Canvas, sample: Option<SensorSample>, elapsed: Duration) {
        match sample {
            None => paint_no_data(canvas),
            Some(sample) => self.paint_sample(canvas, sample, elapsed),
        }
    }

    fn ball_radius(size: Size) -> u32 {
        (size.width.min(size.height) / 16).max(3)
    }

    fn paint_sample(&mut self, canvas: &mut Canvas, sample: SensorSample, elapsed: Duration) {
        let size = OriginDimensions::size(canvas);
        let _ = canvas.clear(BACKGROUND);

        let target = (
            (-sample.x / GRAVITY).clamp(-1.0, 1.0),
            (sample.y / GRAVITY).clamp(-1.0, 1.0),
        );
        let ball = match self.ball {
            None => target,
            Some((x, y)) => {
                let factor = (elapsed.as_secs_f32() * SMOOTHING).min(1.0);
                (x + (target.0 - x) * factor, y + (target.1 - y) * factor)
            },
        };
        self.ball = Some(ball);

        let baseline = *self.baseline_height.get_or_insert(sample.height);
        let relative_height = sample.height - baseline;

        let play_width = size.width.saturating_sub(GAUGE_WIDTH + MARGIN as u32 * 2);
        let center = Point::new(play_width as i32 / 2, size.height as i32 / 2);
        let radius = Scene::ball_radius(size);

        let _ = Line::new(Point::new(0, center.y), Point::new(play_width as i32, center.y))
            .into_styled(PrimitiveStyle::with_stroke(CROSSHAIR, 1))
            .draw(canvas);
        let _ = Line::new(Point::new(center.x, 0), Point::new(center.x, size.height as i32))
            .into_styled(PrimitiveStyle::with_stroke(CROSSHAIR, 1))
            .draw(canvas);

        let reach_x = (play_width as i32 / 2 - radius as i32).max(0) as f32;
        let reach_y = (size.height as i32 / 2 - radius as i32).max(0) as f32;
        let ball_center = Point::new(
            center.x + (ball.0 * reach_x).round() as i32,
            center.y + (ball.1 * reach_y).round() as i32,
        );
        let _ = Circle::with_center(ball_center, radius * 2 + 1)
            .into_styled(PrimitiveStyle::with_fill(BALL))
            .draw(canvas);

        paint_gauge(canvas, size, relative_height);

        let readout = format!(
            "x {:6.2}  y {:6.2}  z {:6.2}  h {:+.2}",
            sample.x, sample.y, sample.z, relative_height,
        );
        let _ = Text::new(&readout, Point::new(MARGIN, MARGIN + 6), MonoTextStyle::new(&FONT_6X10, TEXT))
            .draw(canvas);
    }
}

fn paint_gauge(canvas: &mut Canvas, size: Size, relative_height: f32) {
    let left = size.width as i32 - MARGIN - GAUGE_WIDTH as i32;
    let top = MARGIN;
    let bottom = size.height as i32 - MARGIN;
    if bottom <= top || left < 0 {
        return;
    }

    let _ = Rectangle::new(Point::new(left, top), Size::new(GAUGE_WIDTH, (bottom - top) as u32))
        .into_styled(PrimitiveStyle::with_stroke(CROSSHAIR, 1))
        .draw(canvas);

    // zero in the middle, rising above it when the board is lifted
    let middle = (top + bottom) / 2;
    let fraction = (relative_height / HEIGHT_RANGE).clamp(-1.0, 1.0);
    let extent = ((bottom - top) as f32 / 2.0 * fraction).round() as i32;
    let (bar_top, bar_bottom) = if extent >= 0 { (middle - extent, middle) } else { (middle, middle - extent) };

    if bar_bottom > bar_top {
        let _ = Rectangle::new(Point::new(left + 2, bar_top), Size::new(GAUGE_WIDTH - 4, (bar_bottom - bar_top) as u32))
            .into_styled(PrimitiveStyle::with_fill(GAUGE))
            .draw(canvas);
    }
}

/// The frame shown before the first sample arrives.
pub fn paint_no_data(canvas: &mut Canvas) {
    let size = OriginDimensions::size(canvas);
    let _ = canvas.clear(BACKGROUND);

    let center = Point::new(size.width as i32 / 2, size.height as i32 / 2);
    let radius = Scene::ball_radius(size);

    let _ = Circle::with_center(center, radius * 2 + 1)
        .into_styled(PrimitiveStyle::with_stroke(NO_DATA, 2))
        .draw(canvas);

    let _ = Text::with_alignment(
        "Waiting for sensor data",
        center + Point::new(0, radius as i32 + 16),
        MonoTextStyle::new(&FONT_6X10, NO_DATA),
        Alignment::Center,
    )
    .draw(canvas);
}
