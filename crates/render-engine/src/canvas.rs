//! Drawing surface for the plot grid.
//!
//! The surface is a single RGB bitmap split into a grid of axes. Each axis
//! is addressed by its slot index (row-major). Static line plots are drawn
//! once with plotters; afterwards the plot area of every axis is captured
//! so per-frame updates only blit the background back and draw the
//! indicator line on top.

use image::{imageops, Rgb, RgbImage};
use imageproc::drawing::draw_line_segment_mut;
use plotters::prelude::*;
use syncplot_common::{SyncplotError, SyncplotResult};
use syncplot_data_model::Dimensions;

/// Margin between a grid cell's border and its plot area, in pixels.
const PLOT_MARGIN: u32 = 8;

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const INDICATOR: Rgb<u8> = Rgb([214, 39, 40]);
const FRAME: RGBColor = RGBColor(160, 160, 160);

/// Line colors, cycled per column.
const PALETTE: [RGBColor; 10] = [
    RGBColor(31, 119, 180),
    RGBColor(255, 127, 14),
    RGBColor(44, 160, 44),
    RGBColor(214, 39, 40),
    RGBColor(148, 103, 189),
    RGBColor(140, 86, 75),
    RGBColor(227, 119, 194),
    RGBColor(127, 127, 127),
    RGBColor(188, 189, 34),
    RGBColor(23, 190, 207),
];

/// A full-range line plot for one axis.
#[derive(Debug, Clone, PartialEq)]
pub struct StaticPlot {
    /// Time range in seconds.
    pub x_range: (f64, f64),
    pub y_range: (f64, f64),
    /// One polyline per column; non-finite points are skipped.
    pub lines: Vec<Vec<(f64, f64)>>,
}

/// Canvas operations needed by the graph renderers.
pub trait DrawingSurface {
    fn dimensions(&self) -> Dimensions;

    /// Number of axis slots in the grid.
    fn axis_count(&self) -> usize;

    /// Draw the static content of one axis.
    fn plot_static(&mut self, slot: usize, plot: &StaticPlot) -> SyncplotResult<()>;

    /// Remember the current plot-area pixels of an axis.
    fn capture_background(&mut self, slot: usize) -> SyncplotResult<()>;

    /// Blit the captured plot-area pixels back.
    fn restore_background(&mut self, slot: usize) -> SyncplotResult<()>;

    /// Draw the vertical indicator at time `x` (seconds).
    fn draw_indicator(&mut self, slot: usize, x: f64) -> SyncplotResult<()>;

    /// The whole grid as currently drawn.
    fn image(&self) -> &RgbImage;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PixelRect {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
}

#[derive(Debug, Clone)]
struct AxisSlot {
    rect: PixelRect,
    x_range: (f64, f64),
    background: Option<RgbImage>,
}

/// [`DrawingSurface`] backed by an in-memory RGB image.
pub struct BitmapSurface {
    image: RgbImage,
    rows: usize,
    columns: usize,
    slots: Vec<Option<AxisSlot>>,
}

impl BitmapSurface {
    pub fn new(dimensions: Dimensions, rows: usize, columns: usize) -> SyncplotResult<Self> {
        if dimensions.is_empty() {
            return Err(SyncplotError::render(format!(
                "cannot draw on a {dimensions} surface"
            )));
        }
        if rows == 0 || columns == 0 {
            return Err(SyncplotError::render(format!(
                "invalid plot grid {rows}x{columns}"
            )));
        }
        Ok(Self {
            image: RgbImage::from_pixel(dimensions.width, dimensions.height, BACKGROUND),
            rows,
            columns,
            slots: vec![None; rows * columns],
        })
    }

    fn slot(&self, slot: usize) -> SyncplotResult<&AxisSlot> {
        self.slots
            .get(slot)
            .and_then(Option::as_ref)
            .ok_or_else(|| SyncplotError::render(format!("axis {slot} has not been plotted")))
    }

    fn check_slot(&self, slot: usize) -> SyncplotResult<()> {
        if slot >= self.slots.len() {
            return Err(SyncplotError::render(format!(
                "axis {slot} is outside the {}x{} grid",
                self.rows, self.columns
            )));
        }
        Ok(())
    }
}

fn plot_error(e: impl std::fmt::Display) -> SyncplotError {
    SyncplotError::render(format!("plot drawing failed: {e}"))
}

fn draw_static(
    image: &mut RgbImage,
    grid: (usize, usize),
    slot: usize,
    plot: &StaticPlot,
) -> SyncplotResult<PixelRect> {
    let (width, height) = image.dimensions();
    let buffer: &mut [u8] = image;
    let root = BitMapBackend::with_buffer(buffer, (width, height)).into_drawing_area();
    let cells = root.split_evenly(grid);
    let cell = cells
        .get(slot)
        .ok_or_else(|| SyncplotError::render(format!("axis {slot} is outside the grid")))?;

    let (x0, x1) = plot.x_range;
    let (y0, y1) = plot.y_range;
    let mut chart = ChartBuilder::on(cell)
        .margin(PLOT_MARGIN)
        .build_cartesian_2d(x0..x1, y0..y1)
        .map_err(plot_error)?;

    chart
        .plotting_area()
        .draw(&Rectangle::new([(x0, y0), (x1, y1)], FRAME.stroke_width(1)))
        .map_err(plot_error)?;
    for (i, line) in plot.lines.iter().enumerate() {
        let points = line
            .iter()
            .copied()
            .filter(|(x, y)| x.is_finite() && y.is_finite());
        chart
            .draw_series(LineSeries::new(points, PALETTE[i % PALETTE.len()].stroke_width(1)))
            .map_err(plot_error)?;
    }

    let (xs, ys) = chart.plotting_area().get_pixel_range();
    root.present().map_err(plot_error)?;

    let clamp = |v: i32, max: u32| (v.max(0) as u32).min(max);
    let left = clamp(xs.start, width);
    let top = clamp(ys.start, height);
    Ok(PixelRect {
        x: left,
        y: top,
        width: clamp(xs.end, width).saturating_sub(left),
        height: clamp(ys.end, height).saturating_sub(top),
    })
}

impl DrawingSurface for BitmapSurface {
    fn dimensions(&self) -> Dimensions {
        Dimensions::from(self.image.dimensions())
    }

    fn axis_count(&self) -> usize {
        self.slots.len()
    }

    fn plot_static(&mut self, slot: usize, plot: &StaticPlot) -> SyncplotResult<()> {
        self.check_slot(slot)?;
        if !(plot.x_range.0 < plot.x_range.1 && plot.y_range.0 < plot.y_range.1) {
            return Err(SyncplotError::render(format!(
                "axis {slot} has an empty range: x {:?}, y {:?}",
                plot.x_range, plot.y_range
            )));
        }
        let rect = draw_static(&mut self.image, (self.rows, self.columns), slot, plot)?;
        self.slots[slot] = Some(AxisSlot {
            rect,
            x_range: plot.x_range,
            background: None,
        });
        Ok(())
    }

    fn capture_background(&mut self, slot: usize) -> SyncplotResult<()> {
        self.check_slot(slot)?;
        let rect = self.slot(slot)?.rect;
        let background =
            imageops::crop_imm(&self.image, rect.x, rect.y, rect.width, rect.height).to_image();
        if let Some(axis) = self.slots[slot].as_mut() {
            axis.background = Some(background);
        }
        Ok(())
    }

    fn restore_background(&mut self, slot: usize) -> SyncplotResult<()> {
        let axis = self.slot(slot)?;
        let rect = axis.rect;
        let background = axis.background.as_ref().ok_or_else(|| {
            SyncplotError::render(format!("axis {slot} has no captured background"))
        })?;
        // Axes never overlap, so the clone only costs one plot area.
        let background = background.clone();
        imageops::replace(&mut self.image, &background, rect.x as i64, rect.y as i64);
        Ok(())
    }

    fn draw_indicator(&mut self, slot: usize, x: f64) -> SyncplotResult<()> {
        let axis = self.slot(slot)?;
        let rect = axis.rect;
        if rect.width == 0 || rect.height == 0 {
            return Ok(());
        }
        let (x0, x1) = axis.x_range;
        let fraction = ((x - x0) / (x1 - x0)).clamp(0.0, 1.0);
        let px = rect.x as f32 + (fraction * (rect.width - 1) as f64) as f32;
        draw_line_segment_mut(
            &mut self.image,
            (px, rect.y as f32),
            (px, (rect.y + rect.height - 1) as f32),
            INDICATOR,
        );
        Ok(())
    }

    fn image(&self) -> &RgbImage {
        &self.image
    }
}

/// Value limits for an axis; a degenerate range is widened around its value.
pub(crate) fn axis_limits(range: Option<(f64, f64)>) -> (f64, f64) {
    match range {
        Some((lo, hi)) if hi > lo => (lo, hi),
        Some((lo, _)) => (lo - 0.5, lo + 0.5),
        None => (-1.0, 1.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine_plot() -> StaticPlot {
        let line = (0..100)
            .map(|i| {
                let t = i as f64 / 10.0;
                (t, t.sin())
            })
            .collect();
        StaticPlot {
            x_range: (0.0, 9.9),
            y_range: (-1.0, 1.0),
            lines: vec![line],
        }
    }

    #[test]
    fn test_background_restored_after_indicator_moves() {
        let mut surface = BitmapSurface::new(Dimensions::new(240, 120), 1, 2).unwrap();
        surface.plot_static(1, &sine_plot()).unwrap();
        surface.capture_background(1).unwrap();
        let clean = surface.image().clone();

        surface.draw_indicator(1, 3.0).unwrap();
        assert_ne!(surface.image(), &clean);

        surface.restore_background(1).unwrap();
        assert_eq!(surface.image(), &clean);

        surface.draw_indicator(1, 7.5).unwrap();
        surface.restore_background(1).unwrap();
        assert_eq!(surface.image(), &clean);
    }

    #[test]
    fn test_static_plot_stays_inside_its_cell() {
        let mut surface = BitmapSurface::new(Dimensions::new(200, 100), 1, 2).unwrap();
        surface.plot_static(0, &sine_plot()).unwrap();
        let image = surface.image();
        for y in 0..100 {
            for x in 100..200 {
                assert_eq!(image.get_pixel(x, y), &BACKGROUND, "pixel {x},{y}");
            }
        }
        assert!(image.pixels().any(|p| p != &BACKGROUND));
    }

    #[test]
    fn test_indicator_lands_in_plot_area() {
        let mut surface = BitmapSurface::new(Dimensions::new(120, 60), 1, 1).unwrap();
        surface.plot_static(0, &sine_plot()).unwrap();
        let rect = surface.slot(0).unwrap().rect;
        surface.draw_indicator(0, 0.0).unwrap();
        assert_eq!(surface.image().get_pixel(rect.x, rect.y + rect.height / 2), &INDICATOR);
    }

    #[test]
    fn test_slot_errors() {
        let mut surface = BitmapSurface::new(Dimensions::new(100, 100), 2, 2).unwrap();
        assert_eq!(surface.axis_count(), 4);
        assert!(surface.plot_static(4, &sine_plot()).is_err());
        assert!(surface.restore_background(0).is_err());
        surface.plot_static(0, &sine_plot()).unwrap();
        assert!(surface.restore_background(0).is_err());
        assert!(BitmapSurface::new(Dimensions::new(0, 10), 1, 1).is_err());
    }

    #[test]
    fn test_axis_limits_pad_degenerate_range() {
        assert_eq!(axis_limits(Some((1.0, 3.0))), (1.0, 3.0));
        assert_eq!(axis_limits(Some((2.0, 2.0))), (1.5, 2.5));
        assert_eq!(axis_limits(None), (-1.0, 1.0));
    }
}
