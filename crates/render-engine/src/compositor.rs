//! Frame compositor: combines a video frame with the plot grid.
//!
//! Output geometry is fixed for the whole run and derived from the source
//! video size, the stacking direction and the number of plot axes.

use image::{imageops, RgbImage};
use syncplot_common::{SyncplotError, SyncplotResult};
use syncplot_data_model::{Dimensions, StackingDirection};

/// Height of one plot axis in the vertical layout, in pixels.
pub const PLOT_ROW_HEIGHT: u32 = 200;

/// Geometry of one render run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutPlan {
    pub direction: StackingDirection,
    pub video: Dimensions,
    /// Size of the plot grid image.
    pub plot: Dimensions,
    /// Size of every output frame.
    pub output: Dimensions,
    pub rows: usize,
    pub columns: usize,
}

impl LayoutPlan {
    pub fn new(
        direction: StackingDirection,
        video: Dimensions,
        axis_count: usize,
        column_count: usize,
    ) -> SyncplotResult<Self> {
        if axis_count == 0 {
            return Err(SyncplotError::config("nothing to plot: no graph axes"));
        }
        if column_count == 0 {
            return Err(SyncplotError::config("plot column count must be positive"));
        }
        if video.is_empty() {
            return Err(SyncplotError::data(format!("invalid video size {video}")));
        }
        // The column count is fixed; trailing slots of the last row stay blank.
        let columns = column_count;
        let rows = axis_count.div_ceil(columns);

        let (plot, output) = match direction {
            StackingDirection::Vertical => {
                let plot_height = u32::try_from(axis_count)
                    .ok()
                    .and_then(|n| n.checked_mul(PLOT_ROW_HEIGHT))
                    .ok_or_else(|| SyncplotError::config(format!("too many plot axes ({axis_count})")))?;
                (
                    Dimensions::new(video.width, plot_height),
                    Dimensions::new(video.width, video.height + plot_height),
                )
            }
            StackingDirection::Horizontal => (
                Dimensions::new(video.width, video.height),
                Dimensions::new(video.width / 2 + video.width, video.height),
            ),
        };

        Ok(Self {
            direction,
            video,
            plot,
            output,
            rows,
            columns,
        })
    }

    /// Number of axis slots in the grid (may exceed the axes in use).
    pub fn slot_count(&self) -> usize {
        self.rows * self.columns
    }

    /// A blank output frame.
    pub fn blank_output(&self) -> RgbImage {
        RgbImage::new(self.output.width, self.output.height)
    }

    /// Compose `video` and `plot` into `out`.
    ///
    /// Vertical: the plot grid sits below the video. Horizontal: the left
    /// half of the plot grid, then the centre half of the video, then the
    /// right half of the plot grid.
    pub fn compose(&self, video: &RgbImage, plot: &RgbImage, out: &mut RgbImage) -> SyncplotResult<()> {
        expect_size("video frame", self.video, video)?;
        expect_size("plot image", self.plot, plot)?;
        expect_size("output frame", self.output, out)?;

        match self.direction {
            StackingDirection::Vertical => {
                imageops::replace(out, video, 0, 0);
                imageops::replace(out, plot, 0, self.video.height as i64);
            }
            StackingDirection::Horizontal => {
                let plot_left = self.plot.width / 2;
                let plot_right = self.plot.width - plot_left;
                let video_half = self.video.width / 2;
                let video_start = self.video.width / 4;
                let height = self.video.height;

                let left = imageops::crop_imm(plot, 0, 0, plot_left, height).to_image();
                let centre = imageops::crop_imm(video, video_start, 0, video_half, height).to_image();
                let right = imageops::crop_imm(plot, plot_left, 0, plot_right, height).to_image();

                imageops::replace(out, &left, 0, 0);
                imageops::replace(out, &centre, plot_left as i64, 0);
                imageops::replace(out, &right, (plot_left + video_half) as i64, 0);
            }
        }
        Ok(())
    }
}

fn expect_size(what: &str, expected: Dimensions, image: &RgbImage) -> SyncplotResult<()> {
    let actual = Dimensions::from(image.dimensions());
    if actual != expected {
        return Err(SyncplotError::render(format!(
            "{what} is {actual}, layout expects {expected}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    const RED: Rgb<u8> = Rgb([255, 0, 0]);
    const BLUE: Rgb<u8> = Rgb([0, 0, 255]);

    #[test]
    fn test_vertical_dimensions() {
        let plan = LayoutPlan::new(StackingDirection::Vertical, Dimensions::new(640, 480), 3, 2).unwrap();
        assert_eq!(plan.plot, Dimensions::new(640, 600));
        assert_eq!(plan.output, Dimensions::new(640, 1080));
        assert_eq!((plan.rows, plan.columns), (2, 2));
    }

    #[test]
    fn test_horizontal_dimensions() {
        let plan = LayoutPlan::new(StackingDirection::Horizontal, Dimensions::new(640, 480), 5, 2).unwrap();
        assert_eq!(plan.plot, Dimensions::new(640, 480));
        assert_eq!(plan.output, Dimensions::new(960, 480));
        assert_eq!((plan.rows, plan.columns), (3, 2));
    }

    #[test]
    fn test_fewer_axes_than_columns_keeps_column_count() {
        let plan = LayoutPlan::new(StackingDirection::Horizontal, Dimensions::new(64, 48), 1, 2).unwrap();
        assert_eq!((plan.rows, plan.columns), (1, 2));
        assert_eq!(plan.slot_count(), 2);
    }

    #[test]
    fn test_rejects_empty_grid() {
        let video = Dimensions::new(64, 48);
        assert!(LayoutPlan::new(StackingDirection::Vertical, video, 0, 2).is_err());
        assert!(LayoutPlan::new(StackingDirection::Vertical, video, 2, 0).is_err());
    }

    #[test]
    fn test_vertical_compose_places_plot_below_video() {
        let plan = LayoutPlan::new(StackingDirection::Vertical, Dimensions::new(8, 4), 1, 2).unwrap();
        let video = RgbImage::from_pixel(8, 4, RED);
        let plot = RgbImage::from_pixel(8, PLOT_ROW_HEIGHT, BLUE);
        let mut out = plan.blank_output();
        plan.compose(&video, &plot, &mut out).unwrap();
        assert_eq!(out.get_pixel(7, 3), &RED);
        assert_eq!(out.get_pixel(0, 4), &BLUE);
        assert_eq!(out.get_pixel(7, 4 + PLOT_ROW_HEIGHT - 1), &BLUE);
    }

    #[test]
    fn test_horizontal_compose_splits_plot_around_video_centre() {
        let plan = LayoutPlan::new(StackingDirection::Horizontal, Dimensions::new(8, 2), 2, 2).unwrap();
        // Video columns encode their x coordinate; plot columns are offset by 100.
        let video = RgbImage::from_fn(8, 2, |x, _| Rgb([x as u8, 0, 0]));
        let plot = RgbImage::from_fn(8, 2, |x, _| Rgb([100 + x as u8, 0, 0]));
        let mut out = plan.blank_output();
        plan.compose(&video, &plot, &mut out).unwrap();

        let row: Vec<u8> = (0..12).map(|x| out.get_pixel(x, 1)[0]).collect();
        assert_eq!(row, vec![100, 101, 102, 103, 2, 3, 4, 5, 104, 105, 106, 107]);
    }

    #[test]
    fn test_compose_rejects_wrong_sizes() {
        let plan = LayoutPlan::new(StackingDirection::Vertical, Dimensions::new(8, 4), 1, 1).unwrap();
        let mut out = plan.blank_output();
        let plot = RgbImage::new(8, PLOT_ROW_HEIGHT);
        assert!(plan.compose(&RgbImage::new(4, 4), &plot, &mut out).is_err());
    }
}
