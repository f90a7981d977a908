//! Per-stream graph rendering.
//!
//! A [`GraphRenderer`] owns one sensor stream and draws it onto a
//! contiguous range of axis slots of a [`DrawingSurface`]:
//!
//! ```text
//! Unconfigured ──bind_axes──▶ AxesBound ──render_at──▶ Ready ─┐
//!                                                       ▲      │
//!                                                       └──────┘ render_at
//! ```
//!
//! The stream's time index is moved onto the video clock by `apply_offset`,
//! which may run only once and only before the axes are bound.

use std::ops::Range;

use chrono::TimeDelta;
use syncplot_common::{offset_as_secs, offset_from_secs, SyncplotError, SyncplotResult, Timestamp};
use syncplot_data_model::{resolve_groups, GraphGroup, GroupPattern, PlottingMethod, SensorSync, TimeSeries};
use syncplot_signal_core::signal::magnitude;

use crate::canvas::{axis_limits, DrawingSurface, StaticPlot};

/// Lifecycle of a renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RendererState {
    Unconfigured,
    AxesBound { slots: Range<usize> },
    Ready { slots: Range<usize> },
}

/// Draws one sensor stream as a set of axes with a moving time indicator.
#[derive(Debug, Clone)]
pub struct GraphRenderer {
    name: String,
    series: TimeSeries,
    sync: SensorSync,
    groups: Vec<GraphGroup>,
    add_magnitude: bool,
    /// Offset applied to the time index; set once.
    applied_offset: Option<TimeDelta>,
    state: RendererState,
}

impl GraphRenderer {
    pub fn new(
        name: impl Into<String>,
        series: TimeSeries,
        sync: SensorSync,
        patterns: Option<&[GroupPattern]>,
        method: PlottingMethod,
        add_magnitude: bool,
    ) -> SyncplotResult<Self> {
        let name = name.into();
        match method {
            PlottingMethod::MovingVerticalLine => {}
            PlottingMethod::PushIn => {
                return Err(SyncplotError::unsupported(format!(
                    "{name}: plotting method PUSH_IN is not implemented"
                )))
            }
        }
        let groups = resolve_groups(series.columns(), patterns)?;
        for group in groups.iter().filter(|g| g.columns.is_empty()) {
            tracing::warn!(stream = %name, group = %group.name, "Graph group matches no columns");
        }
        Ok(Self {
            name,
            series,
            sync,
            groups,
            add_magnitude,
            applied_offset: None,
            state: RendererState::Unconfigured,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn series(&self) -> &TimeSeries {
        &self.series
    }

    pub fn sync(&self) -> &SensorSync {
        &self.sync
    }

    pub fn groups(&self) -> &[GraphGroup] {
        &self.groups
    }

    /// Number of axes this renderer needs.
    pub fn axis_count(&self) -> usize {
        self.groups.len()
    }

    pub fn state(&self) -> &RendererState {
        &self.state
    }

    pub fn applied_offset(&self) -> Option<TimeDelta> {
        self.applied_offset
    }

    /// Whether the stream needs an offset computed from the video's data.
    pub fn needs_synchronization(&self) -> bool {
        !matches!(self.sync, SensorSync::Manual { .. })
    }

    /// Columns of this stream that are cross-correlated with the video's
    /// reference signal, or `None` for a manually offset stream.
    pub fn sync_series(&self) -> SyncplotResult<Option<TimeSeries>> {
        match &self.sync {
            SensorSync::Manual { .. } => Ok(None),
            SensorSync::CameraImu { sensor_sync_column } => {
                self.series.select(sensor_sync_column).map(Some)
            }
            SensorSync::Joint {
                sensor_sync_axes, ..
            } => self.series.select(sensor_sync_axes).map(Some),
        }
    }

    /// Move the stream onto the video clock.
    ///
    /// A manually offset stream always uses its configured constant and
    /// ignores `offset`. Any other stream requires `Some`. Returns the
    /// offset that was applied.
    pub fn apply_offset(&mut self, offset: Option<TimeDelta>) -> SyncplotResult<TimeDelta> {
        if self.state != RendererState::Unconfigured {
            return Err(SyncplotError::config(format!(
                "{}: cannot shift a stream after its axes are bound",
                self.name
            )));
        }
        if let Some(applied) = self.applied_offset {
            return Err(SyncplotError::config(format!(
                "{}: offset already applied ({:.6}s)",
                self.name,
                offset_as_secs(applied)
            )));
        }

        let offset = match (&self.sync, offset) {
            (SensorSync::Manual { offset_seconds }, computed) => {
                if computed.is_some() {
                    tracing::debug!(
                        stream = %self.name,
                        "Ignoring computed offset for manually synced stream"
                    );
                }
                offset_from_secs(*offset_seconds)
            }
            (_, Some(offset)) => offset,
            (sync, None) => {
                return Err(SyncplotError::config(format!(
                    "{}: {} stream needs a computed offset",
                    self.name,
                    sync.kind()
                )))
            }
        };

        self.series.shift_index(offset);
        self.applied_offset = Some(offset);
        tracing::info!(
            stream = %self.name,
            offset_secs = offset_as_secs(offset),
            "Applied stream offset"
        );
        Ok(offset)
    }

    fn static_plot(&self, group: &GraphGroup, x_range: (f64, f64)) -> SyncplotResult<StaticPlot> {
        let mut plotted = self
            .series
            .select_columns(&group.columns)
            .map_err(|e| SyncplotError::data(format!("{}: {e}", self.name)))?;

        if self.add_magnitude && plotted.columns().len() == 3 {
            let values = magnitude(&plotted.to_rows())?;
            plotted = plotted.with_column(format!("|{}|", group.name), values)?;
        }

        let times: Vec<f64> = plotted.index().iter().map(|t| t.as_secs_f64()).collect();
        let lines = plotted
            .columns()
            .iter()
            .filter_map(|name| plotted.column(name))
            .map(|values| times.iter().copied().zip(values.iter().copied()).collect())
            .collect();

        Ok(StaticPlot {
            x_range,
            y_range: axis_limits(plotted.value_range(plotted.columns())),
            lines,
        })
    }

    /// Draw every group once onto `slots` and capture the backgrounds.
    ///
    /// A manually offset stream gets its constant applied here if that has
    /// not happened yet; any other stream must already be synchronized.
    pub fn bind_axes(
        &mut self,
        surface: &mut dyn DrawingSurface,
        slots: Range<usize>,
    ) -> SyncplotResult<()> {
        if self.state != RendererState::Unconfigured {
            return Err(SyncplotError::config(format!(
                "{}: axes are already bound",
                self.name
            )));
        }
        if slots.len() != self.groups.len() {
            return Err(SyncplotError::config(format!(
                "{}: {} axes given for {} graph groups",
                self.name,
                slots.len(),
                self.groups.len()
            )));
        }
        if slots.end > surface.axis_count() {
            return Err(SyncplotError::config(format!(
                "{}: axes {slots:?} exceed the surface's {} slots",
                self.name,
                surface.axis_count()
            )));
        }
        if self.applied_offset.is_none() {
            if self.needs_synchronization() {
                return Err(SyncplotError::config(format!(
                    "{}: stream has not been synchronized",
                    self.name
                )));
            }
            self.apply_offset(None)?;
        }

        let (first, last) = self
            .series
            .span()
            .ok_or_else(|| SyncplotError::data(format!("{}: stream is empty", self.name)))?;
        let x_range = axis_limits(Some((first.as_secs_f64(), last.as_secs_f64())));

        for (group, slot) in self.groups.iter().zip(slots.clone()) {
            let plot = self.static_plot(group, x_range)?;
            surface.plot_static(slot, &plot)?;
            surface.capture_background(slot)?;
        }

        tracing::debug!(
            stream = %self.name,
            axes = self.groups.len(),
            first_slot = slots.start,
            "Bound graph axes"
        );
        self.state = RendererState::AxesBound { slots };
        Ok(())
    }

    /// Move the indicator of every axis to the sample nearest `ts`.
    pub fn render_at(&mut self, surface: &mut dyn DrawingSurface, ts: Timestamp) -> SyncplotResult<()> {
        let slots = match &self.state {
            RendererState::Unconfigured => {
                return Err(SyncplotError::config(format!(
                    "{}: render_at called before bind_axes",
                    self.name
                )))
            }
            RendererState::AxesBound { slots } | RendererState::Ready { slots } => slots.clone(),
        };

        let index = self
            .series
            .nearest_index(ts)
            .ok_or_else(|| SyncplotError::data(format!("{}: stream is empty", self.name)))?;
        let x = self.series.index()[index].as_secs_f64();
        for slot in slots.clone() {
            surface.restore_background(slot)?;
            surface.draw_indicator(slot, x)?;
        }

        self.state = RendererState::Ready { slots };
        Ok(())
    }
}
