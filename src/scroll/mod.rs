//! Source-line to pixel mapping for the rendered preview.
//!
//! The browser renders the document with variable line heights, so the
//! editor's cursor line cannot be turned into a scroll position by
//! multiplication. Instead the rendered elements that carry a source line
//! are measured, and [`compute_offsets`] builds a table with one vertical
//! offset per source line:
//!
//! ```
//! use tandem::scroll::{compute_offsets, LineAnchor, MeasuredContainer, MeasuredContent};
//!
//! let container = MeasuredContainer { top: 100.0, scroll_top: 0.0 };
//! let content = MeasuredContent {
//!     line_count: 4,
//!     anchors: vec![
//!         LineAnchor { line: 0, top: 100.0 },
//!         LineAnchor { line: 2, top: 160.0 },
//!     ],
//! };
//! assert_eq!(compute_offsets(&container, &content), vec![0.0, 0.0, 60.0, 60.0]);
//! ```
//!
//! The DOM side lives in the browser bundle; it implements
//! [`ScrollContainer`] and [`RenderedContent`] over real elements.

use crate::config::SyncScrollMode;

/// A rendered element whose top edge corresponds to a source line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineAnchor {
    /// 0-based source line
    pub line: usize,
    /// Top edge in viewport coordinates
    pub top: f64,
}

/// The scrolling element that hosts the rendered document.
pub trait ScrollContainer {
    /// Top edge in viewport coordinates
    fn top(&self) -> f64;
    fn scroll_top(&self) -> f64;
}

/// The rendered document inside the container.
pub trait RenderedContent {
    /// Number of source lines that were rendered
    fn line_count(&self) -> usize;
    /// Measured anchors, in any order
    fn anchors(&self) -> Vec<LineAnchor>;
}

/// Plain measurements, for callers that already collected them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeasuredContainer {
    pub top: f64,
    pub scroll_top: f64,
}

impl ScrollContainer for MeasuredContainer {
    fn top(&self) -> f64 {
        self.top
    }

    fn scroll_top(&self) -> f64 {
        self.scroll_top
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeasuredContent {
    pub line_count: usize,
    pub anchors: Vec<LineAnchor>,
}

impl RenderedContent for MeasuredContent {
    fn line_count(&self) -> usize {
        self.line_count
    }

    fn anchors(&self) -> Vec<LineAnchor> {
        self.anchors.clone()
    }
}

/// Build the per-line offset table, relative to the container's scroll
/// origin.
///
/// Lines without an anchor inherit the previous line's offset (0 before
/// the first anchor). When several anchors share a line the topmost wins.
/// The table never decreases.
pub fn compute_offsets(
    container: &impl ScrollContainer,
    content: &impl RenderedContent,
) -> Vec<f64> {
    let line_count = content.line_count();
    let origin = container.top() - container.scroll_top();

    let mut measured: Vec<Option<f64>> = vec![None; line_count];
    for anchor in content.anchors() {
        let Some(slot) = measured.get_mut(anchor.line) else {
            continue;
        };
        if !anchor.top.is_finite() {
            continue;
        }
        let offset = anchor.top - origin;
        *slot = Some(slot.map_or(offset, |existing| existing.min(offset)));
    }

    let mut running = 0.0_f64;
    measured
        .into_iter()
        .map(|offset| {
            if let Some(offset) = offset {
                running = running.max(offset);
            }
            running
        })
        .collect()
}

/// Offset table that is rebuilt when the rendered content changes size.
#[derive(Debug, Clone, Default)]
pub struct OffsetTracker {
    offsets: Vec<f64>,
    measured_height: Option<f64>,
}

impl OffsetTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn offsets(&self) -> &[f64] {
        &self.offsets
    }

    /// Handle a size-change notification for the content element.
    ///
    /// Returns true when the table was rebuilt. A notification reporting
    /// the height already measured is ignored.
    pub fn on_resize(
        &mut self,
        content_height: f64,
        container: &impl ScrollContainer,
        content: &impl RenderedContent,
    ) -> bool {
        if self.measured_height == Some(content_height) {
            return false;
        }
        self.measured_height = Some(content_height);
        self.offsets = compute_offsets(container, content);
        true
    }

    /// Forget the measured height so the next notification rebuilds.
    pub const fn invalidate(&mut self) {
        self.measured_height = None;
    }
}

/// Offset of the cursor indicator, clamped to the last line.
pub fn indicator_offset(offsets: &[f64], cursor_line: Option<usize>) -> Option<f64> {
    let line = cursor_line?;
    let last = offsets.len().checked_sub(1)?;
    Some(offsets[line.min(last)])
}

/// Scroll position that places the cursor line according to `mode`.
///
/// `top_offset_pct` is the fraction of the editor window above the cursor;
/// without it, relative mode behaves like middle.
pub fn scroll_target(
    offsets: &[f64],
    cursor_line: Option<usize>,
    mode: SyncScrollMode,
    viewport_height: f64,
    top_offset_pct: Option<f64>,
) -> Option<f64> {
    let offset = indicator_offset(offsets, cursor_line)?;
    let above = match mode {
        SyncScrollMode::Top => 0.0,
        SyncScrollMode::Middle => viewport_height / 2.0,
        SyncScrollMode::Relative => {
            viewport_height * top_offset_pct.map_or(0.5, |pct| pct.clamp(0.0, 1.0))
        }
    };
    Some((offset - above).max(0.0))
}

/// The source line shown at scroll offset `y`: the last line whose offset
/// is not below `y`.
pub fn line_at_offset(offsets: &[f64], y: f64) -> Option<usize> {
    if offsets.is_empty() {
        return None;
    }
    let after = offsets.partition_point(|&offset| offset <= y);
    Some(after.saturating_sub(1))
}
