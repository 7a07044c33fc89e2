//! Algorithm for finding local extrema in an N-dimensional grid under
//! configurable geometric and intensity criteria.
//!
//!
use log::debug;

use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::grid::GridView;
use crate::peak::PeakCandidate;
use crate::peak_statistics::axis_linewidth;

/// An axis-aligned box of grid points to skip while searching. The test
/// is closed on both ends.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RectExclusion {
    pub lo: Vec<i32>,
    pub hi: Vec<i32>,
}

impl RectExclusion {
    pub fn new(lo: Vec<i32>, hi: Vec<i32>) -> Self {
        Self { lo, hi }
    }

    fn contains(&self, point: &[i32]) -> bool {
        point
            .iter()
            .zip(self.lo.iter().zip(self.hi.iter()))
            .all(|(p, (lo, hi))| lo <= p && p <= hi)
    }
}

/// A band around the diagonal of two axes to skip while searching, as
/// used to suppress the solvent diagonal of homonuclear spectra:
/// points with `|a_i * p_i - a_j * p_j + b| <= delta` are excluded.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DiagExclusion {
    pub dims: (usize, usize),
    pub a_i: f32,
    pub a_j: f32,
    pub b: f32,
    pub delta: f32,
}

impl DiagExclusion {
    fn excludes(&self, point: &[i32]) -> bool {
        let p_i = point[self.dims.0] as f32;
        let p_j = point[self.dims.1] as f32;
        (self.a_i * p_i - self.a_j * p_j + self.b).abs() <= self.delta
    }
}

/// All the ways peak finding can fail
#[derive(Debug, Clone, Error)]
pub enum PeakFindError {
    #[error("criterion shape does not match the grid rank: {0}")]
    InvalidShape(&'static str),
    #[error("invalid peak criterion: {0}")]
    InvalidCriterion(&'static str),
}

/// A peak finder for N-dimensional spectra
///
/// Candidate points pass through a fixed stack of gates: an intensity
/// threshold, the exclusion rules, a local-extremum test against either
/// the 2N axis neighbors or the full unit cube, a drop test along every
/// axis half-line, a minimum linewidth test, and finally a buffer test
/// against the peaks already accepted.
#[derive(Debug, Clone, Default)]
pub struct PeakFinder {
    pub seek_maxima: bool,
    pub seek_minima: bool,
    /// Minimum height for maxima.
    pub high: f32,
    /// Maximum height for minima.
    pub low: f32,
    /// Per-axis exclusion distance around accepted peaks; empty means 0.
    pub buffer: Vec<i32>,
    /// Test all `3^N - 1` cube neighbors instead of the 2N adjacent ones.
    pub nonadjacent: bool,
    /// Fraction of the peak height nearby samples must fall away by.
    pub drop_factor: f32,
    /// Per-axis minimum full width at half height; empty means 0.
    pub min_linewidth: Vec<f32>,
    pub rect_exclusions: Vec<RectExclusion>,
    pub diag_exclusions: Vec<DiagExclusion>,
}

/// A builder for configuring [`PeakFinder`]
#[derive(Debug, Clone, Default)]
pub struct PeakFinderBuilder {
    finder: PeakFinder,
}

impl PeakFinderBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Search for maxima at or above `high`.
    pub fn seek_maxima(mut self, high: f32) -> Self {
        self.finder.seek_maxima = true;
        self.finder.high = high;
        self
    }

    /// Search for minima at or below `low`.
    pub fn seek_minima(mut self, low: f32) -> Self {
        self.finder.seek_minima = true;
        self.finder.low = low;
        self
    }

    pub fn buffer(mut self, buffer: Vec<i32>) -> Self {
        self.finder.buffer = buffer;
        self
    }

    pub fn nonadjacent(mut self, nonadjacent: bool) -> Self {
        self.finder.nonadjacent = nonadjacent;
        self
    }

    pub fn drop_factor(mut self, drop_factor: f32) -> Self {
        self.finder.drop_factor = drop_factor;
        self
    }

    pub fn min_linewidth(mut self, min_linewidth: Vec<f32>) -> Self {
        self.finder.min_linewidth = min_linewidth;
        self
    }

    pub fn exclude_rect(mut self, exclusion: RectExclusion) -> Self {
        self.finder.rect_exclusions.push(exclusion);
        self
    }

    pub fn exclude_diagonal(mut self, exclusion: DiagExclusion) -> Self {
        self.finder.diag_exclusions.push(exclusion);
        self
    }

    pub fn build(self) -> PeakFinder {
        self.finder
    }
}

impl PeakFinder {
    pub fn builder() -> PeakFinderBuilder {
        PeakFinderBuilder::new()
    }

    /// Scan `grid` for peaks under the configured criteria.
    ///
    /// Points are visited in lexicographic order (last axis fastest), so
    /// the buffer gate's "already accepted" set is deterministic. The
    /// one-sample border of the grid is never a candidate.
    pub fn find_peaks(&self, grid: &GridView<'_>) -> Result<Vec<PeakCandidate>, PeakFindError> {
        let rank = grid.rank();
        let buffer = per_axis_or_default(&self.buffer, rank, 0i32)?;
        let min_linewidth = per_axis_or_default(&self.min_linewidth, rank, 0.0f32)?;
        if buffer.iter().any(|b| *b < 0) {
            return Err(PeakFindError::InvalidCriterion("buffer must be >= 0"));
        }
        if min_linewidth.iter().any(|w| *w < 0.0) {
            return Err(PeakFindError::InvalidCriterion("min_linewidth must be >= 0"));
        }
        if !(0.0..1.0).contains(&self.drop_factor) {
            return Err(PeakFindError::InvalidCriterion(
                "drop_factor must lie in [0, 1)",
            ));
        }
        for rect in &self.rect_exclusions {
            if rect.lo.len() != rank || rect.hi.len() != rank {
                return Err(PeakFindError::InvalidShape(
                    "rectangular exclusions must have one bound per axis",
                ));
            }
        }
        for diag in &self.diag_exclusions {
            if diag.dims.0 >= rank || diag.dims.1 >= rank {
                return Err(PeakFindError::InvalidCriterion(
                    "diagonal exclusion dimensions out of range",
                ));
            }
        }

        let mut peaks = Vec::new();
        if !self.seek_maxima && !self.seek_minima {
            return Ok(peaks);
        }
        // No interior points to test on a degenerate axis.
        if grid.shape().iter().any(|n| *n < 3) {
            return Ok(peaks);
        }

        let shape: Vec<i32> = grid.shape().iter().map(|n| *n as i32).collect();
        let mut point: Vec<i32> = vec![1; rank];
        loop {
            self.consider(grid, &point, &shape, &buffer, &min_linewidth, &mut peaks);

            // Advance the interior odometer, last axis fastest.
            let mut axis = rank;
            loop {
                if axis == 0 {
                    debug!("found {} peaks", peaks.len());
                    return Ok(peaks);
                }
                axis -= 1;
                point[axis] += 1;
                if point[axis] < shape[axis] - 1 {
                    break;
                }
                point[axis] = 1;
            }
        }
    }

    fn consider(
        &self,
        grid: &GridView<'_>,
        point: &[i32],
        shape: &[i32],
        buffer: &[i32],
        min_linewidth: &[f32],
        peaks: &mut Vec<PeakCandidate>,
    ) {
        let v = grid.value_at(point);

        let find_maximum = if self.seek_maxima && v >= self.high {
            true
        } else if self.seek_minima && v <= self.low {
            false
        } else {
            return;
        };

        if self.rect_exclusions.iter().any(|r| r.contains(point)) {
            return;
        }
        if self.diag_exclusions.iter().any(|d| d.excludes(point)) {
            return;
        }

        let extremum = if self.nonadjacent {
            self.is_cube_extremum(grid, point, v, find_maximum)
        } else {
            self.is_adjacent_extremum(grid, point, v, find_maximum)
        };
        if !extremum {
            return;
        }

        if !self.check_drop(grid, point, shape, v, find_maximum) {
            return;
        }

        for (axis, minlw) in min_linewidth.iter().enumerate() {
            if *minlw > 0.0 && axis_linewidth(grid, point, axis, v, find_maximum) < *minlw {
                return;
            }
        }

        let buffered = peaks.iter().any(|q| {
            point
                .iter()
                .zip(q.position.iter().zip(buffer.iter()))
                .all(|(p, (qp, b))| (p - qp).abs() <= *b)
        });
        if buffered {
            return;
        }

        peaks.push(PeakCandidate::new(point.to_vec(), v));
    }

    /// Compare against the two neighbors offset by one sample on each
    /// axis. Ties are accepted so flat-topped peaks survive; the drop
    /// gate is what breaks them.
    fn is_adjacent_extremum(
        &self,
        grid: &GridView<'_>,
        point: &[i32],
        v: f32,
        find_maximum: bool,
    ) -> bool {
        let mut neighbor = point.to_vec();
        for axis in 0..point.len() {
            for offset in [-1, 1] {
                neighbor[axis] = point[axis] + offset;
                let v2 = grid.value_at(&neighbor);
                if (find_maximum && v2 > v) || (!find_maximum && v2 < v) {
                    return false;
                }
            }
            neighbor[axis] = point[axis];
        }
        true
    }

    /// Compare against all `3^N - 1` neighbors in the unit cube.
    fn is_cube_extremum(
        &self,
        grid: &GridView<'_>,
        point: &[i32],
        v: f32,
        find_maximum: bool,
    ) -> bool {
        let rank = point.len();
        let mut delta = vec![-1i32; rank];
        loop {
            if delta.iter().any(|d| *d != 0) {
                let neighbor: Vec<i32> = point.iter().zip(delta.iter()).map(|(p, d)| p + d).collect();
                let v2 = grid.value_at(&neighbor);
                if (find_maximum && v2 > v) || (!find_maximum && v2 < v) {
                    return false;
                }
            }
            let mut axis = rank;
            loop {
                if axis == 0 {
                    return true;
                }
                axis -= 1;
                delta[axis] += 1;
                if delta[axis] <= 1 {
                    break;
                }
                delta[axis] = -1;
            }
        }
    }

    /// The intensity must fall away by `drop_factor * |v|` along every
    /// axis half-line out of the peak, without first moving back toward
    /// the peak value. Running off the grid edge counts as falling away.
    fn check_drop(
        &self,
        grid: &GridView<'_>,
        point: &[i32],
        shape: &[i32],
        v_peak: f32,
        find_maximum: bool,
    ) -> bool {
        if self.drop_factor <= 0.0 {
            return true;
        }
        let drop_value = self.drop_factor * v_peak.abs();
        for axis in 0..point.len() {
            for direction in [1i32, -1] {
                if !self.drops_along(
                    grid, point, shape, axis, direction, v_peak, drop_value, find_maximum,
                ) {
                    return false;
                }
            }
        }
        true
    }

    #[allow(clippy::too_many_arguments)]
    fn drops_along(
        &self,
        grid: &GridView<'_>,
        point: &[i32],
        shape: &[i32],
        axis: usize,
        direction: i32,
        v_peak: f32,
        drop_value: f32,
        find_maximum: bool,
    ) -> bool {
        let mut probe = point.to_vec();
        let mut v_prev = v_peak;
        let mut i = point[axis] + direction;
        while i >= 0 && i < shape[axis] {
            probe[axis] = i;
            let v_this = grid.value_at(&probe);
            if find_maximum {
                if v_this > v_prev {
                    return false;
                }
                if (v_peak - v_this) >= drop_value {
                    return true;
                }
            } else {
                if v_this < v_prev {
                    return false;
                }
                if (v_this - v_peak) >= drop_value {
                    return true;
                }
            }
            v_prev = v_this;
            i += direction;
        }
        true
    }
}

fn per_axis_or_default<T: Copy>(
    values: &[T],
    rank: usize,
    fill: T,
) -> Result<Vec<T>, PeakFindError> {
    if values.is_empty() {
        Ok(vec![fill; rank])
    } else if values.len() == rank {
        Ok(values.to_vec())
    } else {
        Err(PeakFindError::InvalidShape(
            "per-axis criteria must have one entry per grid axis",
        ))
    }
}
