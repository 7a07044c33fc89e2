//! Helpful numerical functions for characterizing sampled peaks
//!
use num_traits::{Float, FromPrimitive};

use crate::grid::GridView;

pub(crate) fn _isclose<T>(x: T, y: T, rtol: T, atol: T) -> bool
where
    T: Float,
{
    (x - y).abs() <= (atol + rtol * y.abs())
}

pub(crate) fn isclose<T>(x: T, y: T) -> bool
where
    T: Float + FromPrimitive,
{
    _isclose(x, y, T::from_f64(1e-5).unwrap(), T::from_f64(1e-8).unwrap())
}

pub(crate) fn aboutzero<T>(x: T) -> bool
where
    T: Float + FromPrimitive,
{
    isclose(x, T::zero())
}

/// A parabola `y = a x^2 + b x + c` fit through three equally spaced
/// samples at x = -1, 0, 1.
#[derive(Debug, Default, Clone, Copy)]
pub struct Parabola3 {
    pub a: f32,
    pub b: f32,
    pub c: f32,
}

impl Parabola3 {
    pub fn from_samples(v_left: f32, v_middle: f32, v_right: f32) -> Self {
        Self {
            a: 0.5 * (v_left + v_right - 2.0 * v_middle),
            b: 0.5 * (v_right - v_left),
            c: v_middle,
        }
    }

    /// x of the stationary point.
    pub fn apex_x(&self) -> f32 {
        -self.b / (2.0 * self.a)
    }

    pub fn value(&self, x: f32) -> f32 {
        self.a * x * x + self.b * x + self.c
    }

    pub fn apex_height(&self) -> f32 {
        self.value(self.apex_x())
    }

    /// Whether the parabola opens downward strongly enough to carry a
    /// peak apex.
    pub fn is_peak(&self) -> bool {
        self.a < 0.0 && !aboutzero(self.a)
    }

    /// Full width at the apex half height, from the roots of
    /// `a x^2 + b x + (c - h/2) = 0`. `None` when the parabola has no
    /// real downward half-height crossing.
    pub fn half_height_width(&self) -> Option<f32> {
        if self.a >= 0.0 {
            return None;
        }
        let apex = self.apex_height();
        let k = self.b * self.b - 4.0 * self.a * (self.c - 0.5 * apex);
        if k <= 0.0 {
            return None;
        }
        let x_half = (k.sqrt() - self.b) / (2.0 * self.a);
        Some(2.0 * (self.apex_x() - x_half).abs())
    }
}

/// Read the sample on the line through `point` along `axis` at axis
/// coordinate `i`.
#[inline]
pub(crate) fn sample_along(grid: &GridView<'_>, point: &[i32], axis: usize, i: i32) -> f32 {
    let stride = grid.strides()[axis];
    let base: usize = point
        .iter()
        .zip(grid.strides())
        .enumerate()
        .filter(|(k, _)| *k != axis)
        .map(|(_, (p, s))| *p as usize * s)
        .sum();
    grid.get_flat(base + i as usize * stride)
}

/// Walk outward from `point` along `axis` until the profile crosses half
/// the peak height, and linearly interpolate the crossing coordinate.
/// Returns `None` when the crossing never happens before the grid edge.
pub(crate) fn half_height_crossing(
    grid: &GridView<'_>,
    point: &[i32],
    axis: usize,
    direction: i32,
    v_peak: f32,
    find_maximum: bool,
) -> Option<f32> {
    let v_half = 0.5 * v_peak;
    let npts = grid.shape()[axis] as i32;
    let mut v_prev = v_peak;

    let mut i = point[axis] + direction;
    while i >= 0 && i < npts {
        let v_this = sample_along(grid, point, axis, i);
        let crossed = if find_maximum {
            v_this < v_half
        } else {
            v_this > v_half
        };
        if crossed {
            return Some(i as f32 - direction as f32 * (v_half - v_this) / (v_prev - v_this));
        }
        v_prev = v_this;
        i += direction;
    }
    None
}

/// Half-height position with a boundary fallback: a crossing that never
/// happens reads as the grid edge, so the derived width is at least the
/// axis extent and never disqualifies a broad peak.
pub(crate) fn half_height_position(
    grid: &GridView<'_>,
    point: &[i32],
    axis: usize,
    direction: i32,
    v_peak: f32,
    find_maximum: bool,
) -> f32 {
    match half_height_crossing(grid, point, axis, direction, v_peak, find_maximum) {
        Some(x) => x,
        None if direction > 0 => (grid.shape()[axis] - 1) as f32,
        None => 1.0,
    }
}

/// Full width at half height along one axis, as the distance between the
/// forward and backward crossings.
pub(crate) fn axis_linewidth(
    grid: &GridView<'_>,
    point: &[i32],
    axis: usize,
    v_peak: f32,
    find_maximum: bool,
) -> f32 {
    let forward = half_height_position(grid, point, axis, 1, v_peak, find_maximum);
    let backward = half_height_position(grid, point, axis, -1, v_peak, find_maximum);
    forward - backward
}

#[cfg(test)]
mod test {
    use super::*;

    fn parabola_samples(a: f32, x0: f32, h: f32, at: i32) -> (f32, f32, f32) {
        let f = |x: f32| a * (x - x0).powi(2) + h;
        (
            f((at - 1) as f32),
            f(at as f32),
            f((at + 1) as f32),
        )
    }

    #[test]
    fn test_parabola_recovers_apex_exactly() {
        let (vl, vm, vr) = parabola_samples(-2.0, 0.3, 10.0, 0);
        let p = Parabola3::from_samples(vl, vm, vr);
        assert!(p.is_peak());
        assert!((p.apex_x() - 0.3).abs() < 1e-5);
        assert!((p.apex_height() - 10.0).abs() < 1e-5);
    }

    #[test]
    fn test_parabola_half_height_width() {
        // y = -x^2 + 8 has apex 8 and half height 4 at x = +-2.
        let p = Parabola3::from_samples(7.0, 8.0, 7.0);
        assert!((p.apex_x()).abs() < 1e-6);
        let width = p.half_height_width().unwrap();
        assert!((width - 4.0).abs() < 1e-5);
    }

    #[test]
    fn test_upward_parabola_has_no_width() {
        let p = Parabola3::from_samples(3.0, 1.0, 3.0);
        assert!(!p.is_peak());
        assert!(p.half_height_width().is_none());
    }

    #[test]
    fn test_half_height_crossing_interpolates() {
        // Profile 10, 8, 4, 1 along the only axis: half height 5 is
        // crossed between samples 1 and 2, a quarter of the way.
        let grid = GridView::from_parts(vec![10.0, 8.0, 4.0, 1.0], vec![4]).unwrap();
        let x = half_height_crossing(&grid, &[0], 0, 1, 10.0, true).unwrap();
        assert!((x - 1.75).abs() < 1e-6);
    }

    #[test]
    fn test_missing_crossing_reads_as_grid_edge() {
        let grid = GridView::from_parts(vec![10.0, 9.0, 8.0, 7.0, 6.0], vec![5]).unwrap();
        assert!(half_height_crossing(&grid, &[0], 0, 1, 10.0, true).is_none());
        let lw = axis_linewidth(&grid, &[0], 0, 10.0, true);
        assert!((lw - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_linewidth_along_second_axis() {
        // A 3x5 grid whose middle row is a triangular peak.
        let data = vec![
            0.0, 0.0, 0.0, 0.0, 0.0, //
            1.0, 5.0, 10.0, 5.0, 1.0, //
            0.0, 0.0, 0.0, 0.0, 0.0,
        ];
        let grid = GridView::from_parts(data, vec![3, 5]).unwrap();
        let lw = axis_linewidth(&grid, &[1, 2], 1, 10.0, true);
        assert!((lw - 2.0).abs() < 1e-6, "got {lw}");
    }

    #[test]
    fn test_isclose_helpers() {
        assert!(isclose(1.0f64, 1.0 + 1e-9));
        assert!(!isclose(1.0f64, 1.1));
        assert!(aboutzero(1e-9f64));
        assert!(!aboutzero(0.5f64));
    }
}
