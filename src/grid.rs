//! Bounds-checked access to N-dimensional float32 sample grids.
use std::borrow::Cow;

use thiserror::Error;

/// The largest grid rank any kernel in this crate accepts.
pub const MAX_RANK: usize = 10;

/// The ways constructing a [`GridView`] can fail
#[derive(Debug, Clone, Error)]
pub enum GridError {
    #[error("grid rank {0} outside the supported range 1..={MAX_RANK}")]
    RankOutOfRange(usize),
    #[error("grid shape {shape:?} describes {expected} samples but {actual} were supplied")]
    SizeMismatch {
        shape: Vec<usize>,
        expected: usize,
        actual: usize,
    },
}

/// An N-dimensional float32 sample grid in row-major order, axis 0
/// slowest. The storage may be borrowed from the caller or owned.
///
/// Indexing past the declared shape is a programming error, not a runtime
/// condition: accessors debug-assert their arguments and otherwise defer
/// to slice bounds checks.
#[derive(Debug, Default, Clone)]
pub struct GridView<'a> {
    data: Cow<'a, [f32]>,
    shape: Vec<usize>,
    strides: Vec<usize>,
}

impl<'a> GridView<'a> {
    /// Wrap borrowed sample storage without copying it.
    pub fn wrap(data: &'a [f32], shape: Vec<usize>) -> Result<Self, GridError> {
        Self::from_parts(Cow::Borrowed(data), shape)
    }

    pub fn from_parts(
        data: impl Into<Cow<'a, [f32]>>,
        shape: Vec<usize>,
    ) -> Result<Self, GridError> {
        let data = data.into();
        if shape.is_empty() || shape.len() > MAX_RANK {
            return Err(GridError::RankOutOfRange(shape.len()));
        }
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(GridError::SizeMismatch {
                shape,
                expected,
                actual: data.len(),
            });
        }
        let strides = row_major_strides(&shape);
        Ok(Self {
            data,
            shape,
            strides,
        })
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn samples(&self) -> &[f32] {
        &self.data
    }

    /// Row-major strides, one per axis.
    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    /// The flat row-major offset of a multi-index.
    #[inline]
    pub fn offset_of(&self, point: &[usize]) -> usize {
        debug_assert_eq!(point.len(), self.rank());
        point
            .iter()
            .zip(self.strides.iter())
            .map(|(i, s)| i * s)
            .sum()
    }

    #[inline]
    pub fn get(&self, point: &[usize]) -> f32 {
        self.data[self.offset_of(point)]
    }

    #[inline]
    pub fn get_flat(&self, offset: usize) -> f32 {
        self.data[offset]
    }

    /// Read the sample at a signed multi-index, as the peak kernels carry
    /// positions. Negative components are a programming error.
    #[inline]
    pub fn value_at(&self, point: &[i32]) -> f32 {
        debug_assert!(point.iter().all(|i| *i >= 0));
        let offset: usize = point
            .iter()
            .zip(self.strides.iter())
            .map(|(i, s)| *i as usize * s)
            .sum();
        self.data[offset]
    }

    /// A 2-D facade over a rank-2 grid, indexed the way the contour
    /// engine reads it: axis 0 as rows (y), axis 1 as columns (x).
    pub fn as_2d(&self) -> Option<Grid2<'_>> {
        if self.rank() != 2 {
            return None;
        }
        Some(Grid2 {
            data: &self.data,
            rows: self.shape[0],
            cols: self.shape[1],
        })
    }
}

impl<'a> From<GridView<'a>> for Vec<f32> {
    fn from(grid: GridView<'a>) -> Self {
        grid.data.into_owned()
    }
}

fn row_major_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1usize; shape.len()];
    for axis in (0..shape.len().saturating_sub(1)).rev() {
        strides[axis] = strides[axis + 1] * shape[axis + 1];
    }
    strides
}

/// A borrowed rank-2 grid with the contour engine's (x, y) indexing.
#[derive(Debug, Clone, Copy)]
pub struct Grid2<'g> {
    data: &'g [f32],
    rows: usize,
    cols: usize,
}

impl<'g> Grid2<'g> {
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// The sample in column `x` of row `y`.
    #[inline]
    pub fn at(&self, x: usize, y: usize) -> f32 {
        debug_assert!(x < self.cols && y < self.rows);
        self.data[y * self.cols + x]
    }
}
