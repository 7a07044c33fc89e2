//! `nmrsignal` is a library of the numerical kernels behind 2-D NMR
//! spectrum visualization and peak analysis: contour extraction from a
//! rectangular float32 sample grid, and locating/refining/fitting peaks
//! in an N-dimensional spectrum.
//!
//! The contouring facility converts a grid plus a monotone level sequence
//! into per-level polylines with [`contour_grid`], or into a single packed
//! index/vertex/color buffer suitable for line-loop rendering with
//! [`contour_gl`]. Peaks are found with [`PeakFinder`], which applies a
//! configurable stack of intensity, extremum, drop, linewidth, buffer and
//! exclusion criteria, and are sub-pixel localized either with the fast
//! non-iterative parabolic refiner [`fit_parabolic`] or the
//! Levenberg–Marquardt shape fitter [`fit_peaks`].
//!
//! # Usage
//! ```
//! use nmrsignal::{GridView, PeakFinder, contour_grid};
//!
//! // A 5x5 grid with a single hot sample in the middle.
//! let mut data = vec![0.0f32; 25];
//! data[12] = 10.0;
//! let grid = GridView::from_parts(data, vec![5, 5]).unwrap();
//!
//! let contours = contour_grid(&grid, &[5.0]).unwrap();
//! assert_eq!(contours.len(), 1);
//! assert_eq!(contours[0].len(), 1);
//!
//! let finder = PeakFinder::builder().seek_maxima(5.0).build();
//! let peaks = finder.find_peaks(&grid).unwrap();
//! assert_eq!(peaks[0].position, vec![2, 2]);
//! ```
//!
//! Every operation is synchronous and deterministic, holds no module-level
//! state, and releases its scratch storage on return. Callers wanting
//! parallelism run one request per thread; with the `parallelism` feature,
//! [`contour_gl`] additionally spreads independent spectrum arrays over
//! the rayon thread pool.
pub mod contour;
pub mod grid;
pub mod peak;
pub mod peak_finder;
pub mod peak_fit;
pub mod peak_statistics;

pub use crate::contour::{
    contour_gl, contour_grid, flatten_arrays, ContourError, GlContours, LevelDirection, Polyline,
};
pub use crate::grid::{Grid2, GridView, MAX_RANK};
pub use crate::peak::{FitUncertainty, FittedPeak, PeakCandidate};
pub use crate::peak_finder::{
    DiagExclusion, PeakFindError, PeakFinder, PeakFinderBuilder, RectExclusion,
};
pub use crate::peak_fit::{
    fit_parabolic, fit_peaks, FitRegion, FitSettings, PeakFitError, PeakShapeKind,
};
