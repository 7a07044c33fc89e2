//! Contour extraction from 2-D spectrum grids.
//!
//! The workhorse is a marching-squares pass per level that only visits
//! the cells the previous level proved interesting, an arena of linked
//! edge-crossing vertices, and a chaining step that reads the links back
//! out as oriented polylines. [`contour_grid`] returns the per-level
//! polyline lists; [`contour_gl`] runs one or more spectrum arrays
//! against positive and negative level sets and packs everything into a
//! single index/vertex/color buffer for line-loop rendering.
//!
//! Levels must be monotone. Increasing sequences track the above-level
//! region as it shrinks from level to level, decreasing sequences track
//! the below-level region; either way the scan cost drops as the levels
//! walk away from the baseline.
mod chain;
mod engine;
mod gl;
mod levels;
mod region;
mod vertex;

use cfg_if::cfg_if;
use log::debug;
use thiserror::Error;

use crate::grid::{Grid2, GridView};

use self::chain::chain_polylines;
use self::engine::find_vertices;
use self::region::ActiveRegion;
use self::vertex::VertexArena;

pub use self::gl::GlContours;
pub use self::levels::LevelDirection;

use self::gl::Packer;
use self::levels::validate_levels;

/// One connected contour curve as a flat `[x0, y0, x1, y1, ...]` buffer.
pub type Polyline = Vec<f32>;

/// All the ways a contour request can fail
#[derive(Debug, Clone, Error)]
pub enum ContourError {
    #[error("invalid level sequence: {0}")]
    InvalidLevels(&'static str),
    #[error("contour data must be a two-dimensional float grid")]
    InvalidGrid,
    #[error("contour colors must have exactly 4 components, got {0}")]
    InvalidColorShape(usize),
    #[error("all spectrum arrays must share the same shape")]
    InconsistentArrayShapes,
    #[error("contour output exceeds the addressable buffer size")]
    OutOfMemory,
}

/// Extract contours of `grid` at each of `levels`.
///
/// The result always has exactly one entry per level, each a possibly
/// empty list of polylines. Coordinates place the sample in column x of
/// row y at `(x, y)`; crossings are linearly interpolated along grid
/// edges, so every coordinate lies inside the sample rectangle.
pub fn contour_grid(
    grid: &GridView<'_>,
    levels: &[f32],
) -> Result<Vec<Vec<Polyline>>, ContourError> {
    let direction = validate_levels(levels)?;
    let grid2 = grid.as_2d().ok_or(ContourError::InvalidGrid)?;
    contour_levels(&grid2, levels, direction)
}

fn contour_levels(
    grid: &Grid2<'_>,
    levels: &[f32],
    direction: LevelDirection,
) -> Result<Vec<Vec<Polyline>>, ContourError> {
    let mut arena = VertexArena::default();
    let mut region = ActiveRegion::new(grid.rows(), grid.cols());
    let mut contours = Vec::with_capacity(levels.len());

    for (l, level) in levels.iter().copied().enumerate() {
        let more_levels = l + 1 < levels.len();
        arena.reset();
        find_vertices(
            grid,
            level,
            direction.is_increasing(),
            &mut arena,
            &mut region,
            more_levels,
        )?;
        let polylines = chain_polylines(&mut arena);
        debug!(
            "level {level}: {} vertices in {} polylines",
            arena.len(),
            polylines.len()
        );
        contours.push(polylines);
        if more_levels {
            region.swap_old_new();
        }
    }
    Ok(contours)
}

/// Fold several equally shaped arrays into one extreme envelope:
/// elementwise `max(values_max, 0) + min(values_min, 0)`, preserving
/// both positive and negative extremes.
pub fn flatten_arrays(arrays: &[GridView<'_>]) -> Result<GridView<'static>, ContourError> {
    let first = arrays.first().ok_or(ContourError::InconsistentArrayShapes)?;
    if arrays.iter().any(|a| a.shape() != first.shape()) {
        return Err(ContourError::InconsistentArrayShapes);
    }

    let mut combined: Vec<f32> = first
        .samples()
        .iter()
        .map(|v| v.max(0.0) + v.min(0.0))
        .collect();
    for array in &arrays[1..] {
        for (acc, v) in combined.iter_mut().zip(array.samples()) {
            let hi = acc.max(0.0).max(v.max(0.0));
            let lo = acc.min(0.0).min(v.min(0.0));
            *acc = hi + lo;
        }
    }
    GridView::from_parts(combined, first.shape().to_vec())
        .map_err(|_| ContourError::InconsistentArrayShapes)
}

/// Contour one or more equally shaped arrays at positive and negative
/// level sets and pack the result into a single GL buffer.
///
/// Per array the positive levels are packed first, then the negative
/// ones, arrays in input order. `pos_color`/`neg_color` are RGBA
/// quadruplets repeated for every vertex of the matching polarity. With
/// `flatten`, the arrays are first folded into one extreme envelope by
/// [`flatten_arrays`].
pub fn contour_gl(
    arrays: &[GridView<'_>],
    pos_levels: &[f32],
    neg_levels: &[f32],
    pos_color: &[f32],
    neg_color: &[f32],
    flatten: bool,
) -> Result<GlContours, ContourError> {
    let pos_direction = validate_levels(pos_levels)?;
    let neg_direction = validate_levels(neg_levels)?;
    let pos_rgba: &[f32; 4] = pos_color
        .try_into()
        .map_err(|_| ContourError::InvalidColorShape(pos_color.len()))?;
    let neg_rgba: &[f32; 4] = neg_color
        .try_into()
        .map_err(|_| ContourError::InvalidColorShape(neg_color.len()))?;

    if arrays.is_empty() {
        return Ok(GlContours::default());
    }
    let shape = arrays[0].shape();
    if arrays.iter().any(|a| a.shape() != shape) {
        return Err(ContourError::InconsistentArrayShapes);
    }
    for array in arrays {
        if array.as_2d().is_none() {
            return Err(ContourError::InvalidGrid);
        }
    }

    let flattened;
    let arrays: &[GridView<'_>] = if flatten && arrays.len() > 1 {
        flattened = [flatten_arrays(arrays)?];
        &flattened
    } else {
        arrays
    };

    let per_array = contour_polarities(arrays, pos_levels, neg_levels, pos_direction, neg_direction)?;

    let total_vertices: usize = per_array
        .iter()
        .flat_map(|(pos, neg)| pos.iter().chain(neg.iter()))
        .flatten()
        .map(|line| line.len() / 2)
        .sum();
    if u32::try_from(total_vertices).is_err() || total_vertices == u32::MAX as usize {
        return Err(ContourError::OutOfMemory);
    }

    let mut packer = Packer::with_vertex_capacity(total_vertices);
    for (pos, neg) in &per_array {
        for line in pos.iter().flatten() {
            packer.push_polyline(line, pos_rgba);
        }
        for line in neg.iter().flatten() {
            packer.push_polyline(line, neg_rgba);
        }
    }
    Ok(packer.finish())
}

type PolarityContours = (Vec<Vec<Polyline>>, Vec<Vec<Polyline>>);

fn contour_one_array(
    array: &GridView<'_>,
    pos_levels: &[f32],
    neg_levels: &[f32],
    pos_direction: LevelDirection,
    neg_direction: LevelDirection,
) -> Result<PolarityContours, ContourError> {
    let grid2 = array.as_2d().ok_or(ContourError::InvalidGrid)?;
    Ok((
        contour_levels(&grid2, pos_levels, pos_direction)?,
        contour_levels(&grid2, neg_levels, neg_direction)?,
    ))
}

cfg_if! {
    if #[cfg(feature = "parallelism")] {
        fn contour_polarities(
            arrays: &[GridView<'_>],
            pos_levels: &[f32],
            neg_levels: &[f32],
            pos_direction: LevelDirection,
            neg_direction: LevelDirection,
        ) -> Result<Vec<PolarityContours>, ContourError> {
            use rayon::prelude::*;
            arrays
                .par_iter()
                .map(|a| contour_one_array(a, pos_levels, neg_levels, pos_direction, neg_direction))
                .collect()
        }
    } else {
        fn contour_polarities(
            arrays: &[GridView<'_>],
            pos_levels: &[f32],
            neg_levels: &[f32],
            pos_direction: LevelDirection,
            neg_direction: LevelDirection,
        ) -> Result<Vec<PolarityContours>, ContourError> {
            arrays
                .iter()
                .map(|a| contour_one_array(a, pos_levels, neg_levels, pos_direction, neg_direction))
                .collect()
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const FWHM_C: f32 = 2.772_588_7; // 4 ln 2

    fn gaussian_grid(rows: usize, cols: usize, cy: f32, cx: f32, height: f32, fwhm: f32) -> GridView<'static> {
        let mut data = Vec::with_capacity(rows * cols);
        for y in 0..rows {
            for x in 0..cols {
                let dx = x as f32 - cx;
                let dy = y as f32 - cy;
                data.push(height * (-FWHM_C * (dx * dx + dy * dy) / (fwhm * fwhm)).exp());
            }
        }
        GridView::from_parts(data, vec![rows, cols]).unwrap()
    }

    fn point_grid() -> GridView<'static> {
        let mut data = vec![0.0f32; 9];
        data[4] = 10.0;
        GridView::from_parts(data, vec![3, 3]).unwrap()
    }

    #[test]
    fn test_single_hot_cell_scenario() {
        let contours = contour_grid(&point_grid(), &[5.0]).unwrap();
        assert_eq!(contours.len(), 1);
        assert_eq!(contours[0].len(), 1);
        assert_eq!(contours[0][0].len(), 8);
    }

    #[test]
    fn test_level_count_matches_input_even_when_exhausted() {
        // Levels above the grid maximum still get (empty) entries.
        let levels = [5.0, 20.0, 30.0];
        let contours = contour_grid(&point_grid(), &levels).unwrap();
        assert_eq!(contours.len(), 3);
        assert_eq!(contours[0].len(), 1);
        assert!(contours[1].is_empty());
        assert!(contours[2].is_empty());
    }

    #[test]
    fn test_non_monotone_levels_rejected() {
        let err = contour_grid(&point_grid(), &[0.1, 0.2, 0.1]).unwrap_err();
        assert!(matches!(err, ContourError::InvalidLevels(_)));
    }

    #[test]
    fn test_wrong_rank_rejected() {
        let grid = GridView::from_parts(vec![0.0f32; 8], vec![2, 2, 2]).unwrap();
        assert!(matches!(
            contour_grid(&grid, &[1.0]),
            Err(ContourError::InvalidGrid)
        ));
    }

    #[test]
    fn test_gaussian_ring_geometry() {
        let grid = gaussian_grid(5, 5, 2.0, 2.0, 1.0, 2.0);
        let contours = contour_grid(&grid, &[0.5]).unwrap();
        assert_eq!(contours[0].len(), 1);
        let line = &contours[0][0];
        let nvertices = line.len() / 2;
        assert!((8..=16).contains(&nvertices), "got {nvertices} vertices");
        for v in line.chunks_exact(2) {
            let dist = ((v[0] - 2.0).powi(2) + (v[1] - 2.0).powi(2)).sqrt();
            assert!(dist <= 1.1, "vertex {v:?} too far from the peak");
        }
    }

    #[test]
    fn test_higher_levels_nest_inside_lower() {
        let grid = gaussian_grid(9, 9, 4.0, 4.0, 1.0, 3.0);
        let contours = contour_grid(&grid, &[0.3, 0.6, 0.9]).unwrap();
        let radius = |line: &Polyline| -> (f32, f32) {
            let mut min = f32::INFINITY;
            let mut max = 0.0f32;
            for v in line.chunks_exact(2) {
                let d = ((v[0] - 4.0).powi(2) + (v[1] - 4.0).powi(2)).sqrt();
                min = min.min(d);
                max = max.max(d);
            }
            (min, max)
        };
        for level in &contours {
            assert_eq!(level.len(), 1);
        }
        let (lo_min, _) = radius(&contours[0][0]);
        let (mid_min, mid_max) = radius(&contours[1][0]);
        let (_, hi_max) = radius(&contours[2][0]);
        // Set containment: each ring lies strictly inside the one below.
        assert!(mid_max < lo_min, "{mid_max} !< {lo_min}");
        assert!(hi_max < mid_min, "{hi_max} !< {mid_min}");
    }

    #[test]
    fn test_multi_level_region_tracking_matches_fresh_scan() {
        // The second level scanned through the narrowed active region
        // must equal the same level contoured alone over the full grid.
        let grid = gaussian_grid(11, 11, 5.0, 5.0, 1.0, 4.0);
        let both = contour_grid(&grid, &[0.25, 0.75]).unwrap();
        let alone = contour_grid(&grid, &[0.75]).unwrap();
        assert_eq!(both[1], alone[0]);
    }

    #[test]
    fn test_decreasing_levels_track_negative_lobes() {
        let mut data = vec![0.0f32; 49];
        data[3 * 7 + 3] = -10.0;
        let grid = GridView::from_parts(data, vec![7, 7]).unwrap();
        let contours = contour_grid(&grid, &[-2.0, -5.0, -8.0]).unwrap();
        assert_eq!(contours.len(), 3);
        for level in &contours {
            assert_eq!(level.len(), 1, "each level should ring the trough");
        }
        let alone = contour_grid(&grid, &[-8.0]).unwrap();
        assert_eq!(contours[2], alone[0]);
    }

    #[test]
    fn test_repeat_runs_are_bitwise_identical() {
        let grid = gaussian_grid(8, 8, 3.5, 3.5, 2.0, 2.5);
        let a = contour_grid(&grid, &[0.5, 1.0]).unwrap();
        let b = contour_grid(&grid, &[0.5, 1.0]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_negated_grid_produces_same_geometry() {
        let grid = gaussian_grid(7, 7, 3.0, 3.0, 1.0, 2.0);
        let negated: Vec<f32> = grid.samples().iter().map(|v| -v).collect();
        let negated = GridView::from_parts(negated, grid.shape().to_vec()).unwrap();

        let pos = contour_grid(&grid, &[0.5]).unwrap();
        let neg = contour_grid(&negated, &[-0.5]).unwrap();

        assert_eq!(pos[0].len(), neg[0].len());
        let mut pos_pts: Vec<(u32, u32)> = pos[0][0]
            .chunks_exact(2)
            .map(|v| (v[0].to_bits(), v[1].to_bits()))
            .collect();
        let mut neg_pts: Vec<(u32, u32)> = neg[0][0]
            .chunks_exact(2)
            .map(|v| (v[0].to_bits(), v[1].to_bits()))
            .collect();
        pos_pts.sort_unstable();
        neg_pts.sort_unstable();
        assert_eq!(pos_pts, neg_pts);
    }

    #[test]
    fn test_flatten_keeps_both_polarities() {
        let a = GridView::from_parts(vec![3.0, -1.0, 0.5, 0.0], vec![2, 2]).unwrap();
        let b = GridView::from_parts(vec![1.0, -4.0, -2.0, 0.0], vec![2, 2]).unwrap();
        let combined = flatten_arrays(&[a, b]).unwrap();
        assert_eq!(combined.samples(), [3.0, -4.0, 0.5 - 2.0, 0.0]);
    }

    #[test]
    fn test_contour_gl_counts_and_colors() {
        let grid = point_grid();
        let out = contour_gl(
            std::slice::from_ref(&grid),
            &[5.0],
            &[],
            &[1.0, 0.0, 0.0, 1.0],
            &[0.0, 0.0, 1.0, 1.0],
            false,
        )
        .unwrap();

        assert_eq!(out.num_vertices, 4);
        assert_eq!(out.num_indices, 8);
        assert_eq!(out.indices.len(), 8);
        assert_eq!(out.vertices.len(), 8);
        assert_eq!(out.colors.len(), 16);
        // Loop closure: last index returns to the strip start.
        assert_eq!(out.indices[7], 0);
        for rgba in out.colors.chunks_exact(4) {
            assert_eq!(rgba, &[1.0, 0.0, 0.0, 1.0]);
        }
    }

    #[test]
    fn test_contour_gl_orders_positive_then_negative() {
        let mut data = vec![0.0f32; 25];
        data[6] = 10.0;
        data[18] = -10.0;
        let grid = GridView::from_parts(data, vec![5, 5]).unwrap();

        let out = contour_gl(
            std::slice::from_ref(&grid),
            &[5.0],
            &[-5.0],
            &[1.0, 0.0, 0.0, 1.0],
            &[0.0, 0.0, 1.0, 1.0],
            false,
        )
        .unwrap();

        assert_eq!(out.num_vertices, 8);
        assert_eq!(&out.colors[..16], [1.0, 0.0, 0.0, 1.0].repeat(4).as_slice());
        assert_eq!(&out.colors[16..], [0.0, 0.0, 1.0, 1.0].repeat(4).as_slice());
        // The positive lobe's ring fills the first half of the vertex
        // buffer, the negative lobe's ring the second half.
        assert!(out.vertices[..8].chunks_exact(2).all(|v| v[1] <= 1.5));
        assert!(out.vertices[8..].chunks_exact(2).all(|v| v[1] >= 2.5));
    }

    #[test]
    fn test_contour_gl_validates_colors_and_shapes() {
        let grid = point_grid();
        let err = contour_gl(
            std::slice::from_ref(&grid),
            &[5.0],
            &[],
            &[1.0, 0.0, 0.0],
            &[0.0; 4],
            false,
        )
        .unwrap_err();
        assert!(matches!(err, ContourError::InvalidColorShape(3)));

        let other = GridView::from_parts(vec![0.0f32; 4], vec![2, 2]).unwrap();
        let err = contour_gl(
            &[point_grid(), other],
            &[5.0],
            &[],
            &[0.0; 4],
            &[0.0; 4],
            false,
        )
        .unwrap_err();
        assert!(matches!(err, ContourError::InconsistentArrayShapes));
    }

    #[test]
    fn test_contour_gl_flatten_merges_arrays() {
        let mut a = vec![0.0f32; 25];
        a[6] = 10.0;
        let mut b = vec![0.0f32; 25];
        b[18] = 10.0;
        let a = GridView::from_parts(a, vec![5, 5]).unwrap();
        let b = GridView::from_parts(b, vec![5, 5]).unwrap();

        let merged = contour_gl(&[a.clone(), b.clone()], &[5.0], &[], &[0.0; 4], &[0.0; 4], true).unwrap();
        let separate = contour_gl(&[a, b], &[5.0], &[], &[0.0; 4], &[0.0; 4], false).unwrap();

        // Either way both lobes appear; flattening folds them into one
        // array's worth of contours.
        assert_eq!(merged.num_vertices, 8);
        assert_eq!(separate.num_vertices, 8);
    }
}
