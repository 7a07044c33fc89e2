//! The marching-squares level pass.
//!
//! One call scans the active region's cells against a single level,
//! allocating edge-crossing vertices into the arena and wiring their
//! chain links. Each 2x2 cell is classified by a pair of 2-bit codes,
//! one per column of samples: bit 0 set when the lower sample is above
//! the level, bit 1 when the upper sample is. Classification is strict
//! (`> level`), so a sample equal to the level counts as below.
use crate::grid::Grid2;

use super::region::{ActiveRegion, RangeKind};
use super::vertex::{VertexArena, VertexId};
use super::ContourError;

/// Scan one level over the old active region, populating `arena` with
/// linked vertices and, when `more_levels` is set, recording the next
/// level's region into the tracker's "new" side.
pub(crate) fn find_vertices(
    grid: &Grid2,
    level: f32,
    increasing: bool,
    arena: &mut VertexArena,
    region: &mut ActiveRegion,
    more_levels: bool,
) -> Result<(), ContourError> {
    let cols = grid.cols();
    let rows = grid.rows();

    if region.old_len() < 1 || cols < 2 || rows < 2 {
        return Ok(());
    }

    let mut pass = Pass {
        arena,
        region,
        level,
        increasing,
        more_levels,
    };

    // Carry of the vertex sitting on each cell's lower horizontal edge.
    // A slot is only read when the matching edge is crossed, which means
    // the bottom-row scan or the row below already filled it.
    let mut v_row: Vec<Option<VertexId>> = vec![None; cols - 1];

    // Vertices along the bottom row, only when the first active row is
    // the grid's row 0.
    if pass.region.old_row(0) == 0 {
        for c in 0..pass.region.old_ranges(0).len() {
            let range = pass.region.old_ranges(0)[c];
            let Some(end) = range.end else { continue };
            if end < 1 {
                continue;
            }
            let mut d_old = grid.at(range.start, 0);
            let mut b_old = above(d_old, level);
            for x in range.start..end - 1 {
                let d_new = grid.at(x + 1, 0);
                let b_new = above(d_new, level);
                if b_old != b_new {
                    v_row[x] = Some(pass.vertex0(d_old, d_new, x, 0)?);
                    b_old = b_new;
                }
                d_old = d_new;
            }
        }
    }

    for r in 0..pass.region.old_len() {
        let y = pass.region.old_row(r);
        for c in 0..pass.region.old_ranges(r).len() {
            let range = pass.region.old_ranges(r)[c];
            let Some(end) = range.end else { continue };

            let mut x0 = range.start;
            let mut d_old0 = grid.at(x0, y);
            let mut d_new0 = grid.at(x0, y + 1);
            let mut b_old = above(d_old0, level) | above(d_new0, level) << 1;

            // The range's left column crosses the vertical edge when its
            // two samples straddle the level.
            let mut v_col = if b_old == 1 || b_old == 2 {
                Some(pass.vertex1(d_old0, d_new0, x0, y)?)
            } else {
                None
            };

            x0 += 1;
            while x0 < end {
                let d_old1 = grid.at(x0, y);
                let d_new1 = grid.at(x0, y + 1);
                let b_new = above(d_old1, level) | above(d_new1, level) << 1;

                pass.cell(
                    b_old,
                    b_new,
                    d_old0,
                    d_old1,
                    d_new0,
                    d_new1,
                    &mut v_row,
                    &mut v_col,
                    x0 - 1,
                    y,
                )?;

                b_old = b_new;
                d_old0 = d_old1;
                d_new0 = d_new1;
                x0 += 1;
            }
        }
        pass.region.check_end_range(cols);
    }

    Ok(())
}

#[inline]
fn above(value: f32, level: f32) -> u8 {
    (value > level) as u8
}

struct Pass<'p> {
    arena: &'p mut VertexArena,
    region: &'p mut ActiveRegion,
    level: f32,
    increasing: bool,
    more_levels: bool,
}

impl<'p> Pass<'p> {
    /// Offset along the crossed edge from the lower-indexed endpoint.
    #[inline]
    fn interpolate(&self, a: f32, b: f32) -> f32 {
        (self.level - a) / (b - a)
    }

    /// A vertex on the horizontal edge between samples `(x, y)` and
    /// `(x + 1, y)`.
    fn vertex0(&mut self, d1: f32, d2: f32, x: usize, y: usize) -> Result<VertexId, ContourError> {
        let t = self.interpolate(d1, d2);
        self.arena.alloc(x as f32 + t, y as f32)
    }

    /// A vertex on the vertical edge between samples `(x, y)` and
    /// `(x, y + 1)`.
    fn vertex1(&mut self, d1: f32, d2: f32, x: usize, y: usize) -> Result<VertexId, ContourError> {
        let t = self.interpolate(d1, d2);
        self.arena.alloc(x as f32, y as f32 + t)
    }

    #[inline]
    fn update(&mut self, x: usize, y: usize, kind: RangeKind) {
        if self.more_levels {
            self.region.update_new(x, y, kind);
        }
    }

    /// Range bookkeeping with the increasing/decreasing role swap: a
    /// decreasing level sequence tracks the below-level component as it
    /// shrinks instead of the above-level one as it grows.
    #[inline]
    fn update_directed(&mut self, x: usize, y: usize, inc: RangeKind, dec: RangeKind) {
        let kind = if self.increasing { inc } else { dec };
        self.update(x, y, kind);
    }

    /// Dispatch one cell's transition. `b_old` classifies the left column
    /// of samples, `b_new` the right; the cell's lower-left sample is
    /// `(x, y)`.
    #[allow(clippy::too_many_arguments)]
    fn cell(
        &mut self,
        b_old: u8,
        b_new: u8,
        d_old0: f32,
        d_old1: f32,
        d_new0: f32,
        d_new1: f32,
        v_row: &mut [Option<VertexId>],
        v_col: &mut Option<VertexId>,
        x: usize,
        y: usize,
    ) -> Result<(), ContourError> {
        use RangeKind::{EndRange, Neither, StartRange};

        match (b_old, b_new) {
            // All four corners below: nothing to emit, but in decreasing
            // mode a column-0 touch keeps the row under watch.
            (0, 0) => {
                if self.more_levels && x == 0 && !self.increasing {
                    self.update(x, y, Neither);
                }
            }
            // All four corners above: the mirror case for increasing
            // mode, so saturated rows stay in the active region.
            (3, 3) => {
                if self.more_levels && x == 0 && self.increasing {
                    self.update(x, y, Neither);
                }
            }
            // Lower-right corner differs: right vertical edge crossed,
            // linked to the vertex already on the lower edge.
            (0, 1) => {
                let v = self.vertex1(d_old1, d_new1, x + 1, y)?;
                if let Some(v_old) = v_row[x] {
                    self.arena.link(v, v_old);
                }
                *v_col = Some(v);
                self.update_directed(x, y, StartRange, Neither);
            }
            (3, 2) => {
                let v = self.vertex1(d_old1, d_new1, x + 1, y)?;
                if let Some(v_old) = v_row[x] {
                    self.arena.link(v_old, v);
                }
                *v_col = Some(v);
                self.update_directed(x, y, Neither, StartRange);
            }
            // Upper-right corner differs: upper and right edges crossed.
            (0, 2) => {
                let v_new = self.vertex0(d_new0, d_new1, x, y + 1)?;
                let v = self.vertex1(d_old1, d_new1, x + 1, y)?;
                v_row[x] = Some(v_new);
                self.arena.link(v_new, v);
                *v_col = Some(v);
                self.update_directed(x, y, StartRange, Neither);
            }
            (3, 1) => {
                let v_new = self.vertex0(d_new0, d_new1, x, y + 1)?;
                let v = self.vertex1(d_old1, d_new1, x + 1, y)?;
                v_row[x] = Some(v_new);
                self.arena.link(v, v_new);
                *v_col = Some(v);
                self.update_directed(x, y, Neither, StartRange);
            }
            // Right column of samples above: the contour runs vertically
            // through the cell, crossing lower and upper edges.
            (0, 3) => {
                let v_new = self.vertex0(d_new0, d_new1, x, y + 1)?;
                if let Some(v_old) = v_row[x] {
                    self.arena.link(v_new, v_old);
                }
                v_row[x] = Some(v_new);
                self.update_directed(x, y, StartRange, EndRange);
            }
            (3, 0) => {
                let v_new = self.vertex0(d_new0, d_new1, x, y + 1)?;
                if let Some(v_old) = v_row[x] {
                    self.arena.link(v_old, v_new);
                }
                v_row[x] = Some(v_new);
                self.update_directed(x, y, EndRange, StartRange);
            }
            // Lower-left corner differs: left vertical and lower edges,
            // both vertices already allocated.
            (1, 0) => {
                if let (Some(v_old), Some(vc)) = (v_row[x], *v_col) {
                    self.arena.link(v_old, vc);
                }
                self.update_directed(x, y, EndRange, Neither);
            }
            (2, 3) => {
                if let (Some(v_old), Some(vc)) = (v_row[x], *v_col) {
                    self.arena.link(vc, v_old);
                }
                self.update_directed(x, y, Neither, EndRange);
            }
            // Lower row of samples above: horizontal run, left and right
            // vertical edges crossed.
            (1, 1) => {
                let v = self.vertex1(d_old1, d_new1, x + 1, y)?;
                if let Some(vc) = *v_col {
                    self.arena.link(v, vc);
                }
                *v_col = Some(v);
                self.update(x, y, Neither);
            }
            (2, 2) => {
                let v = self.vertex1(d_old1, d_new1, x + 1, y)?;
                if let Some(vc) = *v_col {
                    self.arena.link(vc, v);
                }
                *v_col = Some(v);
                self.update(x, y, Neither);
            }
            // Saddles: diagonal corners agree, so all four edges are
            // crossed and the cell-center mean picks the topology.
            (1, 2) => {
                let v = self.vertex0(d_new0, d_new1, x, y + 1)?;
                let v_new = self.vertex1(d_old1, d_new1, x + 1, y)?;
                let d = (d_old0 + d_old1 + d_new0 + d_new1) / 4.0;
                if let (Some(vc), Some(v_old)) = (*v_col, v_row[x]) {
                    if d > self.level {
                        self.arena.link(v, vc);
                        self.arena.link(v_old, v_new);
                    } else {
                        self.arena.link(v_old, vc);
                        self.arena.link(v, v_new);
                    }
                }
                v_row[x] = Some(v);
                *v_col = Some(v_new);
                self.update(x, y, Neither);
            }
            (2, 1) => {
                let v = self.vertex0(d_new0, d_new1, x, y + 1)?;
                let v_new = self.vertex1(d_old1, d_new1, x + 1, y)?;
                let d = (d_old0 + d_old1 + d_new0 + d_new1) / 4.0;
                if let (Some(vc), Some(v_old)) = (*v_col, v_row[x]) {
                    if d > self.level {
                        self.arena.link(vc, v_old);
                        self.arena.link(v_new, v);
                    } else {
                        self.arena.link(vc, v);
                        self.arena.link(v_new, v_old);
                    }
                }
                v_row[x] = Some(v);
                *v_col = Some(v_new);
                self.update(x, y, Neither);
            }
            // Upper-left corner differs: left vertical and upper edges.
            (1, 3) => {
                let v_new = self.vertex0(d_new0, d_new1, x, y + 1)?;
                if let Some(vc) = *v_col {
                    self.arena.link(v_new, vc);
                }
                v_row[x] = Some(v_new);
                self.update_directed(x, y, Neither, EndRange);
            }
            (2, 0) => {
                let v_new = self.vertex0(d_new0, d_new1, x, y + 1)?;
                if let Some(vc) = *v_col {
                    self.arena.link(vc, v_new);
                }
                v_row[x] = Some(v_new);
                self.update_directed(x, y, EndRange, Neither);
            }
            _ => unreachable!("cell codes are two-bit values"),
        }
        Ok(())
    }
}
