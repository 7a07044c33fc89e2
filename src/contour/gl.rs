//! Packing of polyline lists into flat GL line-loop buffers.
use super::Polyline;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The packed contour geometry for one GL draw: index pairs encoding
/// line segments with per-polyline loop closure, interleaved (x, y)
/// vertices, and one RGBA per vertex.
#[derive(Debug, Default, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GlContours {
    pub num_indices: u32,
    pub num_vertices: u32,
    pub indices: Vec<u32>,
    pub vertices: Vec<f32>,
    pub colors: Vec<f32>,
}

/// Owns the output buffers and the running vertex counter while the
/// caller feeds polylines in draw order.
#[derive(Debug, Default)]
pub(crate) struct Packer {
    indices: Vec<u32>,
    vertices: Vec<f32>,
    colors: Vec<f32>,
    next_index: u32,
}

impl Packer {
    pub(crate) fn with_vertex_capacity(num_vertices: usize) -> Self {
        Self {
            indices: Vec::with_capacity(2 * num_vertices),
            vertices: Vec::with_capacity(2 * num_vertices),
            colors: Vec::with_capacity(4 * num_vertices),
            next_index: 0,
        }
    }

    /// Append one polyline: a pair of indices per vertex, with the final
    /// pair bent back to the polyline's first vertex to close the loop.
    pub(crate) fn push_polyline(&mut self, line: &Polyline, rgba: &[f32; 4]) {
        let nvertices = line.len() / 2;
        if nvertices == 0 {
            return;
        }
        let start = self.next_index;
        for _ in 0..nvertices {
            self.indices.push(self.next_index);
            self.indices.push(self.next_index + 1);
            self.next_index += 1;
        }
        let n = self.indices.len();
        self.indices[n - 1] = start;

        self.vertices.extend_from_slice(line);
        for _ in 0..nvertices {
            self.colors.extend_from_slice(rgba);
        }
    }

    pub(crate) fn finish(self) -> GlContours {
        GlContours {
            num_indices: self.indices.len() as u32,
            num_vertices: self.next_index,
            indices: self.indices,
            vertices: self.vertices,
            colors: self.colors,
        }
    }
}
