//! Block-arena storage for contour vertices.
//!
//! Vertices are allocated in bulk during a level pass and discarded
//! wholesale before the next one: the arena hands out plain integer ids,
//! keeps its blocks across resets, and only ever grows.
use super::ContourError;

/// Vertices are allocated in bunches of this size.
pub(crate) const BLOCK_LEN: usize = 50;

/// Index of a vertex in a [`VertexArena`], valid for one level pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct VertexId(u32);

impl VertexId {
    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// One contour vertex: a 2-D position and its optional chain links.
///
/// `prev`/`next` are each set at most once by the edge routines; an
/// endpoint of an open contour keeps one link empty, a closed contour's
/// links form a cycle.
#[derive(Debug, Clone)]
pub(crate) struct Vertex {
    pub x: f32,
    pub y: f32,
    pub prev: Option<VertexId>,
    pub next: Option<VertexId>,
    pub visited: bool,
}

impl Vertex {
    fn new(x: f32, y: f32) -> Self {
        Self {
            x,
            y,
            prev: None,
            next: None,
            visited: false,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct VertexArena {
    blocks: Vec<Vec<Vertex>>,
    len: usize,
}

impl VertexArena {
    /// Number of live vertices in the current level pass.
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Forget the current pass's vertices but keep the blocks.
    pub(crate) fn reset(&mut self) {
        self.len = 0;
    }

    pub(crate) fn alloc(&mut self, x: f32, y: f32) -> Result<VertexId, ContourError> {
        let id = u32::try_from(self.len).map_err(|_| ContourError::OutOfMemory)?;
        let block = self.len / BLOCK_LEN;
        if block == self.blocks.len() {
            self.blocks.push(Vec::with_capacity(BLOCK_LEN));
        }
        let slot = self.len % BLOCK_LEN;
        let vertex = Vertex::new(x, y);
        if slot < self.blocks[block].len() {
            self.blocks[block][slot] = vertex;
        } else {
            self.blocks[block].push(vertex);
        }
        self.len += 1;
        Ok(VertexId(id))
    }

    #[inline]
    pub(crate) fn get(&self, id: VertexId) -> &Vertex {
        &self.blocks[id.index() / BLOCK_LEN][id.index() % BLOCK_LEN]
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, id: VertexId) -> &mut Vertex {
        &mut self.blocks[id.index() / BLOCK_LEN][id.index() % BLOCK_LEN]
    }

    /// Chain `from` to `to` so that walking `next` passes from → to.
    #[inline]
    pub(crate) fn link(&mut self, from: VertexId, to: VertexId) {
        self.get_mut(from).next = Some(to);
        self.get_mut(to).prev = Some(from);
    }

    pub(crate) fn clear_visited(&mut self) {
        for i in 0..self.len {
            self.blocks[i / BLOCK_LEN][i % BLOCK_LEN].visited = false;
        }
    }

    /// The id of the `index`-th vertex allocated this pass.
    #[inline]
    pub(crate) fn id(&self, index: usize) -> VertexId {
        debug_assert!(index < self.len);
        VertexId(index as u32)
    }
}
