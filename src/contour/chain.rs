//! Linking pass: turn the arena's vertex chains into flat polylines.
use super::vertex::VertexArena;
use super::Polyline;

/// Walk every maximal chain in the arena once and emit it as a flat
/// `[x0, y0, x1, y1, ...]` buffer.
///
/// For each unvisited vertex the walk first follows `prev` to an open
/// end (or all the way around a cycle), then follows `next` forward from
/// there, so open contours always read from one terminus to the other
/// and closed contours read once around.
pub(crate) fn chain_polylines(arena: &mut VertexArena) -> Vec<Polyline> {
    arena.clear_visited();

    let mut polylines = Vec::new();
    for index in 0..arena.len() {
        let id = arena.id(index);
        if arena.get(id).visited {
            continue;
        }

        let mut nvertices = 1usize;
        let mut terminus = id;
        loop {
            let prev = arena.get(terminus).prev;
            match prev {
                Some(p) if p != id => {
                    nvertices += 1;
                    arena.get_mut(terminus).visited = true;
                    terminus = p;
                }
                _ => break,
            }
        }
        arena.get_mut(terminus).visited = true;

        let mut cursor = arena.get(id).next;
        while let Some(v) = cursor {
            if v == terminus {
                break;
            }
            nvertices += 1;
            arena.get_mut(v).visited = true;
            cursor = arena.get(v).next;
        }

        let mut line = Vec::with_capacity(2 * nvertices);
        let mut v = terminus;
        for _ in 0..nvertices {
            let vertex = arena.get(v);
            line.push(vertex.x);
            line.push(vertex.y);
            match vertex.next {
                Some(next) => v = next,
                None => break,
            }
        }
        polylines.push(line);
    }
    polylines
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_open_chain_emits_from_terminus() {
        let mut arena = VertexArena::default();
        let a = arena.alloc(0.0, 0.0).unwrap();
        let b = arena.alloc(1.0, 0.0).unwrap();
        let c = arena.alloc(2.0, 0.0).unwrap();
        arena.link(a, b);
        arena.link(b, c);

        let polylines = chain_polylines(&mut arena);
        assert_eq!(polylines.len(), 1);
        assert_eq!(polylines[0], vec![0.0, 0.0, 1.0, 0.0, 2.0, 0.0]);
    }

    #[test]
    fn test_cycle_emits_each_vertex_once() {
        let mut arena = VertexArena::default();
        let a = arena.alloc(0.0, 0.0).unwrap();
        let b = arena.alloc(1.0, 0.0).unwrap();
        let c = arena.alloc(1.0, 1.0).unwrap();
        let d = arena.alloc(0.0, 1.0).unwrap();
        arena.link(a, b);
        arena.link(b, c);
        arena.link(c, d);
        arena.link(d, a);

        let polylines = chain_polylines(&mut arena);
        assert_eq!(polylines.len(), 1);
        assert_eq!(polylines[0].len(), 8);
    }

    #[test]
    fn test_multiple_chains_partition_the_arena() {
        let mut arena = VertexArena::default();
        let a = arena.alloc(0.0, 0.0).unwrap();
        let b = arena.alloc(1.0, 0.0).unwrap();
        arena.link(a, b);
        let c = arena.alloc(5.0, 5.0).unwrap();
        let d = arena.alloc(6.0, 5.0).unwrap();
        let e = arena.alloc(7.0, 5.0).unwrap();
        arena.link(d, e);
        arena.link(c, d);

        let polylines = chain_polylines(&mut arena);
        assert_eq!(polylines.len(), 2);
        let total: usize = polylines.iter().map(|p| p.len()).sum();
        assert_eq!(total, 10);
    }
}
