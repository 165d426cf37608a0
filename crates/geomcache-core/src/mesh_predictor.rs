//! Spatial parallelogram predictor for I-frame vertex streams.
//!
//! Every vertex `idx` is predicted as `value[u] + value[v] - value[w]` where
//! `(idx, u, v)` and `(u, v, w)` are neighbouring triangles and `u`, `v`, `w`
//! were emitted earlier, no further than `MESH_PREDICTOR_LOOK_BACK_MAX_DIST`
//! vertices back. The table stores the backwards distances so it only
//! depends on the vertex order, not on the index buffers at decode time.

use crate::encoder_buffer::EncoderBuffer;
use crate::file_format::{MESH_PREDICTOR_LOOK_BACK_MAX_DIST, NO_PREDICTOR};
use crate::stream_data::Component;

/// Hit rate below which a mesh compiles with a quality warning.
pub const LOW_HIT_RATE: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MeshPredictor {
    /// `[idx - u, idx - v, idx - w]` per vertex, `[NO_PREDICTOR; 3]` when unpredicted.
    entries: Vec<[u16; 3]>,
}

impl MeshPredictor {
    /// Builds the table from triangle lists and tick-0 positions (`[x, y, z]`
    /// flattened). Vertices must already be in first-use order.
    pub fn build<'a>(index_buffers: impl IntoIterator<Item = &'a [u32]>, positions: &[u16]) -> Self {
        let num_vertices = positions.len() / 3;
        let adjacency = build_adjacency(index_buffers, num_vertices);

        let entries = (0..num_vertices)
            .map(|idx| best_parallelogram(idx, &adjacency, positions).unwrap_or([NO_PREDICTOR; 3]))
            .collect();
        Self { entries }
    }

    pub fn from_entries(entries: Vec<[u16; 3]>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[[u16; 3]] {
        &self.entries
    }

    pub fn num_vertices(&self) -> usize {
        self.entries.len()
    }

    /// Share of vertices with a parallelogram neighbour.
    pub fn hit_rate(&self) -> f64 {
        if self.entries.is_empty() {
            return 1.0;
        }
        let hits = self.entries.iter().filter(|e| e[0] != NO_PREDICTOR).count();
        hits as f64 / self.entries.len() as f64
    }

    pub fn has_low_hit_rate(&self) -> bool {
        self.hit_rate() < LOW_HIT_RATE
    }

    pub fn encode(&self, buffer: &mut EncoderBuffer) {
        for entry in &self.entries {
            for &delta in entry {
                buffer.encode_u16(delta);
            }
        }
    }

    /// Replaces each predicted vertex with its spatial residual.
    ///
    /// Predictions read the original values, so the output does not depend
    /// on iteration order.
    pub fn encode_residuals<T: Component>(&self, values: &[T], components: usize) -> Vec<T> {
        let mut out = values.to_vec();
        for (idx, entry) in self.entries.iter().enumerate() {
            if let Some([u, v, w]) = self.neighbours(idx, entry) {
                for c in 0..components {
                    let predicted = predict(values, components, c, u, v, w);
                    out[idx * components + c] = values[idx * components + c].wrapping_sub(&predicted);
                }
            }
        }
        out
    }

    /// Inverse of `encode_residuals`, in ascending vertex order.
    pub fn decode_residuals<T: Component>(&self, values: &mut [T], components: usize) {
        for (idx, entry) in self.entries.iter().enumerate() {
            if let Some([u, v, w]) = self.neighbours(idx, entry) {
                for c in 0..components {
                    let predicted = predict(values, components, c, u, v, w);
                    let slot = &mut values[idx * components + c];
                    *slot = slot.wrapping_add(&predicted);
                }
            }
        }
    }

    #[inline]
    fn neighbours(&self, idx: usize, entry: &[u16; 3]) -> Option<[usize; 3]> {
        if entry[0] == NO_PREDICTOR {
            return None;
        }
        Some([
            idx - entry[0] as usize,
            idx - entry[1] as usize,
            idx - entry[2] as usize,
        ])
    }
}

#[inline]
fn predict<T: Component>(values: &[T], components: usize, c: usize, u: usize, v: usize, w: usize) -> T {
    values[u * components + c]
        .wrapping_add(&values[v * components + c])
        .wrapping_sub(&values[w * components + c])
}

/// Sorted, deduplicated vertex neighbours from triangle edges.
fn build_adjacency<'a>(index_buffers: impl IntoIterator<Item = &'a [u32]>, num_vertices: usize) -> Vec<Vec<u32>> {
    let mut adjacency: Vec<Vec<u32>> = vec![Vec::new(); num_vertices];
    for indices in index_buffers {
        for tri in indices.chunks_exact(3) {
            for (a, b) in [(tri[0], tri[1]), (tri[1], tri[2]), (tri[2], tri[0])] {
                if a == b || a as usize >= num_vertices || b as usize >= num_vertices {
                    continue;
                }
                adjacency[a as usize].push(b);
                adjacency[b as usize].push(a);
            }
        }
    }
    for neighbours in &mut adjacency {
        neighbours.sort_unstable();
        neighbours.dedup();
    }
    adjacency
}

fn in_window(idx: usize, other: u32) -> bool {
    let other = other as usize;
    other < idx && idx - other <= MESH_PREDICTOR_LOOK_BACK_MAX_DIST as usize
}

fn best_parallelogram(idx: usize, adjacency: &[Vec<u32>], positions: &[u16]) -> Option<[u16; 3]> {
    let earlier: Vec<u32> = adjacency[idx].iter().copied().filter(|&n| in_window(idx, n)).collect();
    let actual = pos(positions, idx);

    let mut best: Option<([u16; 3], i64)> = None;
    for (i, &u) in earlier.iter().enumerate() {
        for &v in &earlier[i + 1..] {
            if adjacency[u as usize].binary_search(&v).is_err() {
                continue;
            }
            for &w in &adjacency[u as usize] {
                if w as usize == idx || !in_window(idx, w) || adjacency[v as usize].binary_search(&w).is_err() {
                    continue;
                }

                let (pu, pv, pw) = (pos(positions, u as usize), pos(positions, v as usize), pos(positions, w as usize));
                let error: i64 = (0..3).map(|c| (pu[c] + pv[c] - pw[c] - actual[c]).abs()).sum();
                if best.map_or(true, |(_, e)| error < e) {
                    let delta = |n: u32| (idx - n as usize) as u16;
                    best = Some(([delta(u), delta(v), delta(w)], error));
                }
            }
        }
    }
    best.map(|(entry, _)| entry)
}

#[inline]
fn pos(positions: &[u16], vertex: usize) -> [i64; 3] {
    let p = &positions[vertex * 3..vertex * 3 + 3];
    [p[0] as i64, p[1] as i64, p[2] as i64]
}

#[cfg(test)]
mod tests {
    use super::*;

    // Two triangles sharing the 1-2 edge: 0 1 2, 2 1 3
    fn quad() -> (Vec<u32>, Vec<u16>) {
        let indices = vec![0, 1, 2, 2, 1, 3];
        let positions = vec![0, 0, 0, 10, 0, 0, 0, 10, 0, 10, 10, 0];
        (indices, positions)
    }

    #[test]
    fn test_first_vertices_have_no_predictor() {
        let (indices, positions) = quad();
        let predictor = MeshPredictor::build([indices.as_slice()], &positions);
        assert_eq!(predictor.num_vertices(), 4);
        for idx in 0..3 {
            assert_eq!(predictor.entries()[idx], [NO_PREDICTOR; 3]);
        }
        // 3 = 1 + 2 - 0
        assert_eq!(predictor.entries()[3], [2, 1, 3]);
        assert_eq!(predictor.hit_rate(), 0.25);
    }

    #[test]
    fn test_perfect_parallelogram_residual_is_zero() {
        let (indices, positions) = quad();
        let predictor = MeshPredictor::build([indices.as_slice()], &positions);
        let residuals = predictor.encode_residuals(&positions, 3);
        assert_eq!(&residuals[9..12], &[0, 0, 0]);
        assert_eq!(&residuals[..9], &positions[..9]);

        let mut decoded = residuals.clone();
        predictor.decode_residuals(&mut decoded, 3);
        assert_eq!(decoded, positions);
    }

    #[test]
    fn test_picks_lowest_error_candidate() {
        // Fan around vertex 4 gives two candidate parallelograms
        let indices = vec![0, 1, 2, 1, 3, 2, 2, 3, 4, 0, 2, 4];
        let positions = vec![
            0, 0, 0, //
            10, 0, 0, //
            5, 5, 0, //
            15, 5, 0, //
            10, 10, 0,
        ];
        let predictor = MeshPredictor::build([indices.as_slice()], &positions);
        let [du, dv, dw] = predictor.entries()[4];
        let (u, v, w) = (4 - du as usize, 4 - dv as usize, 4 - dw as usize);
        let predicted: Vec<i64> = (0..3)
            .map(|c| positions[u * 3 + c] as i64 + positions[v * 3 + c] as i64 - positions[w * 3 + c] as i64)
            .collect();
        assert_eq!(predicted, vec![10, 10, 0]);
    }

    #[test]
    fn test_look_back_window() {
        let far = MESH_PREDICTOR_LOOK_BACK_MAX_DIST as usize + 10;
        let n = far + 1;
        let mut positions = vec![0u16; n * 3];
        positions[far * 3] = 1;
        // The triangle pair reaches back further than the window allows
        let indices = vec![0, 1, 2, 2, 1, far as u32];
        let predictor = MeshPredictor::build([indices.as_slice()], &positions);
        assert_eq!(predictor.entries()[far], [NO_PREDICTOR; 3]);
    }

    #[test]
    fn test_wrapping_residuals_round_trip() {
        let (indices, mut positions) = quad();
        positions[9] = u16::MAX;
        positions[0] = u16::MAX;
        let predictor = MeshPredictor::build([indices.as_slice()], &positions);
        let mut values = predictor.encode_residuals(&positions, 3);
        predictor.decode_residuals(&mut values, 3);
        assert_eq!(values, positions);
    }
}
