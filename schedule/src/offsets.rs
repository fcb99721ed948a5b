//! Rotation offsets.
//!
//! A pipeline runs one micro-batch per stage per timestep. Offsetting micro-batch `k`
//! by a rotation `o_k` of the stage sequence overlaps several micro-batches in time;
//! two rotations may run together only if they never place stages of the same shard
//! at the same timestep.

/// Whether rotations `i` and `j` of `mapping` put equal elements at some position.
pub fn rotations_conflict<T: PartialEq>(mapping: &[T], i: usize, j: usize) -> bool {
    let n = mapping.len();
    (0..n).any(|t| mapping[(t + i) % n] == mapping[(t + j) % n])
}

/// Greedy set of mutually non-conflicting left rotations of `mapping`.
///
/// Rotation 0 is always accepted. Candidates are tried in increasing order and kept
/// if they conflict with none of the accepted ones.
///
/// ```ignore
/// assert_eq!(circular_union(&[0, 1, 2]), vec![0, 1, 2]);
/// assert_eq!(circular_union(&[0, 1, 0, 1]), vec![0, 1]);
/// ```
pub fn circular_union<T: PartialEq>(mapping: &[T]) -> Vec<usize> {
    if mapping.is_empty() {
        return Vec::new();
    }
    let mut accepted = vec![0];
    for candidate in 1..mapping.len() {
        if accepted.iter().all(|&k| !rotations_conflict(mapping, candidate, k)) {
            accepted.push(candidate);
        }
    }
    accepted
}

/// Every rotation, overlapping or not.
pub fn all_union(stage_count: usize) -> Vec<usize> {
    (0..stage_count).collect()
}

/// Offsets for `mapping` in the given execution mode.
pub fn stage_offsets(mapping: &[u32], interleave: bool) -> Vec<usize> {
    if interleave { circular_union(mapping) } else { all_union(mapping.len()) }
}
