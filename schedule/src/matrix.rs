//! Two-dimensional schedules.
//!
//! A [`ScheduleMatrix`] has one row per rotation offset (a micro-batch lane) and one
//! column per timestep. Row `i` holds the per-stage fragments rotated right by
//! `offsets[i]`, so stage `s` of lane `i` runs at timestep `(s + offsets[i]) % n`.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleMatrix<T> {
    rows: Vec<Vec<T>>,
}

impl<T: Clone> ScheduleMatrix<T> {
    pub fn from_rows(rows: Vec<Vec<T>>) -> Self {
        Self { rows }
    }

    /// Lanes of `input` rotated right by their offset.
    pub fn rotated(offsets: &[usize], input: &[T]) -> Self {
        let rows = offsets
            .iter()
            .map(|&offset| {
                let mut row = input.to_vec();
                if !row.is_empty() {
                    let by = offset % row.len();
                    row.rotate_right(by);
                }
                row
            })
            .collect();
        Self { rows }
    }

    /// Steady-state schedule. Without interleaving, each timestep is additionally
    /// rotated so that every lane issues its stages in one consistent order.
    pub fn construct(offsets: &[usize], input: &[T], interleave: bool) -> Self {
        let matrix = Self::rotated(offsets, input);
        if interleave { matrix } else { matrix.transpose().rotate_rows().transpose() }
    }

    /// Ramp-up schedule: lane `i` has not started before timestep `offsets[i]`.
    pub fn ramp_up(offsets: &[usize], input: &[T], empty: &T) -> Self {
        let mut matrix = Self::rotated(offsets, input);
        for (row, &offset) in matrix.rows.iter_mut().zip(offsets) {
            let end = offset.min(row.len());
            row[..end].fill(empty.clone());
        }
        matrix
    }

    /// Ramp-down schedule: past the first `additional_iterations` lanes, lane `i`
    /// stops at timestep `offsets[i]`.
    pub fn ramp_down(offsets: &[usize], input: &[T], empty: &T, additional_iterations: usize) -> Self {
        let mut matrix = Self::rotated(offsets, input);
        for (row, &offset) in matrix.rows.iter_mut().zip(offsets).skip(additional_iterations) {
            let start = offset.min(row.len());
            row[start..].fill(empty.clone());
        }
        matrix
    }

    pub fn transpose(&self) -> Self {
        let columns = self.column_count();
        let rows = (0..columns).map(|c| self.rows.iter().map(|row| row[c].clone()).collect()).collect();
        Self { rows }
    }

    /// Rotate row `i` left by `i + 1`, leaving the last row alone.
    fn rotate_rows(mut self) -> Self {
        let last = self.rows.len().saturating_sub(1);
        for (i, row) in self.rows.iter_mut().enumerate().take(last) {
            if !row.is_empty() {
                let by = (i + 1) % row.len();
                row.rotate_left(by);
            }
        }
        self
    }

    /// Keep only the first `width` timesteps.
    pub fn truncate_columns(&mut self, width: usize) {
        self.rows.iter_mut().for_each(|row| row.truncate(width));
    }

    /// Concatenate the rows of several matrices with the same column count.
    pub fn stack(matrices: impl IntoIterator<Item = Self>) -> Self {
        Self { rows: matrices.into_iter().flat_map(|m| m.rows).collect() }
    }

    /// Timestep-major linearization: column 0 of every row, then column 1, ...
    pub fn flatten(self) -> Vec<T> {
        self.transpose().rows.into_iter().flatten().collect()
    }

    pub fn rows(&self) -> &[Vec<T>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.rows.first().map_or(0, Vec::len)
    }
}
