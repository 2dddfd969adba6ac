//! Shared parameter buffers for concurrent training
//!
//! Workers read and write these without any lock. Each element is an
//! `f32` stored in an `AtomicU32` and accessed with relaxed ordering, so a
//! read never observes a torn value, but two workers updating the same
//! element can lose one of the updates. Hogwild-style SGD (BPR, FM) accepts
//! that loss; row-partitioned solvers (ALS, CCD) never write the same row
//! from two workers in the first place.

use ndarray::{Array1, Array2};
use std::sync::atomic::{AtomicU32, Ordering};

#[derive(Debug, Default)]
pub struct AtomicF32(AtomicU32);

impl AtomicF32 {
    pub fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    #[inline]
    pub fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed)
    }

    /// Read-modify-write without CAS: concurrent adds may be lost.
    #[inline]
    pub fn add(&self, delta: f32) {
        self.store(self.load() + delta)
    }
}

/// Row-major matrix of [`AtomicF32`].
#[derive(Debug)]
pub struct SharedMatrix {
    rows: usize,
    cols: usize,
    data: Vec<AtomicF32>,
}

impl SharedMatrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: (0..rows * cols).map(|_| AtomicF32::new(0.0)).collect(),
        }
    }

    pub fn from_array(array: &Array2<f32>) -> Self {
        let (rows, cols) = array.dim();
        Self {
            rows,
            cols,
            data: array.iter().map(|&v| AtomicF32::new(v)).collect(),
        }
    }

    pub fn to_array(&self) -> Array2<f32> {
        Array2::from_shape_fn((self.rows, self.cols), |(r, c)| self.get(r, c))
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.data[row * self.cols + col].load()
    }

    #[inline]
    pub fn set(&self, row: usize, col: usize, value: f32) {
        self.data[row * self.cols + col].store(value)
    }

    /// Copies one row into `out`, which must hold `cols` values.
    pub fn read_row(&self, row: usize, out: &mut [f32]) {
        let start = row * self.cols;
        for (dst, src) in out.iter_mut().zip(&self.data[start..start + self.cols]) {
            *dst = src.load();
        }
    }

    pub fn write_row(&self, row: usize, values: &[f32]) {
        let start = row * self.cols;
        for (dst, &src) in self.data[start..start + self.cols].iter().zip(values) {
            dst.store(src);
        }
    }

    /// `row += alpha * values`
    pub fn add_scaled_row(&self, row: usize, alpha: f32, values: &[f32]) {
        let start = row * self.cols;
        for (dst, &src) in self.data[start..start + self.cols].iter().zip(values) {
            dst.add(alpha * src);
        }
    }

    pub fn dot_rows(&self, row: usize, other: &SharedMatrix, other_row: usize) -> f32 {
        (0..self.cols)
            .map(|c| self.get(row, c) * other.get(other_row, c))
            .sum()
    }
}

/// Vector of [`AtomicF32`].
#[derive(Debug)]
pub struct SharedVector {
    data: Vec<AtomicF32>,
}

impl SharedVector {
    pub fn from_array(array: &Array1<f32>) -> Self {
        Self {
            data: array.iter().map(|&v| AtomicF32::new(v)).collect(),
        }
    }

    pub fn to_array(&self) -> Array1<f32> {
        self.data.iter().map(AtomicF32::load).collect()
    }

    #[inline]
    pub fn get(&self, index: usize) -> f32 {
        self.data[index].load()
    }

    #[inline]
    pub fn add(&self, index: usize, delta: f32) {
        self.data[index].add(delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_shared_matrix_round_trip() {
        let source = array![[1.0f32, 2.0], [3.0, 4.0], [5.0, 6.0]];
        let shared = SharedMatrix::from_array(&source);
        assert_eq!(shared.rows(), 3);
        assert_eq!(shared.cols(), 2);
        assert_eq!(shared.to_array(), source);
    }

    #[test]
    fn test_row_operations() {
        let shared = SharedMatrix::zeros(2, 3);
        shared.write_row(1, &[1.0, 2.0, 3.0]);
        shared.add_scaled_row(1, 2.0, &[1.0, 1.0, 1.0]);

        let mut row = vec![0.0; 3];
        shared.read_row(1, &mut row);
        assert_eq!(row, vec![3.0, 4.0, 5.0]);

        shared.write_row(0, &[1.0, 0.0, 1.0]);
        assert_eq!(shared.dot_rows(0, &shared, 1), 8.0);
    }

    #[test]
    fn test_shared_vector() {
        let shared = SharedVector::from_array(&array![0.5f32, 1.5]);
        shared.add(1, 0.5);
        assert_eq!(shared.get(1), 2.0);
        assert_eq!(shared.to_array(), array![0.5f32, 2.0]);
    }
}
