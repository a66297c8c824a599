//! Reduction of per-template filter groups into rectangular matrices.
//!
//! Rows are templates and columns are filters. Rows shorter than the
//! longest one at a rate are padded with zero gains and poles, and with the
//! smallest delay seen at that rate so that downstream code indexing by
//! delay stays in bounds.

use num::Complex;
use num_traits::Zero;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::decimate::DownsampledFilterGroup;
use crate::iir::FilterSet;
use crate::util::SpiirError;

/// Dense row-major matrix.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Matrix<T> {
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<T>,
}

impl<T: Clone> Matrix<T> {
    pub fn filled(rows: usize, cols: usize, value: T) -> Matrix<T> {
        Matrix {
            rows,
            cols,
            data: vec![value; rows * cols],
        }
    }

    pub fn row(&self, row: usize) -> &[T] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    pub fn row_mut(&mut self, row: usize) -> &mut [T] {
        &mut self.data[row * self.cols..(row + 1) * self.cols]
    }

    pub fn get(&self, row: usize, col: usize) -> Option<&T> {
        if row < self.rows && col < self.cols {
            self.data.get(row * self.cols + col)
        } else {
            None
        }
    }
}

/// Gains, poles and delays of every template at one sample rate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RateMatrices {
    pub a: Matrix<Complex<f64>>,
    pub b: Matrix<Complex<f64>>,
    pub d: Matrix<i32>,
}

/// Append-only collector for a single rate.
#[derive(Clone, Debug, Default)]
struct RateMatrixBuilder {
    rows: BTreeMap<usize, FilterSet>,
}

impl RateMatrixBuilder {
    fn close(self, n_rows: usize) -> RateMatrices {
        let cols = self.rows.values().map(|f| f.len()).max().unwrap_or(0);
        let min_delay = self
            .rows
            .values()
            .flat_map(|f| f.delay.iter())
            .min()
            .map_or(0, |&d| d as i32);

        let mut a = Matrix::filled(n_rows, cols, Complex::zero());
        let mut b = Matrix::filled(n_rows, cols, Complex::zero());
        let mut d = Matrix::filled(n_rows, cols, min_delay);
        for (row, filters) in self.rows {
            a.row_mut(row)[..filters.len()].copy_from_slice(&filters.a1);
            b.row_mut(row)[..filters.len()].copy_from_slice(&filters.b0);
            for (cell, delay) in d.row_mut(row).iter_mut().zip(filters.delay) {
                *cell = delay as i32;
            }
        }
        RateMatrices { a, b, d }
    }
}

/// Everything the assembler produces.
#[derive(Clone, Debug, PartialEq)]
pub struct AssembledBank {
    pub matrices: BTreeMap<u32, RateMatrices>,
    pub sigmasq: Vec<f64>,
    pub matches: Vec<f64>,
}

/// Collects per-template results in any order and turns them into
/// matrices once every template is in.
pub struct BankAssembler {
    n_rows: usize,
    rates: BTreeMap<u32, RateMatrixBuilder>,
    sigmasq: Vec<f64>,
    matches: Vec<f64>,
    seen: Vec<bool>,
}

impl BankAssembler {
    pub fn new(n_rows: usize) -> BankAssembler {
        BankAssembler {
            n_rows,
            rates: BTreeMap::new(),
            sigmasq: vec![0.0; n_rows],
            matches: vec![0.0; n_rows],
            seen: vec![false; n_rows],
        }
    }

    /// Adds the result of the template at `row`.
    ///
    /// Empty filter sets are skipped, so a template that has nothing at a
    /// rate shows up there as a pure padding row.
    pub fn push(
        &mut self,
        row: usize,
        group: DownsampledFilterGroup,
        sigmasq: f64,
        spiir_match: f64,
    ) -> Result<(), SpiirError> {
        if row >= self.n_rows {
            return Err(SpiirError::InvalidInput(format!(
                "row {} outside a bank of {} templates",
                row, self.n_rows
            )));
        }
        if self.seen[row] {
            return Err(SpiirError::InvalidInput(format!(
                "row {} was already assembled",
                row
            )));
        }
        self.seen[row] = true;
        for (rate, filters) in group.groups {
            if filters.is_empty() {
                continue;
            }
            self.rates.entry(rate).or_default().rows.insert(row, filters);
        }
        self.sigmasq[row] = sigmasq;
        self.matches[row] = spiir_match;
        Ok(())
    }

    /// Pads and stacks every rate.
    pub fn close(self) -> AssembledBank {
        let n_rows = self.n_rows;
        let matrices = self
            .rates
            .into_iter()
            .map(|(rate, builder)| (rate, builder.close(n_rows)))
            .collect();
        AssembledBank {
            matrices,
            sigmasq: self.sigmasq,
            matches: self.matches,
        }
    }
}

#[cfg(test)]
mod test {
    use crate::bank::assembler::*;

    fn filters(delays: &[u32]) -> FilterSet {
        let mut filters = FilterSet::default();
        for &d in delays {
            filters.push(
                Complex::new(0.5, 0.1),
                Complex::new(1.0, d as f64),
                d,
            );
        }
        filters
    }

    fn full_rate(delays: &[u32]) -> DownsampledFilterGroup {
        DownsampledFilterGroup::single_rate(512, filters(delays))
    }

    #[test]
    fn test_pads_with_min_delay() {
        let mut assembler = BankAssembler::new(3);
        let mut first = full_rate(&[4, 9, 7]);
        first.groups.insert(128, filters(&[3]));
        assembler.push(0, first, 2.0, 0.9).unwrap();
        assembler.push(2, full_rate(&[5]), 1.0, 0.8).unwrap();
        assembler.push(1, full_rate(&[6, 8]), 1.5, 0.7).unwrap();
        let bank = assembler.close();

        let full = &bank.matrices[&512];
        assert_eq!((full.d.rows, full.d.cols), (3, 3));
        assert_eq!(full.d.row(0), &[4, 9, 7]);
        assert_eq!(full.d.row(1), &[6, 8, 4]);
        assert_eq!(full.d.row(2), &[5, 4, 4]);
        assert_eq!(full.a.get(2, 1), Some(&Complex::zero()));
        assert_eq!(full.b.get(1, 1), Some(&Complex::new(1.0, 8.0)));

        // Only the first template has filters at 128 Hz.
        let low = &bank.matrices[&128];
        assert_eq!((low.d.rows, low.d.cols), (3, 1));
        assert_eq!(low.d.row(1), &[3]);
        assert_eq!(low.b.row(2), &[Complex::zero()]);

        assert_eq!(bank.sigmasq, vec![2.0, 1.5, 1.0]);
        assert_eq!(bank.matches, vec![0.9, 0.7, 0.8]);
    }

    #[test]
    fn test_rejects_bad_rows() {
        let mut assembler = BankAssembler::new(1);
        let group = DownsampledFilterGroup::single_rate(512, filters(&[1]));
        assert!(assembler.push(1, group.clone(), 0.0, 0.0).is_err());
        assembler.push(0, group.clone(), 0.0, 0.0).unwrap();
        assert!(assembler.push(0, group, 0.0, 0.0).is_err());
    }

    #[test]
    fn test_empty_groups_skipped() {
        let mut assembler = BankAssembler::new(2);
        let empty = full_rate(&[]);
        assembler.push(0, empty, 0.0, 0.0).unwrap();
        assert!(assembler.close().matrices.is_empty());
        assert!(Matrix::filled(2, 2, 0).get(2, 0).is_none());
    }
}
