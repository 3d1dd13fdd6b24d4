//! Discrete prolate spheroidal (Slepian) sequences.
//!
//! The tapers are the eigenvectors of the symmetric tridiagonal matrix that
//! commutes with the time-bandwidth concentration operator. The largest
//! eigenvalues are isolated by Sturm-sequence bisection and the vectors
//! recovered by inverse iteration, so memory stays linear in the length.

use crate::math::signal::autocorrelate;
use crate::prelude::{RfError, RfResult};
use std::collections::HashMap;
use std::f64::consts::PI;
use std::sync::Arc;

/// Orthonormal tapers with their spectral concentration ratios.
#[derive(Debug, Clone)]
pub struct TaperSet {
    pub tapers: Vec<Vec<f64>>,
    pub concentrations: Vec<f64>,
    pub time_bandwidth: f64,
}

impl TaperSet {
    pub fn len(&self) -> usize {
        self.tapers.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.tapers.is_empty()
    }

    pub fn count(&self) -> usize {
        self.tapers.len()
    }
}

struct Tridiagonal {
    diag: Vec<f64>,
    off: Vec<f64>,
}

impl Tridiagonal {
    fn slepian(n: usize, bandwidth: f64) -> Self {
        let cos_w = (2.0 * PI * bandwidth).cos();
        let diag = (0..n)
            .map(|i| {
                let half = (n as f64 - 1.0 - 2.0 * i as f64) / 2.0;
                half * half * cos_w
            })
            .collect();
        let off = (1..n)
            .map(|i| (i as f64) * (n - i) as f64 / 2.0)
            .collect();
        Self { diag, off }
    }

    /// Number of eigenvalues strictly below `x`.
    fn sturm_count(&self, x: f64, pivmin: f64) -> usize {
        let mut count = 0;
        let mut q = self.diag[0] - x;
        if q < 0.0 {
            count += 1;
        }
        for i in 1..self.diag.len() {
            if q.abs() < pivmin {
                q = -pivmin;
            }
            q = self.diag[i] - x - self.off[i - 1] * self.off[i - 1] / q;
            if q < 0.0 {
                count += 1;
            }
        }
        count
    }

    fn gershgorin(&self) -> (f64, f64) {
        let n = self.diag.len();
        let mut lo = f64::INFINITY;
        let mut hi = f64::NEG_INFINITY;
        for i in 0..n {
            let left = if i > 0 { self.off[i - 1].abs() } else { 0.0 };
            let right = if i + 1 < n { self.off[i].abs() } else { 0.0 };
            lo = lo.min(self.diag[i] - left - right);
            hi = hi.max(self.diag[i] + left + right);
        }
        (lo, hi)
    }

    /// The `index`-th smallest eigenvalue.
    fn eigenvalue(&self, index: usize) -> f64 {
        let (mut lo, mut hi) = self.gershgorin();
        let scale = lo.abs().max(hi.abs()).max(1.0);
        let pivmin = f64::MIN_POSITIVE.sqrt() * scale;
        for _ in 0..200 {
            let mid = 0.5 * (lo + hi);
            if self.sturm_count(mid, pivmin) > index {
                hi = mid;
            } else {
                lo = mid;
            }
            if hi - lo <= 4.0 * f64::EPSILON * scale {
                break;
            }
        }
        0.5 * (lo + hi)
    }

    /// Solves `(T - shift I) x = rhs` with partial pivoting.
    fn shifted_solve(&self, shift: f64, rhs: &mut [f64]) {
        let n = self.diag.len();
        let mut d: Vec<f64> = self.diag.iter().map(|v| v - shift).collect();
        let mut dl = self.off.clone();
        let mut du = self.off.clone();
        let mut du2 = vec![0.0; n.saturating_sub(2)];
        let mut swapped = vec![false; n.saturating_sub(1)];
        let tiny = f64::EPSILON * d.iter().fold(1.0_f64, |acc, v| acc.max(v.abs()));

        for i in 0..n.saturating_sub(1) {
            if d[i].abs() >= dl[i].abs() {
                if d[i] == 0.0 {
                    d[i] = tiny;
                }
                let fact = dl[i] / d[i];
                dl[i] = fact;
                d[i + 1] -= fact * du[i];
            } else {
                let fact = d[i] / dl[i];
                d[i] = dl[i];
                dl[i] = fact;
                let temp = du[i];
                du[i] = d[i + 1];
                d[i + 1] = temp - fact * d[i + 1];
                if i + 2 < n {
                    du2[i] = du[i + 1];
                    du[i + 1] = -fact * du[i + 1];
                }
                swapped[i] = true;
            }
        }
        if d[n - 1] == 0.0 {
            d[n - 1] = tiny;
        }

        for i in 0..n.saturating_sub(1) {
            if swapped[i] {
                let temp = rhs[i] - dl[i] * rhs[i + 1];
                rhs[i] = rhs[i + 1];
                rhs[i + 1] = temp;
            } else {
                rhs[i + 1] -= dl[i] * rhs[i];
            }
        }

        rhs[n - 1] /= d[n - 1];
        if n > 1 {
            rhs[n - 2] = (rhs[n - 2] - du[n - 2] * rhs[n - 1]) / d[n - 2];
        }
        for i in (0..n.saturating_sub(2)).rev() {
            rhs[i] = (rhs[i] - du[i] * rhs[i + 1] - du2[i] * rhs[i + 2]) / d[i];
        }
    }
}

fn normalize(v: &mut [f64]) -> bool {
    let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm == 0.0 || !norm.is_finite() {
        return false;
    }
    for x in v.iter_mut() {
        *x /= norm;
    }
    true
}

/// Fraction of a taper's energy inside `[-W, W]`.
fn concentration(taper: &[f64], bandwidth: f64) -> f64 {
    let r = autocorrelate(taper);
    let mut lambda = 2.0 * bandwidth * r[0];
    for (lag, value) in r.iter().enumerate().skip(1) {
        let l = lag as f64;
        lambda += 2.0 * value * (2.0 * PI * bandwidth * l).sin() / (PI * l);
    }
    lambda.clamp(0.0, 1.0)
}

/// First `count` DPSS tapers of length `n` for time-bandwidth product `nw`.
///
/// Even tapers have a positive sum, odd tapers start with a positive lobe.
pub fn dpss(n: usize, nw: f64, count: usize) -> RfResult<TaperSet> {
    if n < 2 {
        return Err(RfError::InvalidParameter(format!(
            "taper length {} is too short",
            n
        )));
    }
    if count == 0 || count > n {
        return Err(RfError::InvalidParameter(format!(
            "cannot build {} tapers of length {}",
            count, n
        )));
    }
    if !(nw > 0.0) || 2.0 * nw >= n as f64 {
        return Err(RfError::InvalidParameter(format!(
            "time-bandwidth {} invalid for length {}",
            nw, n
        )));
    }

    let bandwidth = nw / n as f64;
    let matrix = Tridiagonal::slepian(n, bandwidth);
    let center = (n as f64 - 1.0) / 2.0;
    let mut tapers: Vec<Vec<f64>> = Vec::with_capacity(count);
    let mut concentrations = Vec::with_capacity(count);

    for k in 0..count {
        let eigenvalue = matrix.eigenvalue(n - 1 - k);
        let mut v: Vec<f64> = (0..n).map(|i| 1.0 + i as f64 / n as f64).collect();
        for _ in 0..4 {
            matrix.shifted_solve(eigenvalue, &mut v);
            for previous in &tapers {
                let dot: f64 = previous.iter().zip(v.iter()).map(|(a, b)| a * b).sum();
                for (x, p) in v.iter_mut().zip(previous.iter()) {
                    *x -= dot * p;
                }
            }
            if !normalize(&mut v) {
                return Err(RfError::Internal(format!(
                    "inverse iteration diverged for taper {}",
                    k
                )));
            }
        }

        let orientation: f64 = if k % 2 == 0 {
            v.iter().sum()
        } else {
            v.iter()
                .enumerate()
                .map(|(i, x)| x * (center - i as f64))
                .sum()
        };
        if orientation < 0.0 {
            for x in v.iter_mut() {
                *x = -*x;
            }
        }

        concentrations.push(concentration(&v, bandwidth));
        tapers.push(v);
    }

    Ok(TaperSet {
        tapers,
        concentrations,
        time_bandwidth: nw,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct TaperKey {
    len: usize,
    nw_bits: u64,
    count: usize,
}

impl TaperKey {
    fn new(len: usize, nw: f64, count: usize) -> Self {
        Self {
            len,
            nw_bits: nw.to_bits(),
            count,
        }
    }
}

/// Read-only cache of taper sets, filled before workers start.
#[derive(Debug, Clone, Default)]
pub struct TaperBank {
    sets: HashMap<TaperKey, Arc<TaperSet>>,
}

impl TaperBank {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prepare(&mut self, len: usize, nw: f64, count: usize) -> RfResult<Arc<TaperSet>> {
        let key = TaperKey::new(len, nw, count);
        if let Some(existing) = self.sets.get(&key) {
            return Ok(existing.clone());
        }
        let set = Arc::new(dpss(len, nw, count)?);
        self.sets.insert(key, set.clone());
        Ok(set)
    }

    pub fn get(&self, len: usize, nw: f64, count: usize) -> Option<Arc<TaperSet>> {
        self.sets.get(&TaperKey::new(len, nw, count)).cloned()
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dpss_tapers_are_orthonormal() {
        let set = dpss(64, 2.5, 4).unwrap();
        assert_eq!(set.count(), 4);
        for i in 0..4 {
            for j in 0..4 {
                let dot: f64 = set.tapers[i]
                    .iter()
                    .zip(set.tapers[j].iter())
                    .map(|(a, b)| a * b)
                    .sum();
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((dot - expected).abs() < 1e-8, "<{},{}> = {}", i, j, dot);
            }
        }
    }

    #[test]
    fn dpss_concentrations_are_high_and_decreasing() {
        let set = dpss(128, 3.0, 5).unwrap();
        assert!(set.concentrations[0] > 0.999);
        for pair in set.concentrations.windows(2) {
            assert!(pair[0] >= pair[1] - 1e-9);
        }
        assert!(set.concentrations[3] > 0.9);
    }

    #[test]
    fn dpss_sign_and_symmetry_conventions() {
        let set = dpss(65, 2.0, 2).unwrap();
        let first = &set.tapers[0];
        let second = &set.tapers[1];
        assert!(first.iter().sum::<f64>() > 0.0);
        assert!((first[0] - first[64]).abs() < 1e-8);
        assert!((second[10] + second[54]).abs() < 1e-8);
        assert!(second[10] > 0.0);
    }

    #[test]
    fn bank_reuses_prepared_sets() {
        let mut bank = TaperBank::new();
        let prepared = bank.prepare(32, 2.0, 3).unwrap();
        let cached = bank.get(32, 2.0, 3).unwrap();
        assert!(Arc::ptr_eq(&prepared, &cached));
        assert!(bank.get(32, 2.5, 3).is_none());
    }

    #[test]
    fn dpss_rejects_excessive_bandwidth() {
        assert!(dpss(8, 4.0, 2).is_err());
        assert!(dpss(8, 2.0, 0).is_err());
    }
}
