//! Least-squares polynomial fitting for empirical models.

use serde::{Deserialize, Serialize};

/// A fitted polynomial `c0 + c1·x + c2·x² + ...`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolyFit {
    pub coefficients: Vec<f64>,
    pub r_squared: f64,
}

impl PolyFit {
    pub fn degree(&self) -> usize {
        self.coefficients.len().saturating_sub(1)
    }

    pub fn predict(&self, x: f64) -> f64 {
        self.coefficients
            .iter()
            .rev()
            .fold(0.0, |acc, &c| acc * x + c)
    }

    /// Abscissa of the extremum of a quadratic fit.
    pub fn vertex(&self) -> Option<f64> {
        match self.coefficients.as_slice() {
            [_, b, a] if *a != 0.0 => Some(-b / (2.0 * a)),
            _ => None,
        }
    }
}

/// Fit a polynomial of `degree` to the points by solving the normal
/// equations. Needs at least `degree + 1` points with distinct abscissae.
pub fn fit_polynomial(xs: &[f64], ys: &[f64], degree: usize) -> Option<PolyFit> {
    let n = degree + 1;
    if xs.len() != ys.len() || xs.len() < n {
        return None;
    }
    if xs.iter().chain(ys).any(|v| !v.is_finite()) {
        return None;
    }

    // Augmented normal matrix [XᵀX | Xᵀy].
    let mut m = vec![vec![0.0; n + 1]; n];
    for (&x, &y) in xs.iter().zip(ys) {
        let powers: Vec<f64> = (0..=2 * degree).map(|k| x.powi(k as i32)).collect();
        for (r, row) in m.iter_mut().enumerate() {
            for c in 0..n {
                row[c] += powers[r + c];
            }
            row[n] += powers[r] * y;
        }
    }

    let coefficients = solve(m)?;
    let fit = PolyFit {
        coefficients,
        r_squared: 0.0,
    };

    let mean = ys.iter().sum::<f64>() / ys.len() as f64;
    let ss_tot: f64 = ys.iter().map(|y| (y - mean).powi(2)).sum();
    let ss_res: f64 = xs
        .iter()
        .zip(ys)
        .map(|(&x, &y)| (y - fit.predict(x)).powi(2))
        .sum();
    let r_squared = if ss_tot == 0.0 { 1.0 } else { 1.0 - ss_res / ss_tot };
    Some(PolyFit { r_squared, ..fit })
}

/// Gaussian elimination with partial pivoting.
fn solve(mut m: Vec<Vec<f64>>) -> Option<Vec<f64>> {
    let n = m.len();
    for col in 0..n {
        let pivot = (col..n).max_by(|&a, &b| m[a][col].abs().total_cmp(&m[b][col].abs()))?;
        if m[pivot][col].abs() < 1e-12 {
            return None;
        }
        m.swap(col, pivot);
        for row in col + 1..n {
            let factor = m[row][col] / m[col][col];
            for k in col..=n {
                m[row][k] -= factor * m[col][k];
            }
        }
    }
    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| m[row][k] * x[k]).sum();
        x[row] = (m[row][n] - tail) / m[row][row];
    }
    Some(x)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn exact_line() {
        let xs = [0.0, 1.0, 2.0, 3.0];
        let ys: Vec<f64> = xs.iter().map(|x| 3.0 + 2.0 * x).collect();
        let fit = fit_polynomial(&xs, &ys, 1).unwrap();
        assert!(close(fit.coefficients[0], 3.0));
        assert!(close(fit.coefficients[1], 2.0));
        assert!(close(fit.r_squared, 1.0));
        assert!(close(fit.predict(10.0), 23.0));
    }

    #[test]
    fn quadratic_vertex() {
        let xs = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let ys: Vec<f64> = xs.iter().map(|x| (x - 3.5_f64).powi(2) + 1.0).collect();
        let fit = fit_polynomial(&xs, &ys, 2).unwrap();
        assert_eq!(fit.degree(), 2);
        assert!(close(fit.vertex().unwrap(), 3.5));
    }

    #[test]
    fn degenerate_inputs_do_not_fit() {
        assert!(fit_polynomial(&[1.0], &[2.0], 1).is_none());
        assert!(fit_polynomial(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0], 1).is_none());
        assert!(fit_polynomial(&[1.0, 2.0], &[1.0], 1).is_none());
    }
}
