//! Matrix operations over exact rationals.
//!
//! Used for the linear-independence constraints of the hyperplane search
//! (orthogonal complement of the rows found so far) and for inverting
//! schedules when building the remapping.

use num_bigint::BigInt;
use num_integer::Integer;
use num_rational::BigRational;
use num_traits::{One, ToPrimitive, Zero};
use std::fmt;

/// A matrix with rational entries, used for exact arithmetic in polyhedral operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RationalMatrix {
    data: Vec<Vec<BigRational>>,
    rows: usize,
    cols: usize,
}

/// Lift an integer into a rational.
pub fn rat(v: i64) -> BigRational {
    BigRational::from_integer(BigInt::from(v))
}

impl RationalMatrix {
    /// Create a new matrix with the given dimensions, initialized to zero.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            data: vec![vec![BigRational::zero(); cols]; rows],
            rows,
            cols,
        }
    }

    /// Create an identity matrix.
    pub fn identity(n: usize) -> Self {
        let mut mat = Self::zeros(n, n);
        for i in 0..n {
            mat.data[i][i] = BigRational::one();
        }
        mat
    }

    /// Create a matrix from integer rows. All rows must have `cols` entries.
    pub fn from_vec(data: Vec<Vec<i64>>, cols: usize) -> Self {
        let rows = data.len();
        let data = data
            .into_iter()
            .map(|row| {
                debug_assert_eq!(row.len(), cols);
                row.into_iter().map(rat).collect()
            })
            .collect();
        Self { data, rows, cols }
    }

    pub fn nrows(&self) -> usize {
        self.rows
    }

    pub fn ncols(&self) -> usize {
        self.cols
    }

    /// Get an element.
    pub fn get(&self, row: usize, col: usize) -> Option<&BigRational> {
        self.data.get(row)?.get(col)
    }

    /// Set an element.
    pub fn set(&mut self, row: usize, col: usize, value: BigRational) {
        if row < self.rows && col < self.cols {
            self.data[row][col] = value;
        }
    }

    /// Get a row as a slice.
    pub fn row(&self, row: usize) -> Option<&[BigRational]> {
        self.data.get(row).map(|r| r.as_slice())
    }

    /// Matrix-vector multiplication.
    pub fn mul_vec(&self, vec: &[BigRational]) -> Option<Vec<BigRational>> {
        if self.cols != vec.len() {
            return None;
        }
        Some(
            self.data
                .iter()
                .map(|row| {
                    row.iter()
                        .zip(vec)
                        .fold(BigRational::zero(), |acc, (a, b)| acc + a * b)
                })
                .collect(),
        )
    }

    /// Reduced row-echelon form. Returns the reduced matrix and its pivot columns.
    pub fn row_echelon(&self) -> (Self, Vec<usize>) {
        let mut m = self.clone();
        let mut pivots = Vec::new();
        let mut r = 0;
        for c in 0..self.cols {
            if r == self.rows {
                break;
            }
            let Some(p) = (r..self.rows).find(|&i| !m.data[i][c].is_zero()) else {
                continue;
            };
            m.data.swap(r, p);
            let pivot = m.data[r][c].clone();
            for v in m.data[r].iter_mut() {
                *v = &*v / &pivot;
            }
            let pivot_row = m.data[r].clone();
            for i in 0..self.rows {
                if i != r && !m.data[i][c].is_zero() {
                    let factor = m.data[i][c].clone();
                    for (v, pv) in m.data[i].iter_mut().zip(&pivot_row) {
                        *v -= &factor * pv;
                    }
                }
            }
            pivots.push(c);
            r += 1;
        }
        (m, pivots)
    }

    /// Rank of the matrix.
    pub fn rank(&self) -> usize {
        self.row_echelon().1.len()
    }

    /// Basis of the right null space `{ x : A x = 0 }`, one vector per free column.
    pub fn null_space(&self) -> Vec<Vec<BigRational>> {
        let (rref, pivots) = self.row_echelon();
        let mut basis = Vec::new();
        for free in (0..self.cols).filter(|c| !pivots.contains(c)) {
            let mut v = vec![BigRational::zero(); self.cols];
            v[free] = BigRational::one();
            for (r, &pc) in pivots.iter().enumerate() {
                v[pc] = -rref.data[r][free].clone();
            }
            basis.push(v);
        }
        basis
    }

    /// Compute the determinant (for square matrices).
    pub fn determinant(&self) -> Option<BigRational> {
        if self.rows != self.cols {
            return None;
        }
        let mut lu = self.clone();
        let mut det = BigRational::one();
        for k in 0..self.rows {
            let Some(p) = (k..self.rows).find(|&i| !lu.data[i][k].is_zero()) else {
                return Some(BigRational::zero());
            };
            if p != k {
                lu.data.swap(k, p);
                det = -det;
            }
            det *= &lu.data[k][k];
            for i in (k + 1)..self.rows {
                let factor = &lu.data[i][k] / &lu.data[k][k];
                let row_k = lu.data[k].clone();
                for j in k..self.cols {
                    let delta = &factor * &row_k[j];
                    lu.data[i][j] -= delta;
                }
            }
        }
        Some(det)
    }

    /// Compute the inverse (for square matrices with non-zero determinant).
    pub fn inverse(&self) -> Option<Self> {
        if self.rows != self.cols {
            return None;
        }
        let n = self.rows;
        let mut aug = Self::zeros(n, 2 * n);
        for i in 0..n {
            for j in 0..n {
                aug.data[i][j] = self.data[i][j].clone();
            }
            aug.data[i][n + i] = BigRational::one();
        }
        let (rref, pivots) = aug.row_echelon();
        if pivots.len() < n || pivots[n - 1] >= n {
            return None;
        }
        let mut inv = Self::zeros(n, n);
        for i in 0..n {
            for j in 0..n {
                inv.data[i][j] = rref.data[i][n + j].clone();
            }
        }
        Some(inv)
    }

    /// Check if all entries are integers.
    pub fn is_integer(&self) -> bool {
        self.data.iter().all(|row| row.iter().all(|r| r.is_integer()))
    }

    /// Convert to an integer matrix if every entry is an integer that fits in i64.
    pub fn to_integer_matrix(&self) -> Option<Vec<Vec<i64>>> {
        self.data
            .iter()
            .map(|row| {
                row.iter()
                    .map(|r| if r.is_integer() { r.numer().to_i64() } else { None })
                    .collect()
            })
            .collect()
    }
}

impl fmt::Display for RationalMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[")?;
        for row in &self.data {
            write!(f, "  [")?;
            for (j, val) in row.iter().enumerate() {
                if j > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", val)?;
            }
            writeln!(f, "]")?;
        }
        write!(f, "]")
    }
}

/// Compute the GCD of a vector of integers.
pub fn vector_gcd(v: &[i64]) -> i64 {
    v.iter().fold(0, |acc, &x| acc.gcd(&x))
}

/// Divide a vector by the gcd of its entries.
pub fn primitive(v: &[i64]) -> Vec<i64> {
    let g = vector_gcd(v);
    if g <= 1 {
        v.to_vec()
    } else {
        v.iter().map(|&x| x / g).collect()
    }
}

/// Scale a rational vector by the lcm of its denominators.
///
/// Returns the integer vector and the scale factor, or `None` when an entry
/// does not fit in i64.
pub fn scale_to_integers(v: &[BigRational]) -> Option<(Vec<i64>, i64)> {
    let lcm = v
        .iter()
        .fold(BigInt::one(), |acc, r| acc.lcm(r.denom()));
    let scale = BigRational::from_integer(lcm.clone());
    let ints = v
        .iter()
        .map(|r| (r * &scale).to_integer().to_i64())
        .collect::<Option<Vec<_>>>()?;
    Some((ints, lcm.to_i64()?))
}

/// Integer vector with common factors removed from a rational direction.
pub fn integer_direction(v: &[BigRational]) -> Option<Vec<i64>> {
    let (ints, _) = scale_to_integers(v)?;
    Some(primitive(&ints))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_determinant() {
        let m = RationalMatrix::from_vec(vec![vec![1, 2], vec![3, 4]], 2);
        assert_eq!(m.determinant(), Some(rat(-2)));
        let singular = RationalMatrix::from_vec(vec![vec![1, 2], vec![2, 4]], 2);
        assert_eq!(singular.determinant(), Some(rat(0)));
    }

    #[test]
    fn test_inverse() {
        let m = RationalMatrix::from_vec(vec![vec![1, 1], vec![1, -1]], 2);
        let inv = m.inverse().unwrap();
        let half = BigRational::new(BigInt::from(1), BigInt::from(2));
        assert_eq!(inv.get(0, 0), Some(&half));
        assert_eq!(inv.get(1, 1), Some(&-half));
        assert!(RationalMatrix::from_vec(vec![vec![1, 2], vec![2, 4]], 2).inverse().is_none());
    }

    #[test]
    fn test_rank_and_null_space() {
        let m = RationalMatrix::from_vec(vec![vec![1, 0, 0], vec![0, 1, 1]], 3);
        assert_eq!(m.rank(), 2);
        let ns = m.null_space();
        assert_eq!(ns.len(), 1);
        assert_eq!(integer_direction(&ns[0]), Some(vec![0, -1, 1]));
        assert_eq!(RationalMatrix::zeros(0, 2).null_space().len(), 2);
    }

    #[test]
    fn test_scale_to_integers() {
        let v = vec![
            BigRational::new(BigInt::from(1), BigInt::from(2)),
            BigRational::new(BigInt::from(2), BigInt::from(3)),
        ];
        assert_eq!(scale_to_integers(&v), Some((vec![3, 4], 6)));
    }

    #[test]
    fn test_gcd_primitive() {
        assert_eq!(vector_gcd(&[4, -6, 8]), 2);
        assert_eq!(primitive(&[0, 4, -2]), vec![0, 2, -1]);
    }
}
