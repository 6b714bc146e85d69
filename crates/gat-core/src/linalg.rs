//! Complex linear-algebra primitives on heap-free fixed-size matrices
//! (§4.1). Every routine here is pure and deterministic.
//!
//! [`Matrix3`] is the 3x3 complex matrix used throughout the line-matrix
//! builder and solvers for phase-domain quantities (Z_abc, Y_abc, ABCD).
//! [`Matrix7`] is the 7x7 real-valued boundary-condition matrix the fault
//! module factors with [`lu_decompose_7x7`]: three phase currents, three
//! phase-to-ground voltages, and one ground voltage.

use num_complex::Complex64;

/// A dense 3x3 complex matrix, row-major.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix3(pub [[Complex64; 3]; 3]);

impl Matrix3 {
    pub const ZERO: Matrix3 = Matrix3([[Complex64::new(0.0, 0.0); 3]; 3]);

    pub fn identity() -> Self {
        let mut m = Self::ZERO;
        for i in 0..3 {
            m.0[i][i] = Complex64::new(1.0, 0.0);
        }
        m
    }

    pub fn get(&self, i: usize, j: usize) -> Complex64 {
        self.0[i][j]
    }

    pub fn set(&mut self, i: usize, j: usize, v: Complex64) {
        self.0[i][j] = v;
    }

    /// Determinant via cofactor expansion along the first row.
    pub fn determinant(&self) -> Complex64 {
        let m = &self.0;
        m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
            - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
            + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
    }

    /// `inverse_3x3(A) -> B` such that `A*B = I`, computed by cofactor
    /// expansion using the scalar determinant. The caller guarantees
    /// `|det| > 0` for the phases-present sub-block (§4.3); returns
    /// `None` on an exactly-zero determinant so callers can report a
    /// `NumericalError` rather than divide by zero.
    pub fn inverse(&self) -> Option<Matrix3> {
        let det = self.determinant();
        if det.norm() == 0.0 {
            return None;
        }
        let m = &self.0;
        // minor(i, j): determinant of the 2x2 submatrix with row i and
        // column j removed.
        let minor = |i: usize, j: usize| -> Complex64 {
            let rows: Vec<usize> = (0..3).filter(|&r| r != i).collect();
            let cols: Vec<usize> = (0..3).filter(|&c| c != j).collect();
            m[rows[0]][cols[0]] * m[rows[1]][cols[1]] - m[rows[0]][cols[1]] * m[rows[1]][cols[0]]
        };
        // inverse[i][j] = cofactor(j, i) / det = (-1)^(i+j) * minor(j, i) / det
        let mut out = Matrix3::ZERO;
        for i in 0..3 {
            for j in 0..3 {
                let sign = if (i + j) % 2 == 0 { 1.0 } else { -1.0 };
                out.0[i][j] = sign * minor(j, i) / det;
            }
        }
        Some(out)
    }

    /// Invert only the sub-block of present phases (§4.3 "single-phase
    /// and two-phase lines invert only the relevant sub-block; unused
    /// rows/cols ... are zero"). `present` is a bitmask with bit i set
    /// when phase i (A=0,B=1,C=2) is present on this branch.
    pub fn inverse_masked(&self, present: u8) -> Option<Matrix3> {
        let idx: Vec<usize> = (0..3).filter(|i| present & (1 << i) != 0).collect();
        match idx.len() {
            0 => Some(Matrix3::ZERO),
            3 => self.inverse(),
            n => {
                // Extract the n x n sub-block, invert with a general
                // Gauss-Jordan elimination, then scatter back.
                let mut sub = vec![vec![Complex64::new(0.0, 0.0); n]; n];
                for (a, &i) in idx.iter().enumerate() {
                    for (b, &j) in idx.iter().enumerate() {
                        sub[a][b] = self.0[i][j];
                    }
                }
                let inv_sub = gauss_jordan_inverse(&sub)?;
                let mut out = Matrix3::ZERO;
                for (a, &i) in idx.iter().enumerate() {
                    for (b, &j) in idx.iter().enumerate() {
                        out.0[i][j] = inv_sub[a][b];
                    }
                }
                Some(out)
            }
        }
    }
}

/// General n x n complex Gauss-Jordan inverse, used only for the 1x1/2x2
/// masked sub-blocks that come out of [`Matrix3::inverse_masked`].
fn gauss_jordan_inverse(a: &[Vec<Complex64>]) -> Option<Vec<Vec<Complex64>>> {
    let n = a.len();
    let mut aug: Vec<Vec<Complex64>> = (0..n)
        .map(|i| {
            let mut row = a[i].clone();
            for j in 0..n {
                row.push(if i == j { Complex64::new(1.0, 0.0) } else { Complex64::new(0.0, 0.0) });
            }
            row
        })
        .collect();

    for col in 0..n {
        let pivot_row = (col..n).max_by(|&r1, &r2| {
            aug[r1][col].norm().partial_cmp(&aug[r2][col].norm()).unwrap()
        })?;
        if aug[pivot_row][col].norm() == 0.0 {
            return None;
        }
        aug.swap(col, pivot_row);
        let pivot = aug[col][col];
        for v in aug[col].iter_mut() {
            *v /= pivot;
        }
        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = aug[row][col];
            if factor.norm() == 0.0 {
                continue;
            }
            for k in 0..2 * n {
                aug[row][k] -= factor * aug[col][k];
            }
        }
    }

    Some(aug.iter().map(|row| row[n..].to_vec()).collect())
}

pub fn multiply_3x3(a: &Matrix3, b: &Matrix3) -> Matrix3 {
    let mut out = Matrix3::ZERO;
    for i in 0..3 {
        for j in 0..3 {
            let mut acc = Complex64::new(0.0, 0.0);
            for k in 0..3 {
                acc += a.0[i][k] * b.0[k][j];
            }
            out.0[i][j] = acc;
        }
    }
    out
}

pub fn multiply_scalar_3x3(s: Complex64, a: &Matrix3) -> Matrix3 {
    let mut out = Matrix3::ZERO;
    for i in 0..3 {
        for j in 0..3 {
            out.0[i][j] = s * a.0[i][j];
        }
    }
    out
}

pub fn add_3x3(a: &Matrix3, b: &Matrix3) -> Matrix3 {
    let mut out = Matrix3::ZERO;
    for i in 0..3 {
        for j in 0..3 {
            out.0[i][j] = a.0[i][j] + b.0[i][j];
        }
    }
    out
}

pub fn subtract_3x3(a: &Matrix3, b: &Matrix3) -> Matrix3 {
    let mut out = Matrix3::ZERO;
    for i in 0..3 {
        for j in 0..3 {
            out.0[i][j] = a.0[i][j] - b.0[i][j];
        }
    }
    out
}

/// Multiply a 3x3 matrix by a per-phase current/voltage vector.
pub fn multiply_3x1(a: &Matrix3, v: &[Complex64; 3]) -> [Complex64; 3] {
    let mut out = [Complex64::new(0.0, 0.0); 3];
    for i in 0..3 {
        let mut acc = Complex64::new(0.0, 0.0);
        for j in 0..3 {
            acc += a.0[i][j] * v[j];
        }
        out[i] = acc;
    }
    out
}

/// A dense 7x7 real matrix, row-major, used for the fault
/// boundary-condition system (§4.8): three nodal-admittance rows plus
/// four fault-type-specific constraint rows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix7(pub [[f64; 7]; 7]);

/// Error from a singular 7x7 factorization (zero pivot, no pivoting).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SingularMatrix;

/// `lu_decompose_7x7(A) -> (L, U)` with unit-diagonal `L` and
/// upper-triangular `U`, no pivoting (§4.1). Fails with
/// [`SingularMatrix`] if any pivot is exactly zero, matching the
/// reference's no-pivoting boundary-condition solve.
pub fn lu_decompose_7x7(a: &Matrix7) -> Result<(Matrix7, Matrix7), SingularMatrix> {
    let mut l = [[0.0f64; 7]; 7];
    let mut u = [[0.0f64; 7]; 7];
    for i in 0..7 {
        l[i][i] = 1.0;
    }
    for j in 0..7 {
        for i in 0..=j {
            let mut sum = 0.0;
            for k in 0..i {
                sum += l[i][k] * u[k][j];
            }
            u[i][j] = a.0[i][j] - sum;
        }
        for i in (j + 1)..7 {
            let mut sum = 0.0;
            for k in 0..j {
                sum += l[i][k] * u[k][j];
            }
            if u[j][j] == 0.0 {
                return Err(SingularMatrix);
            }
            l[i][j] = (a.0[i][j] - sum) / u[j][j];
        }
    }
    if (0..7).any(|i| u[i][i] == 0.0) {
        return Err(SingularMatrix);
    }
    Ok((Matrix7(l), Matrix7(u)))
}

/// Forward substitution `L*z = b` for unit-lower-triangular `L`.
pub fn forward_sub_7(l: &Matrix7, b: &[f64; 7]) -> [f64; 7] {
    let mut z = [0.0; 7];
    for i in 0..7 {
        let mut sum = b[i];
        for k in 0..i {
            sum -= l.0[i][k] * z[k];
        }
        z[i] = sum / l.0[i][i];
    }
    z
}

/// Back substitution `U*x = z` for upper-triangular `U`.
pub fn back_sub_7(u: &Matrix7, z: &[f64; 7]) -> [f64; 7] {
    let mut x = [0.0; 7];
    for i in (0..7).rev() {
        let mut sum = z[i];
        for k in (i + 1)..7 {
            sum -= u.0[i][k] * x[k];
        }
        x[i] = sum / u.0[i][i];
    }
    x
}

/// Solve `A*x = b` for the 7x7 real system via LU decomposition and the
/// two substitution passes.
pub fn solve_7x7(a: &Matrix7, b: &[f64; 7]) -> Result<[f64; 7], SingularMatrix> {
    let (l, u) = lu_decompose_7x7(a)?;
    let z = forward_sub_7(&l, b);
    Ok(back_sub_7(&u, &z))
}

/// `SetPolar(magnitude, angle_rad)` complex constructor (§4.1).
pub fn set_polar(magnitude: f64, angle_rad: f64) -> Complex64 {
    Complex64::from_polar(magnitude, angle_rad)
}

/// A dense 7x7 complex matrix, row-major. The fault boundary-condition
/// system (§4.8) is phasor-valued — three phase currents, three
/// phase-to-ground voltages, one ground voltage — so it needs this
/// complex counterpart of [`Matrix7`]'s no-pivoting LU.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix7C(pub [[Complex64; 7]; 7]);

impl Matrix7C {
    pub const ZERO: Matrix7C = Matrix7C([[Complex64::new(0.0, 0.0); 7]; 7]);
}

/// Complex counterpart of [`lu_decompose_7x7`], no pivoting.
pub fn lu_decompose_7x7_complex(a: &Matrix7C) -> Result<(Matrix7C, Matrix7C), SingularMatrix> {
    let mut l = Matrix7C::ZERO;
    let mut u = Matrix7C::ZERO;
    for i in 0..7 {
        l.0[i][i] = Complex64::new(1.0, 0.0);
    }
    for j in 0..7 {
        for i in 0..=j {
            let mut sum = Complex64::new(0.0, 0.0);
            for k in 0..i {
                sum += l.0[i][k] * u.0[k][j];
            }
            u.0[i][j] = a.0[i][j] - sum;
        }
        for i in (j + 1)..7 {
            let mut sum = Complex64::new(0.0, 0.0);
            for k in 0..j {
                sum += l.0[i][k] * u.0[k][j];
            }
            if u.0[j][j].norm() == 0.0 {
                return Err(SingularMatrix);
            }
            l.0[i][j] = (a.0[i][j] - sum) / u.0[j][j];
        }
    }
    if (0..7).any(|i| u.0[i][i].norm() == 0.0) {
        return Err(SingularMatrix);
    }
    Ok((l, u))
}

pub fn forward_sub_7_complex(l: &Matrix7C, b: &[Complex64; 7]) -> [Complex64; 7] {
    let mut z = [Complex64::new(0.0, 0.0); 7];
    for i in 0..7 {
        let mut sum = b[i];
        for k in 0..i {
            sum -= l.0[i][k] * z[k];
        }
        z[i] = sum / l.0[i][i];
    }
    z
}

pub fn back_sub_7_complex(u: &Matrix7C, z: &[Complex64; 7]) -> [Complex64; 7] {
    let mut x = [Complex64::new(0.0, 0.0); 7];
    for i in (0..7).rev() {
        let mut sum = z[i];
        for k in (i + 1)..7 {
            sum -= u.0[i][k] * x[k];
        }
        x[i] = sum / u.0[i][i];
    }
    x
}

/// Solve the complex `A*x = b` 7x7 boundary-condition system (§4.8).
pub fn solve_7x7_complex(a: &Matrix7C, b: &[Complex64; 7]) -> Result<[Complex64; 7], SingularMatrix> {
    let (l, u) = lu_decompose_7x7_complex(a)?;
    let z = forward_sub_7_complex(&l, b);
    Ok(back_sub_7_complex(&u, &z))
}
