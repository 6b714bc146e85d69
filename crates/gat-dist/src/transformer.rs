//! Transformers and regulators (§4.4).
//!
//! A transformer is a branch whose admittance blocks are derived from a
//! leakage impedance and a turns ratio rather than from the line-matrix
//! builder. Grounded on `transformer.cpp`'s four connection-type switch
//! and `regulator.cpp`'s tap-ratio application to `B`.

use gat_core::linalg::{self, Matrix3};
use gat_core::{Diagnostics, PhaseSet, PowerflowError, PowerflowResult};
use num_complex::Complex64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionType {
    WyeWye,
    DeltaDelta,
    DeltaGroundedWye,
    SplitPhase,
}

/// Output of [`build_transformer`]: the admittance blocks and ABCD-style
/// matrices a branch needs, mirroring [`crate::linemat::LineMatrices`]'s
/// shape so both feed the same branch record.
#[derive(Debug, Clone)]
pub struct TransformerMatrices {
    pub y_from: Matrix3,
    pub y_to: Matrix3,
    pub a: Matrix3,
    pub b: Matrix3,
    pub c: Matrix3,
    pub d: Matrix3,
}

/// `v_ratio = V_primary / V_secondary`; the leakage impedance `z_leakage`
/// is referred to the secondary. `connection` selects the admittance
/// derivation; `tap_ratio` is `None` for a plain transformer and
/// `Some(per_phase taps)` for a regulator, multiplying `B`'s
/// off-diagonal entries (§4.4).
pub fn build_transformer(
    id: &str,
    connection: ConnectionType,
    v_ratio: f64,
    z_leakage: &Matrix3,
    primary_phases: PhaseSet,
    tap_ratio: Option<[f64; 3]>,
    diagnostics: &mut Diagnostics,
) -> PowerflowResult<TransformerMatrices> {
    if v_ratio <= 0.0 {
        return Err(PowerflowError::configuration(id, "transformer v_ratio must be > 0"));
    }

    let present = primary_phases.electrical_mask();
    let Some(y_to) = z_leakage.inverse_masked(present) else {
        diagnostics.record(&PowerflowError::numerical(id, "leakage admittance", "zeroed: singular z_leakage"));
        return Ok(zeroed_result());
    };

    let (y_from, a, b, c, d) = match connection {
        ConnectionType::WyeWye | ConnectionType::DeltaDelta => {
            let y_from = linalg::multiply_scalar_3x3(Complex64::new(1.0 / (v_ratio * v_ratio), 0.0), &y_to);
            let a = scalar_diag(1.0 / v_ratio, present);
            let d = scalar_diag(v_ratio, present);
            let b = linalg::multiply_3x3(&a, z_leakage);
            let c = Matrix3::ZERO;
            (y_from, a, b, c, d)
        }
        ConnectionType::DeltaGroundedWye => {
            let shift = delta_wye_shift_matrix();
            let y_from = linalg::multiply_scalar_3x3(Complex64::new(1.0 / (v_ratio * v_ratio), 0.0), &y_to);
            let a = linalg::multiply_scalar_3x3(Complex64::new(1.0 / v_ratio, 0.0), &shift);
            let d = linalg::multiply_scalar_3x3(Complex64::new(v_ratio, 0.0), &shift);
            let b = linalg::multiply_3x3(&a, z_leakage);
            let c = Matrix3::ZERO;
            (y_from, a, b, c, d)
        }
        ConnectionType::SplitPhase => {
            // A 2x1 secondary: Y_to is dense over {1,2}, Y_from is a
            // scalar on the single primary phase (Q3: first-match among
            // the primary's phase bits).
            let primary_phase = primary_phases
                .iter_electrical()
                .next()
                .ok_or_else(|| PowerflowError::configuration(id, "split-phase transformer has no primary phase set"))?;
            let mut y_from = Matrix3::ZERO;
            let y_pp = y_to.get(0, 0) + y_to.get(0, 1) + y_to.get(1, 0) + y_to.get(1, 1);
            y_from.set(primary_phase, primary_phase, y_pp / Complex64::new(v_ratio * v_ratio, 0.0));
            let mut a = Matrix3::ZERO;
            a.set(0, primary_phase, Complex64::new(1.0 / v_ratio, 0.0));
            a.set(1, primary_phase, Complex64::new(1.0 / v_ratio, 0.0));
            let mut d = Matrix3::ZERO;
            d.set(primary_phase, 0, Complex64::new(v_ratio, 0.0));
            d.set(primary_phase, 1, Complex64::new(v_ratio, 0.0));
            let b = linalg::multiply_3x3(&a, z_leakage);
            let c = Matrix3::ZERO;
            (y_from, a, b, c, d)
        }
    };

    let b = match tap_ratio {
        Some(taps) => apply_tap_ratio(&b, &taps),
        None => b,
    };

    Ok(TransformerMatrices { y_from, y_to, a, b, c, d })
}

fn zeroed_result() -> TransformerMatrices {
    TransformerMatrices {
        y_from: Matrix3::ZERO,
        y_to: Matrix3::ZERO,
        a: Matrix3::ZERO,
        b: Matrix3::ZERO,
        c: Matrix3::ZERO,
        d: Matrix3::ZERO,
    }
}

fn scalar_diag(value: f64, present: u8) -> Matrix3 {
    let mut m = Matrix3::ZERO;
    for i in 0..3 {
        if present & (1 << i) != 0 {
            m.set(i, i, Complex64::new(value, 0.0));
        }
    }
    m
}

/// The Delta-grounded-Wye connection matrix (Kersting 8.27): a -30
/// degree phase shift realized as the standard {1,-1,0;0,1,-1;-1,0,1}
/// pattern scaled by 1/sqrt(3) so its magnitude matches a plain ratio.
fn delta_wye_shift_matrix() -> Matrix3 {
    let s = 1.0 / 3f64.sqrt();
    Matrix3([
        [Complex64::new(s, 0.0), Complex64::new(-s, 0.0), Complex64::new(0.0, 0.0)],
        [Complex64::new(0.0, 0.0), Complex64::new(s, 0.0), Complex64::new(-s, 0.0)],
        [Complex64::new(-s, 0.0), Complex64::new(0.0, 0.0), Complex64::new(s, 0.0)],
    ])
}

/// A regulator's per-phase tap ratio multiplies `B`'s off-diagonal
/// entries (§4.4).
fn apply_tap_ratio(b: &Matrix3, taps: &[f64; 3]) -> Matrix3 {
    let mut out = *b;
    for i in 0..3 {
        for j in 0..3 {
            if i != j {
                out.set(i, j, out.get(i, j) * Complex64::new(taps[i], 0.0));
            }
        }
    }
    out
}
