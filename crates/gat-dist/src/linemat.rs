//! Line-matrix builder (§4.3): turns a [`LineConfiguration`] and a length
//! into the two-port ABCD matrices and the Y_from/Y_to admittance blocks
//! the solvers consume.
//!
//! Grounded on `overhead_line_conductor.cpp`/`underground_line.cpp`/
//! `triplex_line_conductor.cpp` (self/mutual Carson formulas, the
//! concentric-neutral `gmr_cn`/`r_cn` reduction, the triplex spacing
//! derivation) and on Kersting's *Distribution System Modeling and
//! Analysis* sections 6.9-6.28 for the ABCD synthesis, which the
//! original cites directly in its own comments.

use gat_core::units::{Feet, Hertz, OhmMeters};
use gat_core::{linalg, Diagnostics, PhaseSet, PowerflowError, PowerflowResult};
use num_complex::Complex64;

use crate::conductor::{LineConfiguration, LineConfigurationKind};

const EPSILON_0: f64 = 8.854_187_812_8e-12;

/// Frequency-dependent Carson coefficients, constant throughout a solve.
#[derive(Debug, Clone, Copy)]
struct CarsonCoefficients {
    k_r: f64,
    k_x: f64,
    k_0: f64,
}

impl CarsonCoefficients {
    fn new(frequency: Hertz, earth_resistivity: OhmMeters) -> Self {
        let f = frequency.value();
        Self {
            k_r: 1.58836e-3 * f,
            k_x: 2.02237e-3 * f,
            k_0: 0.5 * (earth_resistivity.value() / f).ln() + 7.6786,
        }
    }
}

/// Everything the solvers need out of a line: series impedance/
/// admittance per unit length already scaled by the branch's length,
/// the two-port ABCD set, and the inverted pair A, B.
#[derive(Debug, Clone)]
pub struct LineMatrices {
    pub z_abc: linalg::Matrix3,
    pub y_abc: linalg::Matrix3,
    pub a: linalg::Matrix3,
    pub b: linalg::Matrix3,
    pub c: linalg::Matrix3,
    pub d: linalg::Matrix3,
    pub cap_a: linalg::Matrix3,
    pub cap_b: linalg::Matrix3,
    /// Triplex neutral-current split `[-z_n1/z_nn, -z_n2/z_nn]` from the
    /// Kron reduction against the neutral conductor; `[-0.5, -0.5]` for
    /// any non-triplex configuration.
    pub tn: [Complex64; 2],
}

pub struct LineMatrixBuilder {
    pub frequency: Hertz,
    pub earth_resistivity: OhmMeters,
    pub use_line_capacitance: bool,
}

impl LineMatrixBuilder {
    pub fn build(
        &self,
        id: &str,
        config: &LineConfiguration,
        length: Feet,
        phases: PhaseSet,
        diagnostics: &mut Diagnostics,
    ) -> PowerflowResult<LineMatrices> {
        if length.value() == 0.0 {
            return Err(PowerflowError::configuration(
                id,
                "zero-length line must be handled by the caller before reaching the matrix builder",
            ));
        }
        let miles = length.value() / 5280.0;
        let present = phases.electrical_mask();

        let mut tn = [Complex64::new(-0.5, 0.0); 2];
        let (mut z_abc, mut y_abc) = match &config.kind {
            LineConfigurationKind::Overhead { conductors, spacing } => {
                self.build_overhead(id, conductors, spacing, present, miles, diagnostics)?
            }
            LineConfigurationKind::Underground { conductors, spacing } => {
                self.build_underground(id, conductors, spacing, present, miles, diagnostics)?
            }
            LineConfigurationKind::Triplex {
                line1,
                line2,
                neutral,
                cable_diameter_in,
                insulation_thickness_in,
            } => {
                let (z, y, triplex_tn) = self.build_triplex(line1, line2, neutral, *cable_diameter_in, *insulation_thickness_in, miles);
                tn = triplex_tn;
                (z, y)
            }
            LineConfigurationKind::Explicit { z_matrix, c_matrix } => {
                self.build_explicit(z_matrix, c_matrix.as_ref(), miles)
            }
        };

        sanitize_negative_resistance(id, &mut z_abc, diagnostics);

        if !self.use_line_capacitance && y_abc != linalg::Matrix3::ZERO {
            diagnostics.record(&PowerflowError::numerical(
                id,
                "shunt capacitance",
                "zeroed: use-line-capacitance switch is off",
            ));
            y_abc = linalg::Matrix3::ZERO;
        }

        let (a, b, c, d) = synthesize_abcd(id, &z_abc, &y_abc, present, diagnostics)?;
        let cap_a = a;
        let cap_b = b;

        Ok(LineMatrices {
            z_abc,
            y_abc,
            a,
            b,
            c,
            d,
            cap_a,
            cap_b,
            tn,
        })
    }

    fn build_overhead(
        &self,
        id: &str,
        conductors: &[Option<crate::conductor::OverheadConductor>; 4],
        spacing: &crate::conductor::LineSpacing,
        present: u8,
        miles: f64,
        diagnostics: &mut Diagnostics,
    ) -> PowerflowResult<(linalg::Matrix3, linalg::Matrix3)> {
        let k = CarsonCoefficients::new(self.frequency, self.earth_resistivity);
        let has_neutral = conductors[3].is_some();
        let n = if has_neutral { 4 } else { 3 };

        let mut z = vec![vec![Complex64::new(0.0, 0.0); n]; n];
        for i in 0..n {
            let Some(ci) = conductors[i] else { continue };
            z[i][i] = Complex64::new(
                ci.resistance.value() + k.k_r,
                k.k_x * ((1.0 / ci.geometric_mean_radius.value()).ln() + k.k_0),
            );
            for j in 0..n {
                if i == j {
                    continue;
                }
                if conductors[j].is_none() {
                    continue;
                }
                let d_ij = spacing.distance(i, j).value();
                z[i][j] = Complex64::new(k.k_r, k.k_x * ((1.0 / d_ij).ln() + k.k_0));
            }
        }

        let phase_idx: Vec<usize> = (0..3).filter(|&i| present & (1 << i) != 0).collect();
        let z_abc = if has_neutral {
            kron_reduce(id, &z, &phase_idx, &[3], diagnostics)?
        } else {
            embed_phase_block(&z, &phase_idx)
        };
        let z_abc = scale_matrix3(&z_abc, miles);

        let y_abc = if self.use_line_capacitance {
            self.overhead_capacitance(id, conductors, spacing, &phase_idx, has_neutral, miles, diagnostics)?
        } else {
            linalg::Matrix3::ZERO
        };

        Ok((z_abc, y_abc))
    }

    fn overhead_capacitance(
        &self,
        id: &str,
        conductors: &[Option<crate::conductor::OverheadConductor>; 4],
        spacing: &crate::conductor::LineSpacing,
        phase_idx: &[usize],
        has_neutral: bool,
        miles: f64,
        diagnostics: &mut Diagnostics,
    ) -> PowerflowResult<linalg::Matrix3> {
        let n = if has_neutral { 4 } else { 3 };
        let mut p = vec![vec![Complex64::new(0.0, 0.0); n]; n];
        for i in 0..n {
            let Some(ci) = conductors[i] else { continue };
            let h_i = spacing.height(i).value();
            let d_ii_prime = 2.0 * h_i;
            let radius_ft = ci.diameter_in / 24.0;
            if d_ii_prime <= 0.0 || radius_ft <= 0.0 {
                diagnostics.record(&PowerflowError::numerical(
                    id,
                    "shunt capacitance",
                    "zeroed: image distance was zero",
                ));
                return Ok(linalg::Matrix3::ZERO);
            }
            p[i][i] = Complex64::new((1.0 / (2.0 * std::f64::consts::PI * EPSILON_0)) * (d_ii_prime / radius_ft).ln(), 0.0);
            for j in 0..n {
                if i == j || conductors[j].is_none() {
                    continue;
                }
                let h_j = spacing.height(j).value();
                let d_ij = spacing.distance(i, j).value();
                let d_ij_prime = (d_ij * d_ij + 4.0 * h_i * h_j).sqrt();
                p[i][j] = Complex64::new((1.0 / (2.0 * std::f64::consts::PI * EPSILON_0)) * (d_ij_prime / d_ij).ln(), 0.0);
            }
        }

        let p_abc = if has_neutral {
            kron_reduce(id, &p, phase_idx, &[3], diagnostics)?
        } else {
            embed_phase_block(&p, phase_idx)
        };

        let present_mask: u8 = phase_idx.iter().map(|&i| 1 << i).fold(0, |a, b| a | b);
        let Some(inv_p) = p_abc.inverse_masked(present_mask) else {
            diagnostics.record(&PowerflowError::numerical(id, "shunt capacitance", "zeroed: singular potential matrix"));
            return Ok(linalg::Matrix3::ZERO);
        };
        let scale = Complex64::new(0.0, 2.0 * std::f64::consts::PI * self.frequency.value() * 1e-6 * miles);
        Ok(linalg::multiply_scalar_3x3(scale, &inv_p))
    }

    fn build_underground(
        &self,
        id: &str,
        conductors: &[Option<crate::conductor::UndergroundConductor>; 3],
        spacing: &crate::conductor::LineSpacing,
        present: u8,
        miles: f64,
        diagnostics: &mut Diagnostics,
    ) -> PowerflowResult<(linalg::Matrix3, linalg::Matrix3)> {
        let k = CarsonCoefficients::new(self.frequency, self.earth_resistivity);

        // Conductor slots 0..3 phase, 3..6 per-phase concentric-neutral/shield.
        let mut gmr = [0.0f64; 6];
        let mut res = [0.0f64; 6];
        let mut ring_radius = [0.0f64; 3];
        let mut is_concentric = [false; 3];

        for i in 0..3 {
            let Some(cond) = conductors[i] else { continue };
            gmr[i] = cond.geometric_mean_radius.value();
            res[i] = cond.resistance.value();
            if let Some(cn) = cond.concentric_neutral {
                let kf = cn.strand_count as f64;
                ring_radius[i] = (cond.outer_diameter_in - cn.strand_diameter_in) / 24.0;
                gmr[3 + i] = (cn.strand_gmr.value() * kf * ring_radius[i].powf(kf - 1.0)).powf(1.0 / kf);
                res[3 + i] = cn.strand_resistance.value() / kf;
                is_concentric[i] = true;
            } else if let Some(ts) = cond.shield {
                gmr[3 + i] = ts.gmr.value();
                res[3 + i] = ts.resistance.value();
            }
        }

        let n = 6;
        let mut z = vec![vec![Complex64::new(0.0, 0.0); n]; n];
        for i in 0..n {
            if gmr[i] == 0.0 {
                continue;
            }
            z[i][i] = Complex64::new(res[i] + k.k_r, k.k_x * ((1.0 / gmr[i]).ln() + k.k_0));
        }
        for i in 0..3 {
            for j in 0..3 {
                if i == j || conductors[i].is_none() || conductors[j].is_none() {
                    continue;
                }
                let d_ij = spacing.distance(i, j).value();
                z[i][j] = Complex64::new(k.k_r, k.k_x * ((1.0 / d_ij).ln() + k.k_0));
                // Co-located neutral<->phase pairs collapse to the ring radius
                // for the self pair, and to the phase-phase spacing otherwise
                // (§4.3); cross neutral-to-neutral spacing mirrors phase-phase.
                z[3 + i][3 + j] = z[i][j];
            }
        }
        for i in 0..3 {
            if conductors[i].is_none() {
                continue;
            }
            let d_self = if is_concentric[i] { ring_radius[i] } else { gmr[3 + i] };
            if d_self > 0.0 {
                z[i][3 + i] = Complex64::new(k.k_r, k.k_x * ((1.0 / d_self).ln() + k.k_0));
                z[3 + i][i] = z[i][3 + i];
            }
            for j in 0..3 {
                if i == j || conductors[j].is_none() {
                    continue;
                }
                let d_ij = spacing.distance(i, j).value();
                z[i][3 + j] = Complex64::new(k.k_r, k.k_x * ((1.0 / d_ij).ln() + k.k_0));
                z[3 + j][i] = z[i][3 + j];
            }
        }

        let phase_idx: Vec<usize> = (0..3).filter(|&i| present & (1 << i) != 0).collect();
        let neutral_idx: Vec<usize> = (3..6).filter(|&i| conductors[i - 3].is_some()).collect();
        let z_abc = if neutral_idx.is_empty() {
            embed_phase_block(&z, &phase_idx)
        } else {
            kron_reduce(id, &z, &phase_idx, &neutral_idx, diagnostics)?
        };
        let z_abc = scale_matrix3(&z_abc, miles);

        let mut y_abc = linalg::Matrix3::ZERO;
        if self.use_line_capacitance {
            for i in 0..3 {
                let Some(cond) = conductors[i] else { continue };
                let Some(cn) = cond.concentric_neutral else { continue };
                let dia = cond.diameter_in;
                let r = ring_radius[i];
                let k_strands = cn.strand_count as f64;
                let d_s = cn.strand_diameter_in;
                if dia == 0.0 || r == 0.0 || cn.strand_count == 0 {
                    diagnostics.record(&PowerflowError::numerical(
                        id,
                        "shunt capacitance",
                        "zeroed: conductor/ring/strand-count was zero",
                    ));
                    continue;
                }
                let denom = (r / (dia / 24.0)).ln() - (1.0 / k_strands) * (k_strands * d_s / 24.0 / r).ln();
                if denom == 0.0 {
                    diagnostics.record(&PowerflowError::numerical(
                        id,
                        "shunt capacitance",
                        "zeroed: zero-value denominator in Kersting's formula",
                    ));
                    continue;
                }
                let c_i = 2.0 * std::f64::consts::PI * EPSILON_0 * cond.insulation_relative_permittivity / denom;
                let scale = 2.0 * std::f64::consts::PI * self.frequency.value() * 1e-6 * miles;
                y_abc.set(i, i, Complex64::new(0.0, c_i * scale));
            }
        }

        Ok((z_abc, y_abc))
    }

    fn build_triplex(
        &self,
        line1: &crate::conductor::TriplexConductor,
        line2: &crate::conductor::TriplexConductor,
        neutral: &crate::conductor::TriplexConductor,
        cable_diameter_in: f64,
        insulation_thickness_in: f64,
        miles: f64,
    ) -> (linalg::Matrix3, linalg::Matrix3, [Complex64; 2]) {
        let k = CarsonCoefficients::new(self.frequency, self.earth_resistivity);
        let d = cable_diameter_in;
        let t = insulation_thickness_in;
        let d_12 = (d + 2.0 * t) / 12.0;
        let d_13 = (d + t) / 12.0;
        let d_23 = d_13;

        let conds = [*line1, *line2, *neutral];
        let dist = [[0.0, d_12, d_13], [d_12, 0.0, d_23], [d_13, d_23, 0.0]];
        let mut z = [[Complex64::new(0.0, 0.0); 3]; 3];
        for i in 0..3 {
            z[i][i] = Complex64::new(
                conds[i].resistance.value() + k.k_r,
                k.k_x * ((1.0 / conds[i].geometric_mean_radius.value()).ln() + k.k_0),
            );
            for j in 0..3 {
                if i != j {
                    z[i][j] = Complex64::new(k.k_r, k.k_x * ((1.0 / dist[i][j]).ln() + k.k_0));
                }
            }
        }

        // Kron-reduce against the neutral (index 2), keeping only {line1, line2}.
        let z_nn = z[2][2];
        let mut z_abc = linalg::Matrix3::ZERO;
        for i in 0..2 {
            for j in 0..2 {
                let reduced = z[i][j] - z[i][2] * z[j][2] / z_nn;
                z_abc.set(i, j, reduced);
            }
        }
        let z_abc = scale_matrix3(&z_abc, miles);
        let tn = [-z[0][2] / z_nn, -z[1][2] / z_nn];
        // Triplex lines model no shunt capacitance in this core.
        (z_abc, linalg::Matrix3::ZERO, tn)
    }

    fn build_explicit(
        &self,
        z_matrix: &[[Complex64; 3]; 3],
        c_matrix: Option<&[[f64; 3]; 3]>,
        miles: f64,
    ) -> (linalg::Matrix3, linalg::Matrix3) {
        let mut z_abc = linalg::Matrix3::ZERO;
        for i in 0..3 {
            for j in 0..3 {
                z_abc.set(i, j, z_matrix[i][j] * miles);
            }
        }
        let mut y_abc = linalg::Matrix3::ZERO;
        if let Some(c) = c_matrix {
            let scale = Complex64::new(0.0, 2.0 * std::f64::consts::PI * self.frequency.value() * 1e-9 * miles);
            for i in 0..3 {
                for j in 0..3 {
                    y_abc.set(i, j, scale * c[i][j]);
                }
            }
        }
        (z_abc, y_abc)
    }
}

/// Two-port ABCD synthesis (Kersting 6.9-6.28): `a = I + Z*Y/2`, `d = a`,
/// `c = Y + Z*Y*Y/4`, `A = a^-1` on the present-phase sub-block, `B = A*Z`.
fn synthesize_abcd(
    id: &str,
    z: &linalg::Matrix3,
    y: &linalg::Matrix3,
    present: u8,
    diagnostics: &mut Diagnostics,
) -> PowerflowResult<(linalg::Matrix3, linalg::Matrix3, linalg::Matrix3, linalg::Matrix3)> {
    let half = Complex64::new(0.5, 0.0);
    let quarter = Complex64::new(0.25, 0.0);
    let identity = linalg::Matrix3::identity();

    let zy = linalg::multiply_3x3(z, y);
    let a = linalg::add_3x3(&identity, &linalg::multiply_scalar_3x3(half, &zy));
    let d = a;

    let zyy = linalg::multiply_3x3(&zy, y);
    let c = linalg::add_3x3(y, &linalg::multiply_scalar_3x3(quarter, &zyy));

    let Some(a_inv) = a.inverse_masked(present) else {
        diagnostics.record(&PowerflowError::numerical(id, "ABCD synthesis", "zeroed: singular 'a' matrix"));
        return Ok((a, linalg::Matrix3::ZERO, c, d));
    };
    let b = linalg::multiply_3x3(&a_inv, z);
    Ok((a_inv, b, c, d))
}

fn sanitize_negative_resistance(id: &str, z: &mut linalg::Matrix3, diagnostics: &mut Diagnostics) {
    for i in 0..3 {
        if z.get(i, i).re < 0.0 {
            diagnostics.record(&PowerflowError::hardware(
                id,
                format!("negative resistance in z_abc[{i}][{i}]"),
            ));
        }
    }
}

fn scale_matrix3(m: &linalg::Matrix3, scale: f64) -> linalg::Matrix3 {
    linalg::multiply_scalar_3x3(Complex64::new(scale, 0.0), m)
}

/// Embed an n x n matrix's phase sub-block directly into a 3x3, used
/// when there is no neutral row to Kron-reduce against.
fn embed_phase_block(full: &[Vec<Complex64>], phase_idx: &[usize]) -> linalg::Matrix3 {
    let mut out = linalg::Matrix3::ZERO;
    for &i in phase_idx {
        for &j in phase_idx {
            out.set(i, j, full[i][j]);
        }
    }
    out
}

/// Kron reduction (§3 glossary): eliminate `neutral_idx` rows/cols from
/// `full`, scattering the result back into a 3x3 at `phase_idx` slots.
/// `z_abc[i][j] = z_ij - z_iN . z_NN^-1 . z_Nj` generalized to a block of
/// neutral rows via Gauss-Jordan inversion of the neutral sub-block.
fn kron_reduce(
    id: &str,
    full: &[Vec<Complex64>],
    phase_idx: &[usize],
    neutral_idx: &[usize],
    diagnostics: &mut Diagnostics,
) -> PowerflowResult<linalg::Matrix3> {
    let m = neutral_idx.len();
    let mut z_nn = vec![vec![Complex64::new(0.0, 0.0); m]; m];
    for (a, &i) in neutral_idx.iter().enumerate() {
        for (b, &j) in neutral_idx.iter().enumerate() {
            z_nn[a][b] = full[i][j];
        }
        if z_nn[a][a] == Complex64::new(0.0, 0.0) {
            // an absent neutral strand contributes an inert unit pivot
            // rather than making the whole block singular.
            z_nn[a][a] = Complex64::new(1.0, 0.0);
        }
    }
    let Some(z_nn_inv) = complex_gauss_jordan_inverse(&z_nn) else {
        diagnostics.record(&PowerflowError::numerical(
            id,
            "kron reduction",
            "zeroed: zero pivot in neutral sub-block",
        ));
        return Ok(linalg::Matrix3::ZERO);
    };

    let mut out = linalg::Matrix3::ZERO;
    for &i in phase_idx {
        for &j in phase_idx {
            let mut correction = Complex64::new(0.0, 0.0);
            for (a, &na) in neutral_idx.iter().enumerate() {
                for (b, &nb) in neutral_idx.iter().enumerate() {
                    correction += full[i][na] * z_nn_inv[a][b] * full[nb][j];
                }
            }
            out.set(i, j, full[i][j] - correction);
        }
    }
    Ok(out)
}

/// General n x n complex Gauss-Jordan inverse for the small (<=4) neutral
/// sub-blocks `kron_reduce` needs to invert.
fn complex_gauss_jordan_inverse(a: &[Vec<Complex64>]) -> Option<Vec<Vec<Complex64>>> {
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
        let pivot_row = (col..n).max_by(|&r1, &r2| aug[r1][col].norm().partial_cmp(&aug[r2][col].norm()).unwrap())?;
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
