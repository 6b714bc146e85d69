//! Conductor and line-configuration records (§4.2, §3).
//!
//! These are immutable value objects queried by [`crate::linemat`]; they
//! carry no behavior of their own beyond exposing their physical
//! parameters as typed scalar fields in the units §3 declares.

use gat_core::units::{Feet, OhmsPerMile};
use gat_core::{PhaseSet, PowerflowError, PowerflowResult};

/// An overhead phase or neutral conductor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverheadConductor {
    pub resistance: OhmsPerMile,
    pub geometric_mean_radius: Feet,
    pub diameter_in: f64,
    pub summer_continuous_amps: f64,
    pub summer_emergency_amps: f64,
    pub winter_continuous_amps: f64,
    pub winter_emergency_amps: f64,
}

/// A concentric-neutral or tape-shielded underground conductor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UndergroundConductor {
    pub resistance: OhmsPerMile,
    pub geometric_mean_radius: Feet,
    pub diameter_in: f64,
    pub outer_diameter_in: f64,
    /// `None` for a tape-shielded cable (shield values used instead).
    pub concentric_neutral: Option<ConcentricNeutral>,
    pub shield: Option<TapeShield>,
    pub insulation_relative_permittivity: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConcentricNeutral {
    pub strand_gmr: Feet,
    pub strand_diameter_in: f64,
    pub strand_resistance: OhmsPerMile,
    pub strand_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TapeShield {
    pub gmr: Feet,
    pub resistance: OhmsPerMile,
}

/// A triplex (duplex) secondary conductor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriplexConductor {
    pub resistance: OhmsPerMile,
    pub geometric_mean_radius: Feet,
    pub continuous_amps: f64,
    pub emergency_amps: f64,
}

/// Pairwise distances between {A,B,C,N} conductors and between each
/// conductor and earth (§3). Indexed by phase slot: 0=A, 1=B, 2=C, 3=N.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineSpacing {
    /// `distance[i][j]` for i != j; diagonal unused.
    pub distance_ft: [[f64; 4]; 4],
    /// Height above earth per conductor slot, ft.
    pub height_above_earth_ft: [f64; 4],
}

impl LineSpacing {
    pub fn distance(&self, i: usize, j: usize) -> Feet {
        Feet(self.distance_ft[i][j])
    }

    pub fn height(&self, i: usize) -> Feet {
        Feet(self.height_above_earth_ft[i])
    }

    /// Validate §3's invariants: distance to earth >= 0, pairwise
    /// distances > 0 for phases that exist.
    pub fn validate(&self, present: PhaseSet) -> PowerflowResult<()> {
        for i in 0..4 {
            if self.height_above_earth_ft[i] < 0.0 {
                return Err(PowerflowError::configuration(
                    "line-spacing",
                    format!("height above earth for conductor slot {i} is negative"),
                ));
            }
        }
        let present_slots: Vec<usize> = (0..3).filter(|&i| present.electrical_mask() & (1 << i) != 0).collect();
        for &i in &present_slots {
            for &j in &present_slots {
                if i != j && self.distance_ft[i][j] <= 0.0 {
                    return Err(PowerflowError::configuration(
                        "line-spacing",
                        format!("pairwise distance between phases {i} and {j} must be > 0"),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Either a geometric or an explicit-matrix line configuration, never
/// both (§3 invariant).
#[derive(Debug, Clone)]
pub enum LineConfigurationKind {
    Overhead {
        conductors: [Option<OverheadConductor>; 4],
        spacing: LineSpacing,
    },
    Underground {
        conductors: [Option<UndergroundConductor>; 3],
        spacing: LineSpacing,
    },
    Triplex {
        line1: TriplexConductor,
        line2: TriplexConductor,
        neutral: TriplexConductor,
        /// Cable outside diameter and insulation thickness, inches.
        cable_diameter_in: f64,
        insulation_thickness_in: f64,
    },
    Explicit {
        /// Ω/mile, row-major.
        z_matrix: [[num_complex::Complex64; 3]; 3],
        /// nF/mile, row-major; `None` when no capacitance is modeled.
        c_matrix: Option<[[f64; 3]; 3]>,
    },
}

/// Composition of up to four phase conductors, a spacing, and an
/// optional explicit matrix pair (§3).
#[derive(Debug, Clone)]
pub struct LineConfiguration {
    pub id: String,
    pub kind: LineConfigurationKind,
}

impl LineConfiguration {
    pub fn is_explicit(&self) -> bool {
        matches!(self.kind, LineConfigurationKind::Explicit { .. })
    }
}
