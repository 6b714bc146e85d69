//! Reliability JSON export (§6): SAIFI/SAIDI/CAIDI/ASAI/MAIFI plus
//! protective-device and other-device state, keyed the way the external
//! `power_metrics` adapter and GridLAB-D's own dump expect.

use serde::Serialize;
use std::collections::HashMap;

use crate::topology::{BranchKind, BranchStatus, PowerflowGraph};

/// The five system-average reliability indices (§6).
#[derive(Debug, Clone, Copy, Serialize, Default)]
pub struct ReliabilityIndices {
    #[serde(rename = "SAIFI")]
    pub saifi: f64,
    #[serde(rename = "SAIDI")]
    pub saidi: f64,
    #[serde(rename = "CAIDI")]
    pub caidi: f64,
    #[serde(rename = "ASAI")]
    pub asai: f64,
    #[serde(rename = "MAIFI")]
    pub maifi: f64,
}

impl ReliabilityIndices {
    /// Derive CAIDI/ASAI from accumulated customer-interruption counts,
    /// matching the standard IEEE 1366 definitions the `power_metrics`
    /// adapter computes from.
    pub fn from_totals(customers_served: f64, customer_interruptions: f64, customer_minutes_interrupted: f64, momentary_events: f64, minutes_in_period: f64) -> Self {
        let saifi = if customers_served > 0.0 { customer_interruptions / customers_served } else { 0.0 };
        let saidi = if customers_served > 0.0 { customer_minutes_interrupted / customers_served } else { 0.0 };
        let caidi = if saifi > 0.0 { saidi / saifi } else { 0.0 };
        let asai = if customers_served > 0.0 && minutes_in_period > 0.0 {
            1.0 - saidi / minutes_in_period
        } else {
            1.0
        };
        let maifi = if customers_served > 0.0 { momentary_events / customers_served } else { 0.0 };
        Self { saifi, saidi, caidi, asai, maifi }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProtectiveDeviceStatus {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Device opening status")]
    pub opening_status: [String; 3],
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct ProtectiveDevices {
    #[serde(rename = "Fuse")]
    pub fuse: Vec<ProtectiveDeviceStatus>,
    #[serde(rename = "Recloser")]
    pub recloser: Vec<ProtectiveDeviceStatus>,
    #[serde(rename = "Sectionalizer")]
    pub sectionalizer: Vec<ProtectiveDeviceStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CapacitorStatus {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Switch state")]
    pub switch_state: [String; 3],
}

#[derive(Debug, Clone, Serialize)]
pub struct RegulatorStatus {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Tap position")]
    pub tap_position: [i32; 3],
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct OtherDevices {
    #[serde(rename = "Capacitor")]
    pub capacitor: Vec<CapacitorStatus>,
    #[serde(rename = "Regulator")]
    pub regulator: Vec<RegulatorStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReliabilityDump {
    #[serde(rename = "GridLAB-D reliability outputs")]
    pub indices: ReliabilityIndices,
    #[serde(rename = "Protective devices")]
    pub protective_devices: ProtectiveDevices,
    #[serde(rename = "Other devices")]
    pub other_devices: OtherDevices,
}

fn phase_status_strings(branch_phases_present: u8, removed: u8) -> [String; 3] {
    std::array::from_fn(|i| {
        let bit = 1u8 << i;
        if branch_phases_present & bit == 0 {
            "-".to_string()
        } else if removed & bit != 0 {
            "1".to_string()
        } else {
            "0".to_string()
        }
    })
}

/// Tap positions per phase for a regulator branch, derived from its
/// `v_ratio` (a single scalar in this core; the same tap is reported for
/// every present phase since per-phase tap tracking isn't modeled).
fn tap_positions(v_ratio: f64, phases_present: u8) -> [i32; 3] {
    let step = ((v_ratio - 1.0) / 0.00625).round() as i32;
    std::array::from_fn(|i| if phases_present & (1 << i) != 0 { step } else { 0 })
}

/// Build the protective/other-device sections from the current graph
/// state. The `indices` argument is supplied by the caller's Monte-Carlo
/// fault-trial accumulation (§4.8), since this module has no opinion on
/// how trials are scheduled.
pub fn dump_reliability(graph: &PowerflowGraph, indices: ReliabilityIndices, regulator_ratios: &HashMap<String, f64>) -> ReliabilityDump {
    let mut protective_devices = ProtectiveDevices::default();
    let mut other_devices = OtherDevices::default();

    for branch in &graph.branches {
        let present = branch.orig_phases.electrical_mask();
        let removed = branch.fault_phases.electrical_mask();
        let status = ProtectiveDeviceStatus {
            name: branch.id.clone(),
            opening_status: phase_status_strings(present, removed),
        };
        match branch.kind {
            BranchKind::Fuse => protective_devices.fuse.push(status),
            BranchKind::Recloser => protective_devices.recloser.push(status),
            BranchKind::Sectionalizer => protective_devices.sectionalizer.push(status),
            BranchKind::Regulator => {
                let ratio = regulator_ratios.get(&branch.id).copied().unwrap_or(branch.v_ratio);
                other_devices.regulator.push(RegulatorStatus {
                    name: branch.id.clone(),
                    tap_position: tap_positions(ratio, present),
                });
            }
            _ => {}
        }
    }

    ReliabilityDump { indices, protective_devices, other_devices }
}

/// A switch's closed/open state reported the way a capacitor bank's
/// per-phase switch state is (§6 "Other devices"). Capacitors aren't
/// modeled as their own branch kind in this core (§9's non-goal); this is
/// left for a caller that tracks capacitor banks separately to populate.
pub fn switch_statuses(graph: &PowerflowGraph) -> Vec<CapacitorStatus> {
    graph
        .branches
        .iter()
        .filter(|b| b.kind == BranchKind::Switch)
        .map(|b| CapacitorStatus {
            name: b.id.clone(),
            switch_state: std::array::from_fn(|i| {
                let bit = 1u8 << i;
                if b.orig_phases.electrical_mask() & bit == 0 {
                    "-".to_string()
                } else if b.status == BranchStatus::Open {
                    "0".to_string()
                } else {
                    "1".to_string()
                }
            }),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saifi_from_totals() {
        let idx = ReliabilityIndices::from_totals(1000.0, 250.0, 15000.0, 500.0, 525_600.0);
        assert!((idx.saifi - 0.25).abs() < 1e-9);
        assert!((idx.saidi - 15.0).abs() < 1e-9);
        assert!((idx.caidi - 60.0).abs() < 1e-9);
        assert!(idx.asai < 1.0 && idx.asai > 0.99);
    }

    #[test]
    fn zero_customers_served_is_safe() {
        let idx = ReliabilityIndices::from_totals(0.0, 0.0, 0.0, 0.0, 525_600.0);
        assert_eq!(idx.saifi, 0.0);
        assert_eq!(idx.asai, 1.0);
    }
}
