//! Sparse three-phase Y-bus assembly and its swing/non-swing reduction.
//!
//! Each bus contributes up to 3 degrees of freedom (one per present
//! electrical phase); a bus's `is_swing` flag removes all of its phases
//! from the unknown set. The reduced system is
//!
//! ```text
//! Y_nn * V_n + Y_ns * V_s = I_n(V_n)
//! ```
//!
//! where `Y_nn`/`Y_ns` are rebuilt whenever the topology or fault masks
//! change (`NR_admit_change`, §4.7) and reused otherwise.

use crate::types::{NrBranch, NrBus};
use gat_core::PhaseSet;
use num_complex::Complex64;
use sprs::{CsMat, TriMat};
use std::collections::HashMap;

/// Maps a (bus index, phase 0..3) pair to its row/column in the reduced
/// non-swing system, or `None` if that dof is a swing bus phase.
#[derive(Debug, Clone)]
pub struct DofMap {
    /// `dof[(bus_index, phase)] = Some(row)` for non-swing active phases.
    map: HashMap<(usize, usize), usize>,
    pub ndof: usize,
}

impl DofMap {
    pub fn build(buses: &[NrBus]) -> Self {
        let mut map = HashMap::new();
        let mut next = 0usize;
        for bus in buses {
            if bus.is_swing {
                continue;
            }
            for phase in bus.phases.iter_electrical() {
                map.insert((bus.index, phase), next);
                next += 1;
            }
        }
        Self { map, ndof: next }
    }

    pub fn get(&self, bus_index: usize, phase: usize) -> Option<usize> {
        self.map.get(&(bus_index, phase)).copied()
    }
}

/// The assembled, reduced admittance system.
pub struct YBus {
    pub dofs: DofMap,
    /// `ndof x ndof` complex admittance among non-swing dofs.
    pub y_nn: CsMat<Complex64>,
    /// Contribution of swing-bus voltages into each non-swing dof's KCL
    /// row: `row -> sum_phase Y * V_swing`.
    pub swing_injection: Vec<Complex64>,
}

impl YBus {
    pub fn build(buses: &[NrBus], branches: &[NrBranch]) -> Self {
        let dofs = DofMap::build(buses);
        let n = dofs.ndof;
        let mut tri = TriMat::new((n, n));
        let mut swing_injection = vec![Complex64::new(0.0, 0.0); n];

        let bus_by_index: HashMap<usize, &NrBus> = buses.iter().map(|b| (b.index, b)).collect();

        for bus in buses {
            for phase in bus.phases.iter_electrical() {
                if let Some(row) = dofs.get(bus.index, phase) {
                    let y = bus.y_shunt[phase];
                    if y != Complex64::new(0.0, 0.0) {
                        add(&mut tri, row, row, y);
                    }
                }
            }
        }

        for branch in branches {
            let Some(from_bus) = bus_by_index.get(&branch.from) else {
                continue;
            };
            let Some(to_bus) = bus_by_index.get(&branch.to) else {
                continue;
            };
            let common = branch.phases.electrical_mask()
                & from_bus.phases.electrical_mask()
                & to_bus.phases.electrical_mask();
            let common = PhaseSet::from_bits_unchecked(common);

            for pi in common.iter_electrical() {
                for pj in common.iter_electrical() {
                    let y = branch.y_series.get(pi, pj);
                    if y == Complex64::new(0.0, 0.0) {
                        continue;
                    }
                    stamp(
                        &mut tri,
                        &dofs,
                        &mut swing_injection,
                        branch.from,
                        pi,
                        branch.from,
                        pj,
                        y,
                        from_bus,
                    );
                    stamp(
                        &mut tri,
                        &dofs,
                        &mut swing_injection,
                        branch.to,
                        pi,
                        branch.to,
                        pj,
                        y,
                        to_bus,
                    );
                    stamp_mutual(
                        &mut tri,
                        &dofs,
                        &mut swing_injection,
                        branch.from,
                        pi,
                        branch.to,
                        pj,
                        -y,
                        from_bus,
                        to_bus,
                    );
                    stamp_mutual(
                        &mut tri,
                        &dofs,
                        &mut swing_injection,
                        branch.to,
                        pi,
                        branch.from,
                        pj,
                        -y,
                        to_bus,
                        from_bus,
                    );
                }
            }
        }

        Self {
            dofs,
            y_nn: tri.to_csr(),
            swing_injection,
        }
    }
}

fn add(tri: &mut TriMat<Complex64>, row: usize, col: usize, value: Complex64) {
    tri.add_triplet(row, col, value);
}

#[allow(clippy::too_many_arguments)]
fn stamp(
    tri: &mut TriMat<Complex64>,
    dofs: &DofMap,
    swing_injection: &mut [Complex64],
    bus_index: usize,
    row_phase: usize,
    _other_index: usize,
    col_phase: usize,
    value: Complex64,
    bus: &NrBus,
) {
    if let Some(row) = dofs.get(bus_index, row_phase) {
        if let Some(col) = dofs.get(bus_index, col_phase) {
            add(tri, row, col, value);
        } else {
            swing_injection[row] += value * bus.v[col_phase];
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn stamp_mutual(
    tri: &mut TriMat<Complex64>,
    dofs: &DofMap,
    swing_injection: &mut [Complex64],
    row_bus: usize,
    row_phase: usize,
    col_bus: usize,
    col_phase: usize,
    value: Complex64,
    _row_owner: &NrBus,
    col_owner: &NrBus,
) {
    if let Some(row) = dofs.get(row_bus, row_phase) {
        if let Some(col) = dofs.get(col_bus, col_phase) {
            add(tri, row, col, value);
        } else {
            swing_injection[row] += value * col_owner.v[col_phase];
        }
    }
}
