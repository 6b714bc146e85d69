//! Newton-Raphson cycle protocol (§4.7): the core's table-construction
//! side of the two-cycle dance around the external `solver_nr` black
//! box in [`gat_solver_nr`].
//!
//! Cycle A accumulates each node's loads/shunts into flat tables; cycle
//! B invokes `gat_solver_nr::solve` exactly once (on the SWING bus's
//! sync) and writes branch currents back from the converged voltages.

use gat_core::linalg;
use gat_core::{PowerflowError, PowerflowResult};
use gat_solver_nr::{NrBranch, NrBus, NrConfig, NrStatus, YBusCache};
use num_complex::Complex64;

use crate::topology::{BranchKind, BusType, PowerflowGraph};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NrCycleStatus {
    Converged { iterations: usize },
    Converging,
    Singular,
}

/// Cycle A: flatten the graph's nodes/branches into [`NrBus`]/[`NrBranch`]
/// tables. Child nodes (§3's index -99) push their load into their
/// parent's row rather than getting a row of their own.
fn build_tables(graph: &PowerflowGraph) -> (Vec<NrBus>, Vec<NrBranch>, Vec<usize>) {
    let mut slot_of: Vec<Option<usize>> = vec![None; graph.nodes.len()];
    let mut buses = Vec::new();
    let mut owner = Vec::new();

    for (idx, node) in graph.nodes.iter().enumerate() {
        if node.parent.is_some() {
            continue;
        }
        let slot = buses.len();
        slot_of[idx] = Some(slot);
        owner.push(idx);
        let mut bus = if node.bus_type == BusType::Swing {
            NrBus::swing(slot, node.phases, node.v)
        } else {
            let mut b = NrBus::new(slot, node.phases, node.nominal_voltage);
            b.v = node.v;
            b
        };
        bus.s_spec = node.s;
        bus.y_shunt = node.y;
        buses.push(bus);
    }

    // Children push their loads/shunts into their parent's row.
    for node in &graph.nodes {
        if let Some(parent_idx) = node.parent {
            if let Some(slot) = slot_of[parent_idx] {
                for p in 0..3 {
                    buses[slot].s_spec[p] += node.s[p];
                    buses[slot].y_shunt[p] += node.y[p];
                }
            }
        }
    }

    let mut branches = Vec::new();
    for branch in &graph.branches {
        if branch.status == crate::topology::BranchStatus::Open {
            continue;
        }
        let from = resolve_slot(&slot_of, branch.from);
        let to = resolve_slot(&slot_of, branch.to);
        let (Some(from), Some(to)) = (from, to) else { continue };
        if from == to {
            continue;
        }
        branches.push(NrBranch {
            from,
            to,
            phases: branch.phases,
            y_series: branch.y_to,
        });
    }

    (buses, branches, owner)
}

fn resolve_slot(slot_of: &[Option<usize>], node_idx: usize) -> Option<usize> {
    slot_of[node_idx]
}

/// Run one cycle-B solve: build tables, invoke `gat_solver_nr::solve`,
/// and write converged voltages back onto the graph's nodes. Zero-length
/// lines are rejected (§4.3 edge-case policy: "NR rejects").
pub fn solve(
    graph: &mut PowerflowGraph,
    config: &NrConfig,
    cache: &mut YBusCache,
) -> PowerflowResult<NrCycleStatus> {
    for branch in &graph.branches {
        if branch.length_ft == 0.0 && matches!(branch.kind, BranchKind::Overhead | BranchKind::Underground | BranchKind::Triplex) {
            return Err(PowerflowError::configuration(&branch.id, "zero-length lines are unsupported in NR"));
        }
    }

    let (mut buses, branches, owner) = build_tables(graph);
    let admit_change = graph.admit_change;
    let status = gat_solver_nr::solve(&mut buses, &branches, config, admit_change, cache);
    graph.admit_change = false;

    match status {
        NrStatus::Converged { iterations } => {
            for (slot, &node_idx) in owner.iter().enumerate() {
                graph.nodes[node_idx].v = buses[slot].v;
            }
            let child_voltages: Vec<(usize, [Complex64; 3])> = graph
                .nodes
                .iter()
                .enumerate()
                .filter_map(|(i, n)| n.parent.map(|p| (i, graph.nodes[p].v)))
                .collect();
            for (idx, v) in child_voltages {
                graph.nodes[idx].v = v;
            }
            compute_branch_currents(graph);
            Ok(NrCycleStatus::Converged { iterations })
        }
        NrStatus::Converging => Ok(NrCycleStatus::Converging),
        NrStatus::Singular => Ok(NrCycleStatus::Singular),
    }
}

/// Branch-current computation at cycle B (§4.7). General lines use
/// `I_from = Y_abc . (V_from - a.V_to)`, `I_to = I_from`. Transformers and
/// regulators use the in-ratio formula; split-phase additionally closes
/// the neutral current through both secondary halves.
fn compute_branch_currents(graph: &mut PowerflowGraph) {
    for branch in &mut graph.branches {
        if branch.status == crate::topology::BranchStatus::Open {
            continue;
        }
        let v_from = graph.nodes[branch.from].v;
        let v_to = graph.nodes[branch.to].v;

        let (i_from, i_to) = if matches!(branch.kind, BranchKind::Transformer | BranchKind::Regulator) {
            transformer_branch_currents(branch, v_from, v_to)
        } else {
            let a_v_to = linalg::multiply_3x1(&branch.a, &v_to);
            let mut diff = [Complex64::new(0.0, 0.0); 3];
            for p in 0..3 {
                diff[p] = v_from[p] - a_v_to[p];
            }
            let i_from = linalg::multiply_3x1(&branch.y_to, &diff);
            (i_from, i_from)
        };
        branch.current_from = i_from;
        branch.current_to = i_to;
    }
}

/// The in-ratio transformer current formula (§4.7): `vtemp = V_from -
/// A.V_to`, `I_high = b.vtemp / v_ratio^2`, `I_low = A.I_high -
/// V_to/a_ii*v_ratio` per present phase. Split-phase additionally
/// overrides the secondary neutral slot with `I_N = V_from.b_NN +
/// V_to_1.b_N1 + V_to_2.b_N2`.
///
/// Q1 (zero-diagonal tolerance): a phase absent from this transformer's
/// connection leaves `a_ii == 0`. Dividing by it would produce a NaN
/// phasor for a phase that carries no power anyway, so that phase's
/// `V_to/a_ii` term is skipped rather than computed.
fn transformer_branch_currents(branch: &crate::topology::Branch, v_from: [Complex64; 3], v_to: [Complex64; 3]) -> ([Complex64; 3], [Complex64; 3]) {
    let a_v_to = linalg::multiply_3x1(&branch.a, &v_to);
    let mut vtemp = [Complex64::new(0.0, 0.0); 3];
    for p in 0..3 {
        vtemp[p] = v_from[p] - a_v_to[p];
    }
    let v_ratio_sq = branch.v_ratio * branch.v_ratio;
    let i_high_raw = linalg::multiply_3x1(&branch.b, &vtemp);
    let mut i_high = [Complex64::new(0.0, 0.0); 3];
    for p in 0..3 {
        i_high[p] = i_high_raw[p] / v_ratio_sq;
    }

    let a_i_high = linalg::multiply_3x1(&branch.a, &i_high);
    let mut i_low = [Complex64::new(0.0, 0.0); 3];
    for p in 0..3 {
        let a_ii = branch.a.get(p, p);
        i_low[p] = if a_ii.norm() > 0.0 {
            a_i_high[p] - v_to[p] / a_ii * branch.v_ratio
        } else {
            a_i_high[p]
        };
    }

    if branch.phases.is_split_phase() {
        let b = &branch.b;
        i_low[2] = v_from[2] * b.get(2, 2) + v_to[0] * b.get(2, 0) + v_to[1] * b.get(2, 1);
    }

    (i_high, i_low)
}
