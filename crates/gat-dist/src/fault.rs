//! Fault/reliability state machine (§4.8): the 32-kind taxonomy, induction
//! and clearing, the upstream protective-device walk, and the 7x7
//! boundary-condition fault-current computation.
//!
//! Grounded on `link.cpp`'s prefix-driven `set_fault()` dispatch and its
//! `link_fault_on`/`link_fault_off` pair, flattened here into a parser over
//! [`FaultKind`] plus free functions over [`PowerflowGraph`] rather than the
//! reference's mutation of global link state.

use gat_core::linalg::{self, Matrix3, Matrix7C};
use gat_core::{Diagnostics, PhaseSet, PowerflowError, PowerflowResult};
use gat_core::phase::{PHASE_A, PHASE_B, PHASE_C};
use num_complex::Complex64;
use rand::Rng;

use crate::topology::{BranchKind, PowerflowGraph};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseCount {
    One,
    Two,
    All,
}

/// The fault taxonomy's ten category prefixes (§4.8). Each carries its own
/// phase-count contract: SLG/OC remove one phase, DLG/LL/OC2 remove two,
/// TLG/TLL/OC3 remove all three electrical phases present, and SW/FUS take
/// an explicit letter combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultCategory {
    Slg,
    Dlg,
    Ll,
    Tlg,
    Tll,
    Oc,
    Oc2,
    Oc3,
    Sw,
    Fus,
}

impl FaultCategory {
    /// Short-circuit categories get a fault-current computation through
    /// the 7x7 boundary system; open-conductor and switching categories
    /// are phase-removal events only (§4.8 "fault-current computation").
    pub fn is_short_circuit(self) -> bool {
        matches!(self, FaultCategory::Slg | FaultCategory::Dlg | FaultCategory::Ll | FaultCategory::Tlg | FaultCategory::Tll)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPhases {
    Explicit(PhaseSet),
    Random(PhaseCount),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultKind {
    pub label: String,
    pub category: FaultCategory,
    pub phases: FaultPhases,
}

fn phase_letters_to_set(label: &str, letters: &str) -> PowerflowResult<PhaseSet> {
    let bits = match letters {
        "A" => PHASE_A,
        "B" => PHASE_B,
        "C" => PHASE_C,
        "AB" => PHASE_A | PHASE_B,
        "BC" => PHASE_B | PHASE_C,
        "CA" => PHASE_C | PHASE_A,
        "ABC" => PHASE_A | PHASE_B | PHASE_C,
        other => {
            return Err(PowerflowError::configuration(
                label,
                format!("unrecognized phase suffix '{other}'"),
            ))
        }
    };
    Ok(PhaseSet::from_bits_unchecked(bits))
}

/// Parse a fault label like `"SLG-A"`, `"DLG-X"`, or `"TLG"` into a
/// [`FaultKind`]. Grounded on `link.cpp`'s string-prefix dispatch table.
pub fn parse_fault_kind(label: &str) -> PowerflowResult<FaultKind> {
    let mut parts = label.splitn(2, '-');
    let prefix = parts.next().unwrap_or("");
    let suffix = parts.next();

    let category = match prefix {
        "SLG" => FaultCategory::Slg,
        "DLG" => FaultCategory::Dlg,
        "LL" => FaultCategory::Ll,
        "TLG" => FaultCategory::Tlg,
        "TLL" => FaultCategory::Tll,
        "OC" => FaultCategory::Oc,
        "OC2" => FaultCategory::Oc2,
        "OC3" => FaultCategory::Oc3,
        "SW" => FaultCategory::Sw,
        "FUS" => FaultCategory::Fus,
        other => return Err(PowerflowError::configuration(label, format!("unrecognized fault prefix '{other}'"))),
    };

    let phases = match (category, suffix) {
        (FaultCategory::Tlg | FaultCategory::Tll | FaultCategory::Oc3, None) => FaultPhases::Explicit(PhaseSet::ABC),
        (FaultCategory::Tlg | FaultCategory::Tll | FaultCategory::Oc3, Some(_)) => {
            return Err(PowerflowError::configuration(label, "this fault kind takes no phase suffix"))
        }
        (_, None) => return Err(PowerflowError::configuration(label, "missing phase suffix")),
        (_, Some("X")) => {
            let count = match category {
                FaultCategory::Slg | FaultCategory::Oc => PhaseCount::One,
                FaultCategory::Dlg | FaultCategory::Ll | FaultCategory::Oc2 => PhaseCount::Two,
                FaultCategory::Sw | FaultCategory::Fus => PhaseCount::Two,
                FaultCategory::Tlg | FaultCategory::Tll | FaultCategory::Oc3 => unreachable!(),
            };
            FaultPhases::Random(count)
        }
        (_, Some(letters)) => {
            let set = phase_letters_to_set(label, letters)?;
            let expected = match category {
                FaultCategory::Slg | FaultCategory::Oc => Some(1),
                FaultCategory::Dlg | FaultCategory::Ll | FaultCategory::Oc2 => Some(2),
                FaultCategory::Sw | FaultCategory::Fus => None,
                FaultCategory::Tlg | FaultCategory::Tll | FaultCategory::Oc3 => unreachable!(),
            };
            if let Some(n) = expected {
                if set.count_electrical_phases() as usize != n {
                    return Err(PowerflowError::configuration(label, format!("expected {n} phase letter(s)")));
                }
            }
            FaultPhases::Explicit(set)
        }
    };

    Ok(FaultKind { label: label.to_string(), category, phases })
}

/// Resolve an "X"-wildcard fault to a concrete phase set by uniform random
/// sampling (§5: deterministic given a seeded `rng`). SW/FUS wildcards
/// sample uniformly over all seven non-empty phase combinations rather than
/// a fixed count, since a switch or fuse can legitimately open any subset.
fn sample_random_phases(category: FaultCategory, count: PhaseCount, rng: &mut impl Rng) -> PhaseSet {
    if matches!(category, FaultCategory::Sw | FaultCategory::Fus) {
        const COMBOS: [u8; 7] = [
            PHASE_A,
            PHASE_B,
            PHASE_C,
            PHASE_A | PHASE_B,
            PHASE_B | PHASE_C,
            PHASE_C | PHASE_A,
            PHASE_A | PHASE_B | PHASE_C,
        ];
        return PhaseSet::from_bits_unchecked(COMBOS[rng.gen_range(0..COMBOS.len())]);
    }
    match count {
        PhaseCount::One => {
            const COMBOS: [u8; 3] = [PHASE_A, PHASE_B, PHASE_C];
            PhaseSet::from_bits_unchecked(COMBOS[rng.gen_range(0..3)])
        }
        PhaseCount::Two => {
            const COMBOS: [u8; 3] = [PHASE_A | PHASE_B, PHASE_B | PHASE_C, PHASE_C | PHASE_A];
            PhaseSet::from_bits_unchecked(COMBOS[rng.gen_range(0..3)])
        }
        PhaseCount::All => PhaseSet::ABC,
    }
}

fn resolve_phases(kind: &FaultKind, rng: &mut impl Rng) -> PhaseSet {
    match kind.phases {
        FaultPhases::Explicit(p) => p,
        FaultPhases::Random(count) => sample_random_phases(kind.category, count, rng),
    }
}

/// Walk from the SWING bus outward to build each node's incoming-branch
/// index, used to find "upstream" without storing parent pointers directly
/// on every node (only zero-length-line absorption does that; faults don't
/// mutate topology).
fn build_parent_branch(graph: &PowerflowGraph) -> PowerflowResult<Vec<Option<usize>>> {
    let swing = graph.swing_index()?;
    let mut parent_branch = vec![None; graph.nodes.len()];
    let mut visited = vec![false; graph.nodes.len()];
    let mut queue = std::collections::VecDeque::new();
    visited[swing] = true;
    queue.push_back(swing);
    while let Some(node_idx) = queue.pop_front() {
        for &branch_idx in &graph.adjacency[node_idx] {
            let branch = &graph.branches[branch_idx];
            let other = if branch.from == node_idx { branch.to } else { branch.from };
            if !visited[other] {
                visited[other] = true;
                parent_branch[other] = Some(branch_idx);
                queue.push_back(other);
            }
        }
    }
    Ok(parent_branch)
}

/// A typical distribution recloser gives up and locks out after three
/// reclose attempts rather than cycling forever.
const RECLOSER_LOCKOUT_ATTEMPTS: u32 = 3;

/// Has any recloser in the subtree rooted at `sectionalizer_branch`'s `to`
/// node already recorded a reclose attempt? A sectionalizer is transparent
/// to a fault until a recloser downstream of it has operated, at which
/// point it coordinates by tripping itself too (§4.8).
fn recloser_operated_downstream(graph: &PowerflowGraph, sectionalizer_branch: usize) -> bool {
    let root = graph.branches[sectionalizer_branch].to;
    let mut visited = vec![false; graph.nodes.len()];
    let mut queue = std::collections::VecDeque::new();
    visited[root] = true;
    queue.push_back(root);
    while let Some(node_idx) = queue.pop_front() {
        for &branch_idx in &graph.adjacency[node_idx] {
            if branch_idx == sectionalizer_branch {
                continue;
            }
            let branch = &graph.branches[branch_idx];
            let other = if branch.from == node_idx { branch.to } else { branch.from };
            if visited[other] {
                continue;
            }
            if branch.kind == BranchKind::Recloser && branch.reclose_attempts > 0 {
                return true;
            }
            visited[other] = true;
            queue.push_back(other);
        }
    }
    false
}

/// Walk upstream from a faulted branch toward SWING, applying each
/// protective device kind's own stopping rule (§4.8's per-device table)
/// rather than one blanket "any protective device" check:
///
/// - recloser: records a reclose attempt, trips the same phases the
///   downstream fault removed (locking them out once attempts are
///   exhausted), and stops the walk.
/// - sectionalizer: transparent unless a recloser downstream of it has
///   already operated, in which case it trips the same phases and stops
///   the walk; otherwise the walk continues past it.
/// - fuse: opens the faulted phases and stops the walk.
/// - switch: only stops the walk for a switching-category (`SW-*`) fault;
///   otherwise transparent.
/// - transformer/regulator: catastrophic — all three phases drop on the
///   branch and the walk stops there.
/// - SWING bus: the walk runs out of parent branches; phases are removed
///   at SWING itself (`None`).
fn find_upstream_protective_device(
    graph: &mut PowerflowGraph,
    faulted_branch: usize,
    category: FaultCategory,
    removed: PhaseSet,
) -> PowerflowResult<Option<usize>> {
    let parent_branch = build_parent_branch(graph)?;
    let mut current = graph.branches[faulted_branch].from;
    loop {
        let Some(branch_idx) = parent_branch[current] else {
            return Ok(None);
        };
        match graph.branches[branch_idx].kind {
            BranchKind::Recloser => {
                let branch = &mut graph.branches[branch_idx];
                let trip = PhaseSet::from_bits_unchecked(removed.bits() & branch.orig_phases.electrical_mask());
                branch.reclose_attempts += 1;
                if branch.reclose_attempts >= RECLOSER_LOCKOUT_ATTEMPTS {
                    branch.fault_locked = PhaseSet::from_bits_unchecked(branch.fault_locked.bits() | trip.bits());
                }
                branch.fault_phases = PhaseSet::from_bits_unchecked(branch.fault_phases.bits() | trip.bits());
                branch.phases = PhaseSet::from_bits_unchecked(branch.orig_phases.bits() & !branch.fault_phases.bits());
                return Ok(Some(branch_idx));
            }
            BranchKind::Sectionalizer => {
                if recloser_operated_downstream(graph, branch_idx) {
                    let branch = &mut graph.branches[branch_idx];
                    let trip = PhaseSet::from_bits_unchecked(removed.bits() & branch.orig_phases.electrical_mask());
                    branch.fault_phases = PhaseSet::from_bits_unchecked(branch.fault_phases.bits() | trip.bits());
                    branch.phases = PhaseSet::from_bits_unchecked(branch.orig_phases.bits() & !branch.fault_phases.bits());
                    return Ok(Some(branch_idx));
                }
                current = graph.branches[branch_idx].from;
            }
            BranchKind::Fuse => return Ok(Some(branch_idx)),
            BranchKind::Switch => {
                if matches!(category, FaultCategory::Sw) {
                    return Ok(Some(branch_idx));
                }
                current = graph.branches[branch_idx].from;
            }
            BranchKind::Transformer | BranchKind::Regulator => {
                let branch = &mut graph.branches[branch_idx];
                branch.fault_phases = branch.orig_phases;
                branch.phases = PhaseSet::NONE;
                return Ok(Some(branch_idx));
            }
            _ => current = graph.branches[branch_idx].from,
        }
    }
}

/// Induce a fault on `branch_idx`: resolve any "X" wildcard, mask the
/// branch's phases down, and locate the protective device that should see
/// this fault. Returns the concrete phases removed.
///
/// Q4 (TLL degenerating to TLG): a branch that carries fewer than three
/// electrical phases has no third phase for a TLL fault's phase-to-phase
/// path to short against, so the removed-phase mask collapses to exactly
/// what a TLG fault would remove — every phase the branch actually has, all
/// grounded. TLL and TLG are therefore computed identically here for
/// partial-phase branches; the distinction only matters for three-phase
/// branches, where TLL additionally implies phase-phase fault impedance in
/// the boundary system built by [`fault_current`].
pub fn link_fault_on(
    graph: &mut PowerflowGraph,
    branch_idx: usize,
    kind: &FaultKind,
    rng: &mut impl Rng,
) -> PowerflowResult<PhaseSet> {
    let sampled = resolve_phases(kind, rng);
    let present = graph.branches[branch_idx].orig_phases.electrical_mask();
    let removed = PhaseSet::from_bits_unchecked(sampled.electrical_mask() & present);
    if removed == PhaseSet::NONE {
        return Err(PowerflowError::configuration(
            &kind.label,
            "fault phases are not present on the faulted branch",
        ));
    }

    {
        let branch = &mut graph.branches[branch_idx];
        branch.fault_phases = PhaseSet::from_bits_unchecked(branch.fault_phases.bits() | removed.bits());
        branch.phases = PhaseSet::from_bits_unchecked(branch.orig_phases.bits() & !branch.fault_phases.bits());
    }

    let protective = find_upstream_protective_device(graph, branch_idx, kind.category, removed)?;
    let branch = &mut graph.branches[branch_idx];
    for i in 0..3 {
        if removed.bits() & (1 << i) != 0 {
            branch.protect_locations[i] = protective;
        }
    }
    graph.admit_change = true;
    Ok(removed)
}

/// Clear a previously-induced fault on `branch_idx`, restoring `phases`.
pub fn link_fault_off(graph: &mut PowerflowGraph, branch_idx: usize, phases: PhaseSet) {
    let branch = &mut graph.branches[branch_idx];
    branch.fault_phases = PhaseSet::from_bits_unchecked(branch.fault_phases.bits() & !phases.bits());
    branch.phases = PhaseSet::from_bits_unchecked(branch.orig_phases.bits() & !branch.fault_phases.bits());
    for i in 0..3 {
        if phases.bits() & (1 << i) != 0 {
            branch.protect_locations[i] = None;
        }
    }
    graph.admit_change = true;
}

/// Accumulate the Thevenin impedance seen from `branch_idx`'s `from` node
/// back to SWING, referring through transformers by `v_ratio^2` (§4.8).
fn accumulate_thevenin_impedance(graph: &PowerflowGraph, branch_idx: usize) -> PowerflowResult<Matrix3> {
    let parent_branch = build_parent_branch(graph)?;
    let faulted = &graph.branches[branch_idx];
    let mut z = faulted.b;
    let mut ratio_sq = Complex64::new(1.0, 0.0);
    let mut current = faulted.from;
    loop {
        let Some(pb) = parent_branch[current] else { break };
        let branch = &graph.branches[pb];
        if matches!(branch.kind, BranchKind::Transformer | BranchKind::Regulator) {
            ratio_sq *= Complex64::new(branch.v_ratio * branch.v_ratio, 0.0);
        }
        z = linalg::add_3x3(&z, &linalg::multiply_scalar_3x3(ratio_sq, &branch.b));
        current = branch.from;
    }
    Ok(z)
}

/// Build the 7x7 boundary-condition system's four fault-type rows over the
/// unknown vector `[Ia, Ib, Ic, Va, Vb, Vc, Vg]` (§4.8). Variable indices:
/// phase currents at 0..3, phase-to-ground voltages at 3..6, ground voltage
/// at 6.
fn constraint_rows(category: FaultCategory, removed: PhaseSet) -> PowerflowResult<[[Complex64; 7]; 4]> {
    let one = Complex64::new(1.0, 0.0);
    let zero = Complex64::new(0.0, 0.0);
    let mut rows = [[zero; 7]; 4];
    let phases: Vec<usize> = removed.iter_electrical().collect();

    match category {
        FaultCategory::Slg => {
            let p = phases[0];
            rows[0][3 + p] = one; // Va = 0
            let others: Vec<usize> = (0..3).filter(|&i| i != p).collect();
            rows[1][others[0]] = one; // I_other1 = 0
            rows[2][others[1]] = one; // I_other2 = 0
            rows[3][6] = one; // Vg = 0
        }
        FaultCategory::Dlg => {
            let (p0, p1) = (phases[0], phases[1]);
            let other = (0..3).find(|i| *i != p0 && *i != p1).unwrap();
            rows[0][3 + p0] = one;
            rows[0][6] = -one; // Va - Vg = 0
            rows[1][3 + p1] = one;
            rows[1][6] = -one; // Vb - Vg = 0
            rows[2][other] = one; // I_unfaulted = 0
            rows[3][6] = one; // Vg = 0 (solidly grounded)
        }
        FaultCategory::Ll => {
            let (p0, p1) = (phases[0], phases[1]);
            let other = (0..3).find(|i| *i != p0 && *i != p1).unwrap();
            rows[0][3 + p0] = one;
            rows[0][3 + p1] = -one; // Va - Vb = 0
            rows[1][p0] = one;
            rows[1][p1] = one; // Ia + Ib = 0
            rows[2][other] = one; // I_unfaulted = 0
            rows[3][6] = one; // ground path carries no current: Vg = 0
        }
        FaultCategory::Tlg => {
            for (row, &p) in phases.iter().enumerate().take(3) {
                rows[row][3 + p] = one; // Vp = 0 for every present phase
            }
            rows[3][6] = one; // Vg = 0
        }
        FaultCategory::Tll => {
            if phases.len() == 3 {
                rows[0][3] = one;
                rows[0][4] = -one; // Va - Vb = 0
                rows[1][4] = one;
                rows[1][5] = -one; // Vb - Vc = 0
                rows[2][0] = one;
                rows[2][1] = one;
                rows[2][2] = one; // Ia + Ib + Ic = 0 (no ground path)
                rows[3][6] = one; // Vg = 0
            } else {
                // Q4: degenerates to TLG on a partial-phase branch.
                return constraint_rows(FaultCategory::Tlg, removed);
            }
        }
        FaultCategory::Oc | FaultCategory::Oc2 | FaultCategory::Oc3 | FaultCategory::Sw | FaultCategory::Fus => {
            return Err(PowerflowError::configuration(
                "fault-current",
                "open-conductor/switching categories do not compute a short-circuit current",
            ));
        }
    }
    Ok(rows)
}

/// Compute the fault current for a short-circuit category (§4.8) via the
/// 7x7 complex boundary-condition system: three nodal-admittance rows from
/// the Thevenin impedance plus four fault-type rows from
/// [`constraint_rows`]. Returns the per-phase fault current `[Ia, Ib, Ic]`.
pub fn fault_current(
    graph: &PowerflowGraph,
    branch_idx: usize,
    kind: &FaultKind,
    removed: PhaseSet,
    v_prefault: &[Complex64; 3],
    diagnostics: &mut Diagnostics,
) -> PowerflowResult<[Complex64; 3]> {
    if !kind.category.is_short_circuit() {
        return Err(PowerflowError::configuration(
            &kind.label,
            "fault current is only defined for short-circuit categories",
        ));
    }

    let z_thev = accumulate_thevenin_impedance(graph, branch_idx)?;
    let present = graph.branches[branch_idx].phases.electrical_mask() | removed.bits();
    let y_thev = match z_thev.inverse_masked(present) {
        Some(y) => y,
        None => {
            diagnostics.record(&PowerflowError::numerical(
                &kind.label,
                "thevenin impedance",
                "singular Z_thevenin; fault current zeroed",
            ));
            return Ok([Complex64::new(0.0, 0.0); 3]);
        }
    };

    let zero = Complex64::new(0.0, 0.0);
    let mut a = Matrix7C::ZERO;
    // Nodal rows: I_p - sum_q(Y_thev[p][q] * V_q) = -Y_thev[p][*] . V_prefault (moved to rhs).
    for p in 0..3 {
        a.0[p][p] = Complex64::new(1.0, 0.0);
        for q in 0..3 {
            a.0[p][3 + q] = -y_thev.get(p, q);
        }
    }
    let rows = constraint_rows(kind.category, removed)?;
    for (i, row) in rows.iter().enumerate() {
        a.0[3 + i] = *row;
    }

    // Current sourced by the prefault voltage behind Z_thevenin.
    let source = linalg::multiply_3x1(&y_thev, v_prefault);
    let mut b = [zero; 7];
    b[0] = source[0];
    b[1] = source[1];
    b[2] = source[2];

    match linalg::solve_7x7_complex(&a, &b) {
        Ok(x) => Ok([x[0], x[1], x[2]]),
        Err(_) => {
            diagnostics.record(&PowerflowError::numerical(
                &kind.label,
                "fault boundary system",
                "singular 7x7 LU; fault current zeroed",
            ));
            Ok([zero; 3])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{Branch, BranchKind, BranchStatus, Node};
    use gat_core::units::Volts;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn plain_branch(from: usize, to: usize, kind: BranchKind) -> Branch {
        let mut b = Matrix3::ZERO;
        for i in 0..3 {
            b.set(i, i, Complex64::new(1.0, 2.0));
        }
        Branch {
            id: format!("branch-{from}-{to}"),
            from,
            to,
            kind,
            status: BranchStatus::Closed,
            phases: PhaseSet::ABC,
            orig_phases: PhaseSet::ABC,
            fault_phases: PhaseSet::NONE,
            a: Matrix3::identity(),
            b,
            c: Matrix3::ZERO,
            d: Matrix3::identity(),
            y_from: Matrix3::ZERO,
            y_to: Matrix3::ZERO,
            y_s_from: Matrix3::ZERO,
            y_s_to: Matrix3::ZERO,
            v_ratio: 1.0,
            length_ft: 1000.0,
            protect_locations: [None; 3],
            current_from: [Complex64::new(0.0, 0.0); 3],
            current_to: [Complex64::new(0.0, 0.0); 3],
            tn: [Complex64::new(-0.5, 0.0); 2],
            mean_repair_time_s: 0.0,
            reclose_attempts: 0,
            fault_locked: PhaseSet::NONE,
        }
    }

    fn three_bus_with_recloser() -> (PowerflowGraph, usize, usize) {
        let mut g = PowerflowGraph::new();
        let swing = g.add_node(Node::new("swing", PhaseSet::ABC, crate::topology::BusType::Swing, Volts(7200.0)));
        let mid = g.add_node(Node::new("bus-2", PhaseSet::ABC, crate::topology::BusType::Pq, Volts(7200.0)));
        let far = g.add_node(Node::new("bus-3", PhaseSet::ABC, crate::topology::BusType::Pq, Volts(7200.0)));
        let recloser_idx = g.add_branch(plain_branch(swing, mid, BranchKind::Recloser)).unwrap();
        let faulted_idx = g.add_branch(plain_branch(mid, far, BranchKind::Overhead)).unwrap();
        let _ = recloser_idx;
        (g, faulted_idx, mid)
    }

    #[test]
    fn parses_slg_with_letter_suffix() {
        let k = parse_fault_kind("SLG-A").unwrap();
        assert_eq!(k.category, FaultCategory::Slg);
        assert!(matches!(k.phases, FaultPhases::Explicit(p) if p.has_phase_a()));
    }

    #[test]
    fn parses_tlg_without_suffix() {
        let k = parse_fault_kind("TLG").unwrap();
        assert_eq!(k.category, FaultCategory::Tlg);
        assert!(matches!(k.phases, FaultPhases::Explicit(p) if p == PhaseSet::ABC));
    }

    #[test]
    fn rejects_wrong_phase_count() {
        let err = parse_fault_kind("SLG-AB").unwrap_err();
        assert!(matches!(err, PowerflowError::ConfigurationError { .. }));
    }

    #[test]
    fn x_wildcard_resolves_deterministically_with_seed() {
        let kind = parse_fault_kind("SLG-X").unwrap();
        let mut rng1 = StdRng::seed_from_u64(42);
        let mut rng2 = StdRng::seed_from_u64(42);
        let p1 = resolve_phases(&kind, &mut rng1);
        let p2 = resolve_phases(&kind, &mut rng2);
        assert_eq!(p1, p2);
        assert_eq!(p1.count_electrical_phases(), 1);
    }

    #[test]
    fn fault_on_locates_upstream_recloser() {
        let (mut g, faulted_idx, _mid) = three_bus_with_recloser();
        let kind = parse_fault_kind("SLG-A").unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let removed = link_fault_on(&mut g, faulted_idx, &kind, &mut rng).unwrap();
        assert!(removed.has_phase_a());
        assert!(g.branches[faulted_idx].protect_locations[0].is_some());
        assert_eq!(g.branches[faulted_idx].phases.has_phase_a(), false);
        assert!(g.branches[faulted_idx].phases.has_phase_b());
    }

    #[test]
    fn fault_off_restores_phases() {
        let (mut g, faulted_idx, _mid) = three_bus_with_recloser();
        let kind = parse_fault_kind("SLG-B").unwrap();
        let mut rng = StdRng::seed_from_u64(2);
        let removed = link_fault_on(&mut g, faulted_idx, &kind, &mut rng).unwrap();
        link_fault_off(&mut g, faulted_idx, removed);
        assert_eq!(g.branches[faulted_idx].phases, PhaseSet::ABC);
        assert!(g.branches[faulted_idx].protect_locations.iter().all(|p| p.is_none()));
    }

    #[test]
    fn recloser_trips_same_phases_and_counts_attempts() {
        let (mut g, faulted_idx, mid) = three_bus_with_recloser();
        let recloser_idx = g.adjacency[mid].iter().copied().find(|&b| b != faulted_idx).unwrap();
        let kind = parse_fault_kind("SLG-A").unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        link_fault_on(&mut g, faulted_idx, &kind, &mut rng).unwrap();
        assert_eq!(g.branches[recloser_idx].reclose_attempts, 1);
        assert!(!g.branches[recloser_idx].phases.has_phase_a());
        assert!(g.branches[recloser_idx].phases.has_phase_b());
        assert!(g.branches[recloser_idx].fault_locked == PhaseSet::NONE);
    }

    #[test]
    fn recloser_locks_out_phase_after_enough_attempts() {
        let (mut g, faulted_idx, mid) = three_bus_with_recloser();
        let recloser_idx = g.adjacency[mid].iter().copied().find(|&b| b != faulted_idx).unwrap();
        let kind = parse_fault_kind("SLG-A").unwrap();
        for seed in 0..RECLOSER_LOCKOUT_ATTEMPTS as u64 {
            let mut rng = StdRng::seed_from_u64(seed);
            let removed = link_fault_on(&mut g, faulted_idx, &kind, &mut rng).unwrap();
            link_fault_off(&mut g, faulted_idx, removed);
        }
        assert_eq!(g.branches[recloser_idx].reclose_attempts, RECLOSER_LOCKOUT_ATTEMPTS);
        assert!(g.branches[recloser_idx].fault_locked.has_phase_a());
    }

    fn three_bus_with_sectionalizer(kind: BranchKind) -> (PowerflowGraph, usize, usize) {
        let mut g = PowerflowGraph::new();
        let swing = g.add_node(Node::new("swing", PhaseSet::ABC, crate::topology::BusType::Swing, Volts(7200.0)));
        let mid = g.add_node(Node::new("bus-2", PhaseSet::ABC, crate::topology::BusType::Pq, Volts(7200.0)));
        let far = g.add_node(Node::new("bus-3", PhaseSet::ABC, crate::topology::BusType::Pq, Volts(7200.0)));
        let section_idx = g.add_branch(plain_branch(swing, mid, kind)).unwrap();
        let faulted_idx = g.add_branch(plain_branch(mid, far, BranchKind::Overhead)).unwrap();
        (g, faulted_idx, section_idx)
    }

    #[test]
    fn sectionalizer_is_transparent_until_downstream_recloser_has_operated() {
        let (mut g, faulted_idx, section_idx) = three_bus_with_sectionalizer(BranchKind::Sectionalizer);
        let kind = parse_fault_kind("SLG-A").unwrap();
        let mut rng = StdRng::seed_from_u64(4);
        link_fault_on(&mut g, faulted_idx, &kind, &mut rng).unwrap();
        // no recloser anywhere downstream, so the walk passes through to SWING
        assert_eq!(g.branches[faulted_idx].protect_locations[0], None);
        assert!(g.branches[section_idx].phases.has_phase_a());
    }

    #[test]
    fn sectionalizer_trips_once_downstream_recloser_has_operated() {
        let (mut g, faulted_idx, section_idx) = three_bus_with_sectionalizer(BranchKind::Sectionalizer);
        let mid = g.branches[section_idx].to;
        let leaf = g.add_node(Node::new("bus-4", PhaseSet::ABC, crate::topology::BusType::Pq, Volts(7200.0)));
        let recloser_idx = g.add_branch(plain_branch(mid, leaf, BranchKind::Recloser)).unwrap();
        g.branches[recloser_idx].reclose_attempts = 1;

        let kind = parse_fault_kind("SLG-A").unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        link_fault_on(&mut g, faulted_idx, &kind, &mut rng).unwrap();
        assert_eq!(g.branches[faulted_idx].protect_locations[0], Some(section_idx));
        assert!(!g.branches[section_idx].phases.has_phase_a());
    }

    #[test]
    fn switch_only_intercepts_switching_category_faults() {
        let (mut g, faulted_idx, section_idx) = three_bus_with_sectionalizer(BranchKind::Switch);
        let kind = parse_fault_kind("SLG-A").unwrap();
        let mut rng = StdRng::seed_from_u64(6);
        link_fault_on(&mut g, faulted_idx, &kind, &mut rng).unwrap();
        // SLG is not a switching category: the switch is transparent, walk reaches SWING
        assert_eq!(g.branches[faulted_idx].protect_locations[0], None);
        assert!(g.branches[section_idx].phases.has_phase_a());
    }

    #[test]
    fn switch_intercepts_sw_category_faults() {
        let (mut g, faulted_idx, section_idx) = three_bus_with_sectionalizer(BranchKind::Switch);
        let kind = parse_fault_kind("SW-A").unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        link_fault_on(&mut g, faulted_idx, &kind, &mut rng).unwrap();
        assert_eq!(g.branches[faulted_idx].protect_locations[0], Some(section_idx));
    }

    #[test]
    fn transformer_upstream_trips_catastrophically_instead_of_giving_up() {
        let (mut g, faulted_idx, xfmr_idx) = three_bus_with_sectionalizer(BranchKind::Transformer);
        let kind = parse_fault_kind("SLG-A").unwrap();
        let mut rng = StdRng::seed_from_u64(8);
        link_fault_on(&mut g, faulted_idx, &kind, &mut rng).unwrap();
        assert_eq!(g.branches[faulted_idx].protect_locations[0], Some(xfmr_idx));
        assert_eq!(g.branches[xfmr_idx].phases, PhaseSet::NONE);
    }

    #[test]
    fn tll_on_two_phase_branch_degenerates_to_tlg_shape() {
        let mut g = PowerflowGraph::new();
        let swing = g.add_node(Node::new("swing", PhaseSet::ABC, crate::topology::BusType::Swing, Volts(7200.0)));
        let far = g.add_node(Node::new("bus-2", PhaseSet::ABC, crate::topology::BusType::Pq, Volts(7200.0)));
        let mut b = plain_branch(swing, far, BranchKind::Overhead);
        let two_phase = PhaseSet::new(PHASE_A | PHASE_B).unwrap();
        b.phases = two_phase;
        b.orig_phases = two_phase;
        let idx = g.add_branch(b).unwrap();

        let kind = parse_fault_kind("TLL").unwrap();
        let present = g.branches[idx].orig_phases.electrical_mask();
        let removed = PhaseSet::from_bits_unchecked(PhaseSet::ABC.electrical_mask() & present);
        let rows = constraint_rows(kind.category, removed).unwrap();
        let tlg_rows = constraint_rows(FaultCategory::Tlg, removed).unwrap();
        assert_eq!(rows, tlg_rows);
    }

    #[test]
    fn open_conductor_categories_reject_fault_current() {
        let (g, faulted_idx, _mid) = three_bus_with_recloser();
        let kind = parse_fault_kind("OC-A").unwrap();
        let mut diag = Diagnostics::new();
        let err = fault_current(&g, faulted_idx, &kind, PhaseSet::from_bits_unchecked(PHASE_A), &[Complex64::new(7200.0, 0.0); 3], &mut diag).unwrap_err();
        assert!(matches!(err, PowerflowError::ConfigurationError { .. }));
    }

    #[test]
    fn slg_fault_current_is_nonzero() {
        let (g, faulted_idx, _mid) = three_bus_with_recloser();
        let kind = parse_fault_kind("SLG-A").unwrap();
        let removed = PhaseSet::from_bits_unchecked(PHASE_A);
        let mut diag = Diagnostics::new();
        let v_prefault = [Complex64::new(7200.0, 0.0); 3];
        let i = fault_current(&g, faulted_idx, &kind, removed, &v_prefault, &mut diag).unwrap();
        assert!(i[0].norm() > 0.0);
    }
}
