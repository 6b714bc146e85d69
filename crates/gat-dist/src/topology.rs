//! The node/branch data model (§3) and the `PowerflowGraph` that owns it.
//!
//! Per §9's redesign note, the reference implementation's global
//! BusData/BranchData arrays and SWING-bus pointer become a single owned
//! `PowerflowGraph`, and the adjacency list / "protective device
//! upstream of me" back-pointer become plain integer indices rather than
//! raw pointers. A child node's reference is `None` (§3's index -99)
//! rather than a sentinel value.

use gat_core::linalg::Matrix3;
use gat_core::units::Volts;
use gat_core::{Diagnostics, PhaseSet, PowerflowError, PowerflowResult};
use num_complex::Complex64;

/// Flattened node "kind" replacing the reference implementation's deep
/// inheritance chain (powerflow_object -> node -> load/meter ->
/// triplex_node ...), per §9.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Node,
    Load,
    Meter,
    TriplexNode,
    TriplexMeter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusType {
    Pq,
    Pv,
    Swing,
}

/// A point in the network where voltages are solved (§3 "Node").
#[derive(Debug, Clone)]
pub struct Node {
    pub id: String,
    pub kind: NodeKind,
    pub phases: PhaseSet,
    pub bus_type: BusType,
    pub nominal_voltage: Volts,
    pub v: [Complex64; 3],
    pub s: [Complex64; 3],
    pub y: [Complex64; 3],
    pub i_const: [Complex64; 3],
    pub maximum_voltage_error: f64,
    pub in_service: bool,
    /// Child-node aggregation reference (§3's index -99 sentinel).
    pub parent: Option<usize>,
    /// Snapshot taken whenever a phase departs mid-solve (§4.7
    /// `last_voltage[]`), restored when that phase returns.
    pub last_voltage: [Complex64; 3],
    pub prev_phases: PhaseSet,
    /// True once this bus has received a voltage from an energized
    /// upstream path this solve (§4.5 "no-source" propagation).
    pub has_source: bool,
    /// GridLAB-D-style load priority; 2 marks a critical load (§6's
    /// topology-JSON `is_critical` field).
    pub load_priority: u8,
}

impl Node {
    pub fn new(id: impl Into<String>, phases: PhaseSet, bus_type: BusType, nominal_voltage: Volts) -> Self {
        let v0 = Complex64::new(nominal_voltage.value(), 0.0);
        Self {
            id: id.into(),
            kind: NodeKind::Node,
            phases,
            bus_type,
            nominal_voltage,
            v: [v0, v0, v0],
            s: [Complex64::new(0.0, 0.0); 3],
            y: [Complex64::new(0.0, 0.0); 3],
            i_const: [Complex64::new(0.0, 0.0); 3],
            maximum_voltage_error: 1e-6,
            in_service: true,
            parent: None,
            last_voltage: [Complex64::new(0.0, 0.0); 3],
            prev_phases: phases,
            has_source: bus_type == BusType::Swing,
            load_priority: 0,
        }
    }

    pub fn is_critical_load(&self) -> bool {
        self.load_priority == 2
    }

    pub fn is_split_phase(&self) -> bool {
        self.phases.is_split_phase()
    }

    /// Snapshot phases that just departed and restore phases that just
    /// returned, comparing against `prev_phases` (§4.7).
    pub fn reconcile_phase_transition(&mut self) {
        let departed = self.prev_phases.bits() & !self.phases.bits();
        let returned = self.phases.bits() & !self.prev_phases.bits();
        for i in 0..3 {
            let bit = 1u8 << i;
            if departed & bit != 0 {
                self.last_voltage[i] = self.v[i];
                self.v[i] = Complex64::new(0.0, 0.0);
            }
            if returned & bit != 0 {
                self.v[i] = self.last_voltage[i];
            }
        }
        self.prev_phases = self.phases;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchKind {
    Overhead,
    Underground,
    Triplex,
    Switch,
    Fuse,
    Recloser,
    Sectionalizer,
    Transformer,
    Regulator,
}

impl BranchKind {
    pub fn is_protective_device(self) -> bool {
        matches!(self, BranchKind::Fuse | BranchKind::Recloser | BranchKind::Sectionalizer | BranchKind::Switch)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchStatus {
    Closed,
    Open,
}

/// A two-terminal element connecting two buses (§3 "Branch (link)").
#[derive(Debug, Clone)]
pub struct Branch {
    pub id: String,
    pub from: usize,
    pub to: usize,
    pub kind: BranchKind,
    pub status: BranchStatus,
    /// Current, possibly fault-reduced, phase set.
    pub phases: PhaseSet,
    /// Phase set before any fault was applied.
    pub orig_phases: PhaseSet,
    /// Phases currently removed by a fault (§4.8).
    pub fault_phases: PhaseSet,
    pub a: Matrix3,
    pub b: Matrix3,
    pub c: Matrix3,
    pub d: Matrix3,
    pub y_from: Matrix3,
    pub y_to: Matrix3,
    pub y_s_from: Matrix3,
    pub y_s_to: Matrix3,
    /// Primary:secondary turns ratio; 1.0 for a non-transformer branch.
    pub v_ratio: f64,
    pub length_ft: f64,
    /// Triplex neutral-current coefficients `[-z_n1/z_nn, -z_n2/z_nn]`
    /// from the line-matrix builder's Kron reduction (§4.3); `[-0.5,
    /// -0.5]` (an even split) for any non-triplex branch.
    pub tn: [Complex64; 2],
    /// Index of the protective device found by the upstream walk, per
    /// phase (§4.8). `None` until a fault has been induced and located.
    pub protect_locations: [Option<usize>; 3],
    pub current_from: [Complex64; 3],
    pub current_to: [Complex64; 3],
    /// Seconds after a fault clears before this branch is back in service
    /// (§4.8 restoration bookkeeping), grounded on `link.cpp`'s
    /// `mean_repair_time` field.
    pub mean_repair_time_s: f64,
    /// Count of reclose attempts recorded against a recloser branch by
    /// the upstream fault walk (§4.8). Zero and unused on any other kind.
    pub reclose_attempts: u32,
    /// Phases a recloser has locked out after exhausting its reclose
    /// attempts; these stay open across `link_fault_off` until manually
    /// reset. Zero and unused on any other kind.
    pub fault_locked: PhaseSet,
}

impl Branch {
    /// A negative `mean_repair_time_s` is not a valid setting; clamp it to
    /// zero and warn, mirroring `link.cpp:227-235`'s `init()` check.
    pub fn validate_mean_repair_time(&mut self, diagnostics: &mut Diagnostics) {
        if self.mean_repair_time_s < 0.0 {
            diagnostics.record(&PowerflowError::configuration(
                &self.id,
                "negative mean_repair_time_s, clamped to 0",
            ));
            self.mean_repair_time_s = 0.0;
        }
    }

    /// §3 invariant: for a closed non-fuse/non-switch branch,
    /// `phases == origphases & ~faultphases`.
    pub fn check_phase_invariant(&self) -> PowerflowResult<()> {
        if self.status == BranchStatus::Closed
            && !matches!(self.kind, BranchKind::Fuse | BranchKind::Switch)
        {
            let expected = self.orig_phases.bits() & !self.fault_phases.bits();
            if self.phases.bits() != expected {
                return Err(PowerflowError::TopologyError(format!(
                    "branch {} phases {:?} do not equal origphases & ~faultphases",
                    self.id, self.phases
                )));
            }
        }
        Ok(())
    }
}

/// The owned graph value that replaces the reference implementation's
/// global BusData/BranchData tables and SWING-bus pointer (§9).
#[derive(Debug, Clone, Default)]
pub struct PowerflowGraph {
    pub nodes: Vec<Node>,
    pub branches: Vec<Branch>,
    pub swing: Option<usize>,
    /// Branch indices incident to each node, built once at load time and
    /// mutated only during fault clearing / zero-length self-absorption
    /// (§5 "Shared-resource policy").
    pub adjacency: Vec<Vec<usize>>,
    /// Mirrors `NR_admit_change`: set whenever a branch status, fault
    /// mask, or tap changes; cleared once the solver has rebuilt its
    /// admittance matrix.
    pub admit_change: bool,
}

impl PowerflowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: Node) -> usize {
        let is_swing = node.bus_type == BusType::Swing;
        let index = self.nodes.len();
        self.nodes.push(node);
        self.adjacency.push(Vec::new());
        if is_swing {
            self.swing = Some(index);
        }
        index
    }

    pub fn add_branch(&mut self, branch: Branch) -> PowerflowResult<usize> {
        if branch.from >= self.nodes.len() || branch.to >= self.nodes.len() {
            return Err(PowerflowError::TopologyError(format!(
                "branch {} endpoints are not nodes",
                branch.id
            )));
        }
        let index = self.branches.len();
        self.adjacency[branch.from].push(index);
        self.adjacency[branch.to].push(index);
        self.branches.push(branch);
        Ok(index)
    }

    /// Validate §3's global invariants: exactly one SWING per connected
    /// component (checked here as exactly one overall, since the core
    /// only models a single feeder per graph), and every non-SWING
    /// node's phases are a subset of its upstream branch's phases.
    pub fn validate(&mut self, diagnostics: &mut Diagnostics) -> PowerflowResult<()> {
        let swing_count = self.nodes.iter().filter(|n| n.bus_type == BusType::Swing).count();
        if swing_count != 1 {
            return Err(PowerflowError::TopologyError(format!(
                "expected exactly one SWING bus, found {swing_count}"
            )));
        }
        for branch in &mut self.branches {
            branch.check_phase_invariant()?;
            branch.validate_mean_repair_time(diagnostics);
            let from_phases = self.nodes[branch.from].phases;
            let to_phases = self.nodes[branch.to].phases;
            if !branch.phases.is_superset_of(to_phases) && self.nodes[branch.to].bus_type != BusType::Swing {
                diagnostics.record(&PowerflowError::configuration(
                    &branch.id,
                    "to-node phases are not a subset of the branch's phases",
                ));
            }
            let _ = from_phases;
        }
        Ok(())
    }

    pub fn swing_index(&self) -> PowerflowResult<usize> {
        self.swing.ok_or_else(|| PowerflowError::TopologyError("no SWING bus registered".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn swing_node() -> Node {
        Node::new("swing", PhaseSet::ABC, BusType::Swing, Volts(7200.0))
    }

    fn pq_node() -> Node {
        Node::new("bus-2", PhaseSet::ABC, BusType::Pq, Volts(7200.0))
    }

    #[test]
    fn add_node_tracks_swing_index() {
        let mut g = PowerflowGraph::new();
        let s = g.add_node(swing_node());
        assert_eq!(g.swing_index().unwrap(), s);
    }

    #[test]
    fn add_branch_rejects_unknown_endpoint() {
        let mut g = PowerflowGraph::new();
        let s = g.add_node(swing_node());
        let branch = Branch {
            id: "line-1".into(),
            from: s,
            to: 99,
            kind: BranchKind::Overhead,
            status: BranchStatus::Closed,
            phases: PhaseSet::ABC,
            orig_phases: PhaseSet::ABC,
            fault_phases: PhaseSet::NONE,
            a: Matrix3::ZERO,
            b: Matrix3::ZERO,
            c: Matrix3::ZERO,
            d: Matrix3::ZERO,
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
        };
        let err = g.add_branch(branch).unwrap_err();
        assert!(matches!(err, PowerflowError::TopologyError(_)));
    }

    fn plain_branch(from: usize, to: usize) -> Branch {
        Branch {
            id: format!("line-{from}-{to}"),
            from,
            to,
            kind: BranchKind::Overhead,
            status: BranchStatus::Closed,
            phases: PhaseSet::ABC,
            orig_phases: PhaseSet::ABC,
            fault_phases: PhaseSet::NONE,
            a: Matrix3::identity(),
            b: Matrix3::ZERO,
            c: Matrix3::ZERO,
            d: Matrix3::identity(),
            y_from: Matrix3::ZERO,
            y_to: Matrix3::ZERO,
            y_s_from: Matrix3::ZERO,
            y_s_to: Matrix3::ZERO,
            v_ratio: 1.0,
            length_ft: 1000.0,
            tn: [Complex64::new(-0.5, 0.0); 2],
            protect_locations: [None; 3],
            current_from: [Complex64::new(0.0, 0.0); 3],
            current_to: [Complex64::new(0.0, 0.0); 3],
            mean_repair_time_s: 0.0,
            reclose_attempts: 0,
            fault_locked: PhaseSet::NONE,
        }
    }

    #[test]
    fn validate_clamps_negative_mean_repair_time() {
        let mut g = PowerflowGraph::new();
        let swing = g.add_node(swing_node());
        let far = g.add_node(pq_node());
        let mut branch = plain_branch(swing, far);
        branch.mean_repair_time_s = -3600.0;
        let idx = g.add_branch(branch).unwrap();
        let mut diag = Diagnostics::new();
        g.validate(&mut diag).unwrap();
        assert_eq!(g.branches[idx].mean_repair_time_s, 0.0);
        assert!(diag.has_issues());
    }

    #[test]
    fn validate_rejects_two_swings() {
        let mut g = PowerflowGraph::new();
        g.add_node(swing_node());
        g.add_node(swing_node());
        let mut diag = Diagnostics::new();
        let err = g.validate(&mut diag).unwrap_err();
        assert!(matches!(err, PowerflowError::TopologyError(_)));
    }

    #[test]
    fn phase_transition_snapshots_and_restores_voltage() {
        let mut n = pq_node();
        let original = n.v;
        n.phases = PhaseSet::new(gat_core::phase::PHASE_A | gat_core::phase::PHASE_B).unwrap();
        n.reconcile_phase_transition();
        assert_eq!(n.v[2], Complex64::new(0.0, 0.0));
        n.phases = PhaseSet::ABC;
        n.reconcile_phase_transition();
        assert_eq!(n.v[2], original[2]);
    }
}
