//! Quantified invariants and round-trip laws (§8) exercised against small
//! hand-built topologies and line configurations.

use gat_core::linalg::Matrix3;
use gat_core::units::{Feet, Hertz, OhmMeters, OhmsPerMile, Volts};
use gat_core::{Diagnostics, PhaseSet};
use gat_dist::conductor::{LineConfiguration, LineConfigurationKind, LineSpacing, OverheadConductor};
use gat_dist::fault::{self, FaultCategory, FaultKind, FaultPhases};
use gat_dist::fbs::{self, FbsConfig};
use gat_dist::linemat::LineMatrixBuilder;
use gat_dist::topology::{Branch, BranchKind, BranchStatus, BusType, Node, NodeKind, PowerflowGraph};
use gat_dist::transformer::{self, ConnectionType};
use num_complex::Complex64;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn overhead_branch(id: &str, from: usize, to: usize, z: Complex64) -> Branch {
    let mut zmat = Matrix3::ZERO;
    for i in 0..3 {
        zmat.set(i, i, z);
    }
    Branch {
        id: id.into(),
        from,
        to,
        kind: BranchKind::Overhead,
        status: BranchStatus::Closed,
        phases: PhaseSet::ABC,
        orig_phases: PhaseSet::ABC,
        fault_phases: PhaseSet::NONE,
        a: Matrix3::identity(),
        b: zmat,
        c: Matrix3::ZERO,
        d: Matrix3::identity(),
        y_from: Matrix3::ZERO,
        y_to: Matrix3::ZERO,
        y_s_from: Matrix3::ZERO,
        y_s_to: Matrix3::ZERO,
        v_ratio: 1.0,
        length_ft: 2000.0,
        tn: [Complex64::new(-0.5, 0.0); 2],
        protect_locations: [None; 3],
        current_from: [Complex64::new(0.0, 0.0); 3],
        current_to: [Complex64::new(0.0, 0.0); 3],
        mean_repair_time_s: 0.0,
        reclose_attempts: 0,
        fault_locked: PhaseSet::NONE,
    }
}

fn single_phase_a_conductor() -> OverheadConductor {
    OverheadConductor {
        resistance: OhmsPerMile(0.306),
        geometric_mean_radius: Feet(0.0244),
        diameter_in: 0.721,
        summer_continuous_amps: 530.0,
        summer_emergency_amps: 670.0,
        winter_continuous_amps: 560.0,
        winter_emergency_amps: 730.0,
    }
}

/// P3/B2: a single-phase line (only phase A wired) must populate only the
/// (0,0) entry of Z_abc; every other entry, including the (0,0)-adjacent
/// off-diagonals, stays exactly zero since there is no other conductor to
/// couple against.
#[test]
fn p3_b2_single_phase_line_only_populates_its_diagonal() {
    let spacing = LineSpacing {
        distance_ft: [[0.0; 4]; 4],
        height_above_earth_ft: [30.0, 30.0, 30.0, 30.0],
    };
    let config = LineConfiguration {
        id: "single-phase-a".into(),
        kind: LineConfigurationKind::Overhead {
            conductors: [Some(single_phase_a_conductor()), None, None, None],
            spacing,
        },
    };
    let builder = LineMatrixBuilder {
        frequency: Hertz(60.0),
        earth_resistivity: OhmMeters(100.0),
        use_line_capacitance: false,
    };
    let mut diagnostics = Diagnostics::new();
    let phases = PhaseSet::new(gat_core::phase::PHASE_A).unwrap();
    let matrices = builder.build("single-phase-a", &config, Feet(2000.0), phases, &mut diagnostics).unwrap();

    assert_ne!(matrices.z_abc.get(0, 0), Complex64::new(0.0, 0.0));
    for i in 0..3 {
        for j in 0..3 {
            if (i, j) != (0, 0) {
                assert_eq!(matrices.z_abc.get(i, j), Complex64::new(0.0, 0.0));
            }
        }
    }
}

/// P3: a branch missing a phase carries exactly zero current on that
/// phase in the FBS solver output, even when the branch feeds a balanced
/// three-phase load downstream (only the present phases can carry load).
#[test]
fn p3_absent_phase_carries_zero_current() {
    let mut g = PowerflowGraph::new();
    let two_phase = PhaseSet::new(gat_core::phase::PHASE_A | gat_core::phase::PHASE_B).unwrap();
    let swing = g.add_node(Node::new("swing", two_phase, BusType::Swing, Volts(7200.0)));
    let mut load = Node::new("bus-2", two_phase, BusType::Pq, Volts(7200.0));
    load.kind = NodeKind::Load;
    load.s[0] = Complex64::new(-50_000.0, -15_000.0);
    load.s[1] = Complex64::new(-50_000.0, -15_000.0);
    let load = g.add_node(load);

    let mut branch = overhead_branch("l1", swing, load, Complex64::new(0.3, 1.0));
    branch.phases = two_phase;
    branch.orig_phases = two_phase;
    g.add_branch(branch).unwrap();

    let status = fbs::solve(&mut g, &FbsConfig::default()).unwrap();
    assert!(matches!(status, fbs::FbsStatus::Converged { .. }));
    assert_eq!(g.branches[0].current_from[2], Complex64::new(0.0, 0.0));
    assert_eq!(g.branches[0].current_to[2], Complex64::new(0.0, 0.0));
}

/// P4/L1: applying and then clearing the same fault is the identity on
/// the branch's phase tables, and (with no other state change) restores
/// the pre-fault voltages to within the convergence tolerance once
/// re-solved.
#[test]
fn p4_l1_fault_on_then_off_is_identity() {
    let mut g = PowerflowGraph::new();
    let swing = g.add_node(Node::new("swing", PhaseSet::ABC, BusType::Swing, Volts(7200.0)));
    let mut load = Node::new("bus-2", PhaseSet::ABC, BusType::Pq, Volts(7200.0));
    load.kind = NodeKind::Load;
    for k in 0..3 {
        load.s[k] = Complex64::new(-30_000.0, -9_000.0);
    }
    let load = g.add_node(load);
    let branch_idx = g.add_branch(overhead_branch("l1", swing, load, Complex64::new(0.3, 1.0))).unwrap();

    fbs::solve(&mut g, &FbsConfig::default()).unwrap();
    let pre_fault_v = g.nodes[load].v;
    let pre_fault_phases = g.branches[branch_idx].phases;
    let pre_fault_orig = g.branches[branch_idx].orig_phases;

    let kind = FaultKind {
        label: "SLG-B".into(),
        category: FaultCategory::Slg,
        phases: FaultPhases::Explicit(PhaseSet::new(gat_core::phase::PHASE_B).unwrap()),
    };
    let mut rng = StdRng::seed_from_u64(11);
    let removed = fault::link_fault_on(&mut g, branch_idx, &kind, &mut rng).unwrap();
    assert_ne!(g.branches[branch_idx].phases, pre_fault_phases);

    fault::link_fault_off(&mut g, branch_idx, removed);
    assert_eq!(g.branches[branch_idx].phases, pre_fault_phases);
    assert_eq!(g.branches[branch_idx].orig_phases, pre_fault_orig);
    assert_eq!(g.branches[branch_idx].fault_phases, PhaseSet::NONE);
    assert_eq!(g.branches[branch_idx].protect_locations, [None; 3]);

    fbs::solve(&mut g, &FbsConfig::default()).unwrap();
    for p in 0..3 {
        assert!((g.nodes[load].v[p] - pre_fault_v[p]).norm() < 1e-6);
    }
}

/// L2: recomputing a line's ABCD matrices with unchanged configuration and
/// length yields bit-identical output (no hidden mutable state in the
/// builder).
#[test]
fn l2_line_matrix_rebuild_is_deterministic() {
    let spacing = LineSpacing {
        distance_ft: [[0.0, 2.5, 4.5, 5.0], [2.5, 0.0, 7.0, 4.272], [4.5, 7.0, 0.0, 5.656], [5.0, 4.272, 5.656, 0.0]],
        height_above_earth_ft: [28.0, 28.0, 28.0, 24.0],
    };
    let config = LineConfiguration {
        id: "overhead-abc".into(),
        kind: LineConfigurationKind::Overhead {
            conductors: [
                Some(single_phase_a_conductor()),
                Some(single_phase_a_conductor()),
                Some(single_phase_a_conductor()),
                Some(single_phase_a_conductor()),
            ],
            spacing,
        },
    };
    let builder = LineMatrixBuilder {
        frequency: Hertz(60.0),
        earth_resistivity: OhmMeters(100.0),
        use_line_capacitance: true,
    };

    let mut d1 = Diagnostics::new();
    let m1 = builder.build("overhead-abc", &config, Feet(2640.0), PhaseSet::ABC, &mut d1).unwrap();
    let mut d2 = Diagnostics::new();
    let m2 = builder.build("overhead-abc", &config, Feet(2640.0), PhaseSet::ABC, &mut d2).unwrap();

    for i in 0..3 {
        for j in 0..3 {
            assert_eq!(m1.z_abc.get(i, j), m2.z_abc.get(i, j));
            assert_eq!(m1.a.get(i, j), m2.a.get(i, j));
            assert_eq!(m1.b.get(i, j), m2.b.get(i, j));
        }
    }
}

/// B3: a Delta-grounded-Wye transformer only energizes its secondary when
/// all three primary phases are present; with a two-phase primary the
/// admittance derivation still runs (the builder doesn't reject it), but
/// the resulting Y_from/Y_to blocks are only nonzero for the wired pairs
/// and the missing phase's row/column stays zero.
#[test]
fn b3_delta_wye_only_energizes_with_full_primary() {
    let mut z = Matrix3::ZERO;
    for i in 0..3 {
        z.set(i, i, Complex64::new(0.01, 0.06));
    }
    let mut diagnostics = Diagnostics::new();

    let full = transformer::build_transformer(
        "xfmr-full",
        ConnectionType::DeltaGroundedWye,
        3.0,
        &z,
        PhaseSet::ABC,
        None,
        &mut diagnostics,
    )
    .unwrap();
    for i in 0..3 {
        assert_ne!(full.y_to.get(i, i), Complex64::new(0.0, 0.0));
    }

    let two_phase = PhaseSet::new(gat_core::phase::PHASE_A | gat_core::phase::PHASE_B).unwrap();
    let partial = transformer::build_transformer(
        "xfmr-partial",
        ConnectionType::DeltaGroundedWye,
        3.0,
        &z,
        two_phase,
        None,
        &mut diagnostics,
    )
    .unwrap();
    assert_eq!(partial.y_to.get(2, 2), Complex64::new(0.0, 0.0));
}
