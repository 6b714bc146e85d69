//! Topology JSON export (§6): the `$schema`/`description`/`properties`
//! envelope a GIS/planning front end consumes, built from a solved
//! [`PowerflowGraph`].

use serde::Serialize;

use crate::topology::{BranchKind, BranchStatus, NodeKind, PowerflowGraph};

const PLACEHOLDER: f64 = 1e30;

#[derive(Debug, Serialize)]
pub struct TopologyDump {
    #[serde(rename = "$schema")]
    pub schema: String,
    pub description: String,
    pub properties: TopologyProperties,
}

#[derive(Debug, Serialize)]
pub struct TopologyProperties {
    pub generators: Vec<GeneratorEntry>,
    pub buses: Vec<BusEntry>,
    pub loads: Vec<LoadEntry>,
    pub lines: Vec<LineEntry>,
    pub line_codes: Vec<LineCodeEntry>,
}

#[derive(Debug, Serialize)]
pub struct GeneratorEntry {
    pub id: String,
    pub node_id: String,
    pub has_phase: [bool; 3],
}

#[derive(Debug, Serialize)]
pub struct BusEntry {
    pub id: String,
    pub min_voltage: f64,
    pub max_voltage: f64,
    pub ref_voltage: [f64; 3],
    pub has_phase: [bool; 3],
}

#[derive(Debug, Serialize)]
pub struct LoadEntry {
    pub id: String,
    pub node_id: String,
    pub has_phase: [bool; 3],
    pub is_critical: bool,
    pub max_real_phase: [f64; 3],
    pub max_reactive_phase: [f64; 3],
}

#[derive(Debug, Serialize)]
pub struct LineEntry {
    pub id: String,
    pub node1_id: String,
    pub node2_id: String,
    pub has_phase: [bool; 3],
    pub capacity: f64,
    pub length: f64,
    pub num_phases: u32,
    pub is_transformer: bool,
    pub line_code: String,
    pub construction_cost: f64,
    pub harden_cost: f64,
    pub switch_cost: f64,
    pub is_new: bool,
    pub can_harden: bool,
    pub can_add_switch: bool,
    pub has_switch: bool,
}

#[derive(Debug, Serialize)]
pub struct LineCodeEntry {
    pub line_code: String,
    pub num_phases: u32,
    pub rmatrix: [[f64; 3]; 3],
    pub xmatrix: [[f64; 3]; 3],
}

/// Dump-time options mirroring the CLI surface's per-unit/voltage-band
/// fields (§6).
#[derive(Debug, Clone)]
pub struct DumpOptions {
    pub min_node_voltage_pu: f64,
    pub max_node_voltage_pu: f64,
    pub system_base_va: f64,
    pub write_per_unit: bool,
}

impl Default for DumpOptions {
    fn default() -> Self {
        Self {
            min_node_voltage_pu: 0.95,
            max_node_voltage_pu: 1.05,
            system_base_va: 100_000_000.0,
            write_per_unit: false,
        }
    }
}

fn has_phase_array(bits: u8) -> [bool; 3] {
    [bits & 0b001 != 0, bits & 0b010 != 0, bits & 0b100 != 0]
}

/// Z_base = V_nom^2 / (system_base / 3), per §6's per-unit scaling rule.
fn z_base(nominal_voltage: f64, system_base_va: f64) -> f64 {
    nominal_voltage * nominal_voltage / (system_base_va / 3.0)
}

/// Build the topology JSON dump from a graph that has already been solved
/// (bus voltages populated) or at least validated (phases/impedances
/// populated).
pub fn dump_topology(graph: &PowerflowGraph, options: &DumpOptions) -> TopologyDump {
    let mut generators = Vec::new();
    let mut buses = Vec::new();
    let mut loads = Vec::new();

    for node in &graph.nodes {
        let has_phase = has_phase_array(node.phases.electrical_mask());
        buses.push(BusEntry {
            id: node.id.clone(),
            min_voltage: options.min_node_voltage_pu,
            max_voltage: options.max_node_voltage_pu,
            ref_voltage: [node.v[0].norm(), node.v[1].norm(), node.v[2].norm()],
            has_phase,
        });

        if node.bus_type == crate::topology::BusType::Swing {
            generators.push(GeneratorEntry {
                id: format!("{}-gen", node.id),
                node_id: node.id.clone(),
                has_phase,
            });
        }

        if matches!(node.kind, NodeKind::Load | NodeKind::Meter | NodeKind::TriplexNode | NodeKind::TriplexMeter) {
            let z = if options.write_per_unit {
                z_base(node.nominal_voltage.value(), options.system_base_va)
            } else {
                1.0
            };
            loads.push(LoadEntry {
                id: format!("{}-load", node.id),
                node_id: node.id.clone(),
                has_phase,
                is_critical: node.is_critical_load(),
                max_real_phase: [node.s[0].re / z, node.s[1].re / z, node.s[2].re / z],
                max_reactive_phase: [node.s[0].im / z, node.s[1].im / z, node.s[2].im / z],
            });
        }
    }

    let mut lines = Vec::new();
    let mut line_codes = Vec::new();
    for branch in &graph.branches {
        let is_transformer = matches!(branch.kind, BranchKind::Transformer | BranchKind::Regulator);
        let length = if is_transformer || branch.kind == BranchKind::Switch { 1.0 } else { branch.length_ft };
        let num_phases = branch.phases.count_electrical_phases();
        let line_code = format!("{}-code", branch.id);

        let z = if options.write_per_unit {
            z_base(graph.nodes[branch.from].nominal_voltage.value(), options.system_base_va)
        } else {
            1.0
        };
        let mut rmatrix = [[0.0; 3]; 3];
        let mut xmatrix = [[0.0; 3]; 3];
        for i in 0..3 {
            for j in 0..3 {
                let z_ij = branch.b.get(i, j) / z;
                rmatrix[i][j] = z_ij.re;
                xmatrix[i][j] = z_ij.im;
            }
        }
        line_codes.push(LineCodeEntry {
            line_code: line_code.clone(),
            num_phases,
            rmatrix,
            xmatrix,
        });

        lines.push(LineEntry {
            id: branch.id.clone(),
            node1_id: graph.nodes[branch.from].id.clone(),
            node2_id: graph.nodes[branch.to].id.clone(),
            has_phase: has_phase_array(branch.phases.electrical_mask()),
            capacity: PLACEHOLDER,
            length,
            num_phases,
            is_transformer,
            line_code,
            construction_cost: PLACEHOLDER,
            harden_cost: PLACEHOLDER,
            switch_cost: PLACEHOLDER,
            is_new: false,
            can_harden: !is_transformer,
            can_add_switch: branch.kind == BranchKind::Overhead || branch.kind == BranchKind::Underground,
            has_switch: branch.kind.is_protective_device() && branch.status == BranchStatus::Closed,
        });
    }

    TopologyDump {
        schema: "gat-dist/topology-dump/v1".to_string(),
        description: "Distribution feeder topology snapshot".to_string(),
        properties: TopologyProperties { generators, buses, loads, lines, line_codes },
    }
}
