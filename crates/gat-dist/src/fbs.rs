//! Forward-Back Sweep solver (§4.5): solve a strictly radial network
//! with one SWING source by alternating bottom-up current accumulation
//! and top-down voltage updates.
//!
//! Grounded on `node.cpp`/`link.cpp`'s `sync`/`postsync` pair, flattened
//! here into two explicit passes over [`PowerflowGraph`] driven by
//! topological rank rather than the reference's scheduler callbacks
//! (§5 ordering guarantees: leaves-first `sync`, SWING-first `postsync`).

use gat_core::linalg;
use gat_core::{PowerflowError, PowerflowResult};
use num_complex::Complex64;

use crate::topology::{BusType, PowerflowGraph};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FbsStatus {
    Converged { iterations: usize },
    NotConverged,
}

#[derive(Debug, Clone)]
pub struct FbsConfig {
    pub max_iterations: usize,
}

impl Default for FbsConfig {
    fn default() -> Self {
        Self { max_iterations: 50 }
    }
}

/// A branch's order from leaves to SWING, used to drive the two passes
/// without needing the host scheduler's rank numbers (§5). Computed once
/// per topology by a BFS from the SWING bus.
pub fn topological_branch_order(graph: &PowerflowGraph) -> PowerflowResult<Vec<usize>> {
    let swing = graph.swing_index()?;
    let mut order = Vec::with_capacity(graph.branches.len());
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
                order.push(branch_idx);
                queue.push_back(other);
            }
        }
    }
    if order.len() != graph.branches.len() {
        return Err(PowerflowError::TopologyError(
            "network is not strictly radial and single-rooted at the SWING bus".into(),
        ));
    }
    Ok(order)
}

/// A zero-length branch substitutes its `to` node as a parent-sharing
/// child of `from` (§4.3): rather than solving a degenerate two-port with
/// no impedance, every other branch touching `to` is rewired onto `from`
/// and `to` tags along at whatever voltage `from` settles at. Mirrors
/// `gs.rs`'s `absorb_zero_length_lines`; each solver owns its own copy of
/// this policy rather than sharing one across FBS/GS/NR.
fn absorb_zero_length_lines(graph: &mut PowerflowGraph) -> PowerflowResult<()> {
    for branch_idx in 0..graph.branches.len() {
        if graph.branches[branch_idx].length_ft != 0.0 {
            continue;
        }
        let (from, to) = (graph.branches[branch_idx].from, graph.branches[branch_idx].to);
        if graph.nodes[from].parent.is_some() {
            return Err(PowerflowError::TopologyError(format!(
                "grandchild configuration rejected: {} is already a child node",
                graph.nodes[from].id
            )));
        }
        graph.nodes[to].parent = Some(from);

        let to_links: Vec<usize> = graph.adjacency[to].iter().copied().filter(|&b| b != branch_idx).collect();
        for &other_branch in &to_links {
            let branch = &mut graph.branches[other_branch];
            if branch.from == to {
                branch.from = from;
            }
            if branch.to == to {
                branch.to = from;
            }
            graph.adjacency[from].push(other_branch);
        }
    }
    Ok(())
}

/// Run FBS to convergence or to `config.max_iterations`.
pub fn solve(graph: &mut PowerflowGraph, config: &FbsConfig) -> PowerflowResult<FbsStatus> {
    absorb_zero_length_lines(graph)?;
    let order = topological_branch_order(graph)?;
    let mut last_voltage: Vec<[Complex64; 3]> = graph.nodes.iter().map(|n| n.v).collect();

    for iter in 0..config.max_iterations {
        sync_pass(graph, &order);
        postsync_pass(graph, &order);

        let mut max_delta = 0.0f64;
        for (i, node) in graph.nodes.iter().enumerate() {
            let delta: f64 = (0..3).map(|p| (node.v[p] - last_voltage[i][p]).norm()).sum();
            max_delta = max_delta.max(delta);
            last_voltage[i] = node.v;
        }

        let tol = graph
            .nodes
            .iter()
            .map(|n| n.maximum_voltage_error)
            .fold(f64::INFINITY, f64::min);
        if max_delta < tol {
            return Ok(FbsStatus::Converged { iterations: iter + 1 });
        }
    }
    Ok(FbsStatus::NotConverged)
}

/// Bottom-up pass (§4.5): for each branch, leaves toward SWING,
/// accumulate `I_from = c*V_to + d*I_to_inj`, folding in each node's
/// wye/delta/split-phase load currents.
fn sync_pass(graph: &mut PowerflowGraph, order: &[usize]) {
    let mut injection: Vec<[Complex64; 3]> = vec![[Complex64::new(0.0, 0.0); 3]; graph.nodes.len()];

    for &branch_idx in order.iter().rev() {
        let branch = &graph.branches[branch_idx];
        let to = branch.to;
        let from = branch.from;

        if !graph.nodes[from].has_source {
            graph.nodes[to].has_source = false;
        }

        let node_current = node_injection_current(graph, to, branch.tn);
        for p in 0..3 {
            injection[to][p] += node_current[p];
        }

        let i_to_inj = injection[to];
        let v_to = graph.nodes[to].v;
        let i_from = linalg::multiply_3x1(&branch.c, &v_to);
        let d_term = linalg::multiply_3x1(&branch.d, &i_to_inj);
        let mut total = [Complex64::new(0.0, 0.0); 3];
        for p in 0..3 {
            total[p] = i_from[p] + d_term[p];
            injection[from][p] += total[p];
        }
    }
}

/// Compute a node's wye/delta/split-phase load current injection (§4.5).
/// `tn` is the feeding branch's triplex neutral-current split, used only
/// when the node itself is split-phase.
fn node_injection_current(graph: &PowerflowGraph, node_idx: usize, tn: [Complex64; 2]) -> [Complex64; 3] {
    let node = &graph.nodes[node_idx];
    let mut i = [Complex64::new(0.0, 0.0); 3];

    if node.phases.is_delta() {
        let mut i_line = [Complex64::new(0.0, 0.0); 3];
        let mut i_delta = [Complex64::new(0.0, 0.0); 3];
        for k in 0..3 {
            i_delta[k] = wye_current(node, k);
        }
        // Delta -> line current transform: I_A = I_AB - I_CA, etc.
        i_line[0] = i_delta[0] - i_delta[2];
        i_line[1] = i_delta[1] - i_delta[0];
        i_line[2] = i_delta[2] - i_delta[1];
        i = i_line;
    } else {
        for k in 0..3 {
            i[k] = wye_current(node, k);
        }
    }

    if node.is_split_phase() {
        i[2] = tn[0] * i[0] + tn[1] * i[1];
    }

    i
}

fn wye_current(node: &crate::topology::Node, k: usize) -> Complex64 {
    if node.v[k].norm() == 0.0 {
        return Complex64::new(0.0, 0.0);
    }
    (node.s[k] / node.v[k]).conj() + node.v[k] * node.y[k] + node.i_const[k]
}

/// Top-down pass (§4.5): `V_to = A*V_from - B*I_to_inj`.
fn postsync_pass(graph: &mut PowerflowGraph, order: &[usize]) {
    let mut injection: Vec<[Complex64; 3]> = vec![[Complex64::new(0.0, 0.0); 3]; graph.nodes.len()];
    for &branch_idx in order {
        let branch = &graph.branches[branch_idx];
        let to = branch.to;
        let node_current = node_injection_current(graph, to, branch.tn);
        injection[to] = node_current;
    }

    for &branch_idx in order {
        let branch = graph.branches[branch_idx].clone();
        let from = branch.from;
        let to = branch.to;

        if !graph.nodes[from].has_source {
            for p in 0..3 {
                graph.nodes[to].v[p] = Complex64::new(0.0, 0.0);
            }
            graph.nodes[to].has_source = false;
            continue;
        }

        let v_from = graph.nodes[from].v;
        let a_term = linalg::multiply_3x1(&branch.a, &v_from);
        let b_term = linalg::multiply_3x1(&branch.b, &injection[to]);
        let mut v_to = [Complex64::new(0.0, 0.0); 3];
        for p in 0..3 {
            v_to[p] = a_term[p] - b_term[p];
        }
        graph.nodes[to].v = v_to;
        graph.nodes[to].has_source = true;
    }
}
