//! External JSON interfaces (§6): topology snapshots for GIS/planning
//! consumers and reliability-index dumps for the Monte-Carlo fault runner.

pub mod json_topology;
pub mod reliability;

pub use json_topology::{dump_topology, DumpOptions, TopologyDump};
pub use reliability::{dump_reliability, ReliabilityDump, ReliabilityIndices};
