//! Time-space diagram recording for a single process.
//!
//! Each local event appends the serialized clock to the process line; each
//! receive adds an edge from the sender's clock to the receiver's clock right
//! after its tick. [`TimeSpaceTrace::write_subgraph`] emits the result as a
//! Graphviz `subgraph` so the dumps of every process can be concatenated
//! into one `digraph`.

use crate::identifiers::PeerId;
use std::io::{self, Write};

/// Recorded states and message edges of one process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimeSpaceTrace {
    states: Vec<String>,
    edges: Vec<(String, String)>,
}

impl TimeSpaceTrace {
    /// Append a process state
    pub fn record_state(&mut self, state: String) {
        self.states.push(state);
    }

    /// Append a message edge `from -> to`
    pub fn record_edge(&mut self, from: String, to: String) {
        self.edges.push((from, to));
    }

    /// Process states in event order
    pub fn states(&self) -> &[String] {
        &self.states
    }

    /// Message edges in receive order
    pub fn edges(&self) -> &[(String, String)] {
        &self.edges
    }

    /// Write the trace as a Graphviz subgraph labelled with `owner`.
    pub fn write_subgraph<W: Write>(&self, owner: &PeerId, writer: &mut W) -> io::Result<()> {
        writeln!(writer, "subgraph c_{owner} {{")?;
        writeln!(writer, "  label = \"P#{owner}\"")?;
        let line = self
            .states
            .iter()
            .map(|state| format!("\"{state}\""))
            .collect::<Vec<_>>()
            .join(" -> ");
        writeln!(writer, "{line};")?;
        writeln!(writer, "}}")?;
        for (from, to) in &self.edges {
            writeln!(writer, "\"{from}\" -> \"{to}\";")?;
        }
        Ok(())
    }
}
