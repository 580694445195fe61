//! Detection probes for ports and processes.

pub mod port;
pub mod process;

pub use port::{NetPortProbe, PortProbe};
pub use process::{PgrepProcessProbe, ProcessMatch, ProcessProbe};
