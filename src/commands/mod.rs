//! CLI commands implementation

pub mod check;
pub mod init;
pub mod leads;
pub mod position;
pub mod run;
pub mod status;

pub use check::*;
pub use init::*;
pub use leads::*;
pub use position::*;
pub use run::*;
pub use status::*;
