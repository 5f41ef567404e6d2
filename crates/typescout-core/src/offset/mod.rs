mod report;
mod signature;
mod table;

pub use report::*;
pub use signature::*;
pub use table::*;
