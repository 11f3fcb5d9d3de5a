pub mod branch;

pub use branch::SourceBranch;
