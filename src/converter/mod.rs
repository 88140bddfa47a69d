//! Spec generation and package building

mod builder;
pub mod spec;
pub mod staging;

pub use builder::*;
pub use spec::{FileEntry, SpecBuilder, SpecModel};
pub use staging::StagedLayout;
