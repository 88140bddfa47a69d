//! Data models shared by the pipeline stages

mod arch;
mod dependency;
mod icon;
mod metadata;
mod result;

pub use arch::*;
pub use dependency::*;
pub use icon::*;
pub use metadata::*;
pub use result::*;
