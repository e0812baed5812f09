pub mod format;
pub mod upload;

pub use format::*;
pub use upload::*;
