pub mod agb;
pub mod compiler;
pub mod error;
pub mod midi;

pub use compiler::{Compiler, Settings};
pub use error::Error;
