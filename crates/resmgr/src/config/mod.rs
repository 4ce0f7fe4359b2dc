pub mod cli;
pub mod replay;

pub use cli::*;
pub use replay::*;
