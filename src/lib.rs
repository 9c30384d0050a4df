pub mod cli_interface;
mod fs;
pub mod mkfs;
pub mod utils;
pub mod vfs;
pub use fs::*;
