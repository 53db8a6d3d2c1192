mod interface;
mod system;
mod wait;

pub use interface::*;
pub use system::*;
pub use wait::*;
