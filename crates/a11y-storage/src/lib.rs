mod error;
mod memory;
mod retry;
mod traits;

pub use error::*;
pub use memory::*;
pub use retry::*;
pub use traits::*;
