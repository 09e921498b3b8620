//! Decides which automated findings can stand on their own and turns the rest
//! into tracked review tasks.

mod decision;
mod engine;
mod notify;
mod procedure;

pub use decision::*;
pub use engine::*;
pub use notify::*;
pub use procedure::*;
