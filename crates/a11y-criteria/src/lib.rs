//! Static WCAG knowledge: which tool rules map to which success criteria,
//! how each criterion is best tested, and what a manual check involves.
//!
//! Everything here is pure. Build one [`KnowledgeBase`] at startup and share
//! it by reference (`Arc<KnowledgeBase>`) with the rest of the system.

mod builtin;
mod catalogue;
mod kb;

pub use catalogue::*;
pub use kb::*;
