//! Scan executor: runs one tool against one page, persists the raw result and
//! folds the findings into per-criterion verdicts.

mod adapter;
mod error;
mod executor;
mod fixture;
pub mod normalize;

pub use adapter::*;
pub use error::*;
pub use executor::*;
pub use fixture::*;
pub use normalize::{NormalizedResult, NormalizedViolation, NormalizerRegistry, ResultNormalizer};
