pub mod ids;
pub mod model;
pub mod progress;
pub mod reconcile;
pub mod time;
pub mod types;

pub use ids::*;
pub use model::*;
pub use progress::*;
pub use reconcile::*;
pub use time::*;
pub use types::*;
