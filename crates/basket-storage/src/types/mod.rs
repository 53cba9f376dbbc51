//! Type definitions for basket storage.

mod cart;
mod geo;
mod groups;
mod ids;
mod invitations;
mod profiles;

// Re-export all types from submodules
pub use cart::*;
pub use geo::*;
pub use groups::*;
pub use ids::*;
pub use invitations::*;
pub use profiles::*;
