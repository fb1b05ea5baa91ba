/*
[INPUT]:  Connector, chain, and identity vocabulary
[OUTPUT]: Typed Rust structs/enums with serialization support
[POS]:    Data layer - type definitions shared across the crate
[UPDATE]: When new shared types are added
*/

pub mod chain;
pub mod enums;
pub mod events;
pub mod user;

pub use chain::*;
pub use enums::*;
pub use events::*;
pub use user::*;
