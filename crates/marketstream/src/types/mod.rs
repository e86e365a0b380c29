/*
[INPUT]:  Exchange schema definitions and serde requirements
[OUTPUT]: Typed Rust structs/enums for instruments and stream events
[POS]:    Data layer - type definitions shared by every module
[UPDATE]: When event shapes change or new types added
*/

pub mod enums;
pub mod models;
pub(crate) mod serde_helpers;

pub use enums::*;
pub use models::*;
