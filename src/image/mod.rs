//! The OCI image fetch-and-unpack pipeline: reference parsing, a registry
//! client, and the `Pull` contract.

pub mod manifest;
pub mod pull;
pub mod reference;
pub mod registry;

pub use pull::{pull, PullError};
pub use reference::Reference;
