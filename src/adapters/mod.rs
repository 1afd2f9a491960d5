// Adapters layer: concrete implementations of the domain ports.

pub mod docker;
pub mod probe;
pub mod process;
