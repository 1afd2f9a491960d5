// Domain layer: container definitions and the seams used to materialize them.

pub mod model;
pub mod ports;
