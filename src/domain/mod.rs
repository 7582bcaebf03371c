// Domain layer: panel identifiers, render options and the ports the engine drives.

pub mod model;
pub mod ports;
