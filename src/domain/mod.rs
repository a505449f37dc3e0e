// Domain layer: claim models and the ports the sync engine talks through.

pub mod model;
pub mod ports;
