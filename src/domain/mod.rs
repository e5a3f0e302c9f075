// Domain layer: core models and ports (interfaces) shared by core logic and adapters.

pub mod model;
pub mod ports;
