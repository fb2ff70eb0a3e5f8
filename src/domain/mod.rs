// Domain layer: models, value domains and ports. No I/O here.

pub mod issue;
pub mod model;
pub mod ports;
pub mod taxonomy;
