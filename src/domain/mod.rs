// Domain layer: core models and ports (interfaces) the services are generic over.

pub mod model;
pub mod ports;
