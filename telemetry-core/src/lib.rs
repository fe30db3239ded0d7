// Pure telemetry derivation and wire types shared by the relay service and replay tools.

pub mod model;
pub mod packet;
pub mod session;
