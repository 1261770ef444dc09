//! Protocol families. Each one supplies drivers, factory delegates and the
//! catalog entries needed to hydrate its entities.

pub mod local;

pub use local::{register_local_protocol, LocalConnectorDelegate, LocalGroupDelegate, LocalTransport, LOCAL_PROTOCOL};
