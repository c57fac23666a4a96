//! Wiring of the components, either inside one process (`local`) or against
//! a node over HTTP (`http` for the client side, `server` for the node).

pub mod http;
pub mod local;
pub mod server;

#[cfg(test)]
mod tests;
