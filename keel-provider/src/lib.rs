//! keel provider: the remote API clients, the resource kinds built on
//! `keel_engine`, and the file-based host that drives them.

pub mod clients;
pub mod host;
pub mod resources;
