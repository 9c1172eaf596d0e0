//! Communication gateway: a request-framed TCP front end over the
//! satellite/ground-station registry, plus the matching typed client.

pub mod client;
pub mod protocol;
pub mod server;
