//! repliq server library: HTTP surface, SQL stores, job queue, and
//! background tasks. The `rq-server` binary wires these together.

pub mod http;
pub mod jobs;
pub mod state;
pub mod store;
pub mod tasks;
