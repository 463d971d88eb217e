pub mod error;
pub mod secrets;
pub mod types;

pub use error::{Error, Result};
pub use secrets::SecretStore;
pub use types::*;
