//! Schema module - Value model, test cases, configuration and report types.

mod config;
mod error;
mod evolution;
mod test_case;
mod value;

pub use config::*;
pub use error::*;
pub use evolution::*;
pub use test_case::*;
pub use value::*;
