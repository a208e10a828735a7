pub mod bounded;
pub mod error_classifier;

pub use bounded::*;
pub use error_classifier::*;
