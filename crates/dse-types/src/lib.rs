pub mod config;
pub mod errors;
pub mod knobs;
pub mod trial;

pub use config::*;
pub use errors::*;
pub use knobs::*;
pub use trial::*;
