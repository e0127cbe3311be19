pub mod config;
pub mod encoder;
pub mod evaluation;
pub mod model;
