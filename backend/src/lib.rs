pub mod cache;
pub mod data;
pub mod error;
pub mod explain;
pub mod models;
pub mod pipeline;
pub mod prediction;
pub mod registry;
pub mod render;
pub mod routes;
pub mod storage;
pub mod training;
pub mod validation;
