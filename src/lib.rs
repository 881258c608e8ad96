pub mod config;
pub mod metadata;
pub mod pipeline;
pub mod scan;
