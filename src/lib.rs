pub mod config;
pub mod events;
pub mod models;
pub mod pipeline;
pub mod registry;
pub mod report;
pub mod resolver;
pub mod rpc;
pub mod session;
pub mod sources;
