pub mod activation;
pub mod installer;
pub mod manager;
pub mod manifest;
pub mod runner;

pub use manager::PluginManager;
