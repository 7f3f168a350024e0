//! Payment gateway implementations

pub mod moolre;

pub use moolre::{MoolreConfig, MoolreGateway};
