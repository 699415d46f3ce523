//! Drone Key Vault Secrets
//!
//! A Drone CI secret plugin that resolves build secrets out of Azure Key Vault,
//! gated by allow-lists stored as reserved entries in the vault itself.

pub mod config;
pub mod error;
pub mod resolver;
pub mod server;
pub mod store;
