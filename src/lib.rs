// Core infrastructure modules
pub mod core;
pub mod query;

// Workflows and domain modules
pub mod config;
pub mod entities;
pub mod guard;
pub mod validation;

#[cfg(test)]
pub mod test_utils;
