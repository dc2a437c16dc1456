//! Shared data model, configuration and Redis key layout for the CodeCraft judge.

pub mod config;
pub mod redis;
pub mod types;
