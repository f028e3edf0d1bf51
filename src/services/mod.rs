// src/services/mod.rs

pub mod clock;
pub mod engine;
pub mod free_pool;
pub mod selector;
pub mod timer;
