// src/core/mod.rs
pub mod audit;
pub mod biometrics;
pub mod crypto;
pub mod identity;
pub mod services;
