// tests/integration/storage/mod.rs
mod encrypted_store_tests;
