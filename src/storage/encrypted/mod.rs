// src/storage/encrypted/mod.rs
mod cipher;
mod errors;
mod store;

pub use errors::StorageError;
pub use store::EncryptedStore;
