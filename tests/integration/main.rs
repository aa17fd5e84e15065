// tests/integration/main.rs
#[path = "../common/mod.rs"]
mod common;

mod backup_codes;
mod login_flow;
mod storage;
