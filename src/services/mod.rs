pub mod duplicate_guard;
pub mod gateway;
pub mod verification;
pub mod webhook;
