pub mod error;
pub(crate) mod lock_ext;
pub(crate) mod security;
pub mod time;
