//! Various utilities

pub mod align;
pub mod cache;
pub mod deferred_delete;
pub mod upload;

pub(crate) mod string;
