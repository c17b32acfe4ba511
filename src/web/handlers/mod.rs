//! Web 路由处理器

pub mod api;

pub use api::*;
