pub mod auth;
pub mod cache;
pub mod client;
pub mod logs;

pub use client::K8sClient;
