pub mod api;
pub mod command;
pub mod config;
pub mod error;
pub mod html;
pub mod http_response;
pub mod network_probe;
pub mod platform;
pub mod services;
