pub mod app;
pub mod classify;
pub mod commands;
pub mod context;
pub mod decode;
pub mod dispatch;
pub mod env;
pub mod features;
pub mod output;
pub mod replay;
pub mod runtime;
