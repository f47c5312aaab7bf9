pub mod client;
pub mod host_methods;
pub mod message;
pub mod server;
pub mod service_base;

pub use client::IpcClient;
pub use message::{IpcEnvelope, IpcErrorBody, IpcErrorCode};
pub use server::IpcServer;
