//! IPC server exposing the router's events to the page host

pub mod host;
pub mod protocol;
pub mod server;

pub use host::IpcHost;
pub use protocol::{
    parse_command, serialize_response, socket_path, Command, Response, PROTOCOL_VERSION,
    SOCKET_ENV,
};
pub use server::IpcServer;
