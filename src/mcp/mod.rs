

pub mod server;

pub use server::{PicosMcpServer, run_server};
