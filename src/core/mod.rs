

pub mod config;
pub mod error;

pub use config::PicosConfig;
pub use error::{PicosError, Result};
