pub mod clock;
pub mod config;
pub mod error;
pub mod log;
pub mod server;
pub mod utils;

pub use clock::{Clock, TimerHandle};
pub use config::Config;
pub use error::Error;
pub use server::Server;

pub type Result<T, E = Error> = std::result::Result<T, E>;
