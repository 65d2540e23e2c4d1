mod auth;
mod constant_time;
mod error;
mod gate;
mod password;
mod routes;
mod token;
mod types;

pub use auth::*;
pub use constant_time::*;
pub use error::*;
pub use gate::*;
pub use password::*;
pub use routes::*;
pub use token::*;
pub use types::*;
