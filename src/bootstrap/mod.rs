mod refresher;
mod server;
mod shutdown;
mod state;

pub use refresher::CacheRefresher;
pub use server::Server;
pub use shutdown::{Shutdown, ShutdownState};
pub use state::Services;
