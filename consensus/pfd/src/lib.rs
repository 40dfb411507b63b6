mod context;
pub use context::*;

mod msg;
pub use msg::*;

mod handlers;
pub use handlers::*;

mod protocol;
pub use protocol::*;

mod process;
