mod context;
pub use context::*;

mod msg;
pub use msg::*;

mod client;
pub use client::*;

mod protocol;
pub use protocol::*;

mod process;
