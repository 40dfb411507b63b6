/// Process identifier within the closed group.
pub type Replica = usize;

mod msg;
pub use msg::*;

mod process;
pub use process::*;
