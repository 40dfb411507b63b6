mod msg;
pub use msg::*;

mod wrapper;
pub use wrapper::*;
