mod beb;

mod buffer;

mod crash;

mod deliver;

mod rb_state;
pub use rb_state::*;
