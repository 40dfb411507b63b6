mod init;

mod phase1;

mod phase2;

mod decide;

mod round_state;
pub use round_state::*;
