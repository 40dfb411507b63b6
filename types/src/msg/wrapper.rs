use std::fmt::Debug;

use serde::{Deserialize, Serialize};

use crate::Replica;

/// Outermost envelope on the wire: a protocol message tagged with the id of
/// the process that sent this copy. Under the crash-stop model processes never
/// impersonate each other, so the envelope carries no authenticator.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WrapperMsg<T: Debug + Serialize + Clone> {
    pub protmsg: T,
    pub sender: Replica,
}

impl<T: Debug + Serialize + Clone> WrapperMsg<T> {
    pub fn new(msg: T, sender: Replica) -> Self {
        Self {
            protmsg: msg,
            sender,
        }
    }
}

