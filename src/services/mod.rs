//! External collaborators behind typed service interfaces.

pub mod storage;
pub mod warehouse;
