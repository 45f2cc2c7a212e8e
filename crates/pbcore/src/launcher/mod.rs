//! Starting and supervising the Pitboss server process.

pub mod process;
