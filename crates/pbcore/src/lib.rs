//! Save selection and launch supervision for Civilization IV Pitboss servers.

pub mod autostart;
pub mod config;
pub mod games;
pub mod launcher;
pub mod paths;
pub mod savemeta;
pub mod saves;
pub mod select;
