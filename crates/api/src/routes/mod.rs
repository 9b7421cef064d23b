//! Control API routes

pub mod control;
pub mod settings;
pub mod status;
