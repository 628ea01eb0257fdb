pub mod commands;
pub mod connection;
