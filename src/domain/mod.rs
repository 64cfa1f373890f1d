pub mod command;
pub mod frame;
pub mod models;
pub mod peripheral;
pub mod settings;
