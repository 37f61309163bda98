pub mod commands;
pub mod config;
pub mod db;
pub mod gateway;
pub mod reminders;
pub mod timeparse;
pub mod webhook;
