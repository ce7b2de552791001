/// API route handlers

pub mod auth;
pub mod files;
pub mod gateway;
pub mod health;
pub mod notifications;
pub mod organizations;
pub mod projects;
pub mod search;
pub mod settings;
pub mod tasks;
pub mod users;
