pub mod auth;
pub mod core;
pub mod grades;
pub mod roster;
