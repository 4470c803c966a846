pub mod commits;
pub mod config;
pub mod run;
pub mod schema;
