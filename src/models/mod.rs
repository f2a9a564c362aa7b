pub mod audit;
pub mod permission;
pub mod user;
