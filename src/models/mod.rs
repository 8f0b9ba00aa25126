pub mod location;
pub mod package;
pub mod transaction;
pub mod user;
