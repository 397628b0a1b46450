pub mod common;
pub mod device;
pub mod notification;
pub mod user;
