pub mod database;
pub mod dispatch;
pub mod gateway;
pub mod resolver;
pub mod store;

#[cfg(test)]
pub mod testing;
