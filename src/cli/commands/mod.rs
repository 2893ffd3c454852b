pub mod chain;
pub mod health;
pub mod migrate;
pub mod notifications;
pub mod token;
