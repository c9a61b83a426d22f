pub mod circulation;
pub mod health;
pub mod metrics;
