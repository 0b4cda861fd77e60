//! sbx-storage: OpenDAL storage abstraction for chunk objects

pub mod health;
pub mod operator;

pub use health::check_health;
pub use operator::{build_operator, memory_operator};
