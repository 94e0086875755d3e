pub mod power;
pub mod resolver;
pub mod union_find;

pub use power::{is_power_name, leaf_name, rail_voltage};
pub use resolver::{resolve, Resolution};
pub use union_find::UnionFind;
