//! Backend analyses and transformations over the petrel IR.

pub mod arch;
pub mod bitset;
pub mod height;
pub mod matching;
pub mod optim;
pub mod schedule;

pub use arch::{AbiEnv, ArchEnv, RegClass};
pub use height::Heights;
pub use optim::funccall::{optimize_funccalls, FunccallStats};
pub use schedule::rss::{register_saturation, schedule_preparation};
