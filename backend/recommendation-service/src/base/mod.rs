pub mod index;
pub mod linalg;
pub mod parallel;
pub mod random;
pub mod shared;

pub use index::{DirectIndex, Index, MapIndex};
pub use parallel::{batch_parallel, parallel};
pub use random::RandomGenerator;
pub use shared::{AtomicF32, SharedMatrix, SharedVector};
