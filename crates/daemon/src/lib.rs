mod export;
mod fetch;
mod normalize;
mod registry;
mod scheduler;
mod store;
mod utils;

pub use export::*;
pub use fetch::*;
pub use normalize::*;
pub use registry::*;
pub use scheduler::*;
pub use store::*;
pub use utils::*;
