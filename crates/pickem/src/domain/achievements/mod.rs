mod store;

pub use store::*;
