pub mod mock;
pub mod policy;
pub mod postgres;
