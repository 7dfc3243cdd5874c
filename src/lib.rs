// Library for tests to access modules

pub mod aggregation_worker;
pub mod aggregators;
pub mod checkpoint;
pub mod clock;
pub mod config;
pub mod function;
pub mod models;
pub mod store;
pub mod version;
