//! SeaORM entities

pub mod report;
