//! Service layer

pub mod report;
