//! Database model module which contains all the database models used in the application. We use the module to communicate with the database, fetch and format data from the database.

pub mod core;
pub mod matches;
pub mod nutrition;
pub mod payment;
pub mod pdf;
pub mod report;
pub mod scoring;
pub mod stats;
pub mod util;
