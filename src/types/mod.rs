pub mod dataset;
pub mod date_range;
pub mod observation;
pub mod query;
