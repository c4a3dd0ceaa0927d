pub mod anomalies;
pub mod attribution;
pub mod batch;
pub mod expenses;
pub mod fees;
pub mod lifecycle;
pub mod policy;
pub mod similarity;
pub mod statement_builder;
