pub mod expenses;
pub mod listings;
pub mod statements;
