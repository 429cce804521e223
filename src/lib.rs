pub mod artifact;
pub mod clean;
pub mod table;
