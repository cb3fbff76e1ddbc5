pub mod fields;
pub mod reviews;
pub mod specs;
