pub mod edit;
pub mod export;
pub mod generate;
pub mod project;
