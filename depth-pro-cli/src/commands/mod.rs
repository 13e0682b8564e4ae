pub mod preprocess;
pub mod summarize;
pub mod validate;
