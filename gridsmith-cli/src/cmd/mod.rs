pub mod build;
pub mod correct;
pub mod simulate;
pub mod validate;
