pub mod condition;
pub mod domain;
pub mod error;
pub mod form;
pub mod ordering;
pub mod protocol;
