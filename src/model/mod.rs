//! Core data model: the durable cursor, candidate messages and their parts,
//! and the search predicate.

pub mod cursor;
pub mod message;
pub mod predicate;

pub use cursor::Cursor;
pub use message::{CandidateMessage, Disposition, Part, PartRef};
pub use predicate::SearchPredicate;
