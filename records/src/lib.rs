//! Exam records and participation values.
//!
//! A plain keyed store. The only rule it enforces is that every field of an
//! exam fits its stored width, checked before anything is written.

pub mod error;
pub mod exam;
pub mod store;

pub use error::RecordsError;
pub use exam::{Exam, ExamDraft, MAX_COURSE_LEN};
pub use store::ExamStore;
