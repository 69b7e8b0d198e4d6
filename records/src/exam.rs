//! Exam records.

use serde::{Deserialize, Serialize};

use crate::RecordsError;

/// Longest course name, in bytes, that fits a stored record.
pub const MAX_COURSE_LEN: usize = 96;

/// Exam fields as submitted by a caller. Numbers are wider than their stored
/// form so out-of-range input can be reported instead of truncated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExamDraft {
    pub out_of: u32,
    pub course: String,
    pub curve: u32,
}

impl ExamDraft {
    pub fn new(out_of: u32, course: impl Into<String>, curve: u32) -> Self {
        Self {
            out_of,
            course: course.into(),
            curve,
        }
    }
}

/// A stored exam.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exam {
    pub out_of: u8,
    pub course: String,
    pub curve: u8,
}

fn narrow(field: &'static str, value: u32) -> Result<u8, RecordsError> {
    u8::try_from(value).map_err(|_| RecordsError::OutOfRange {
        field,
        value: u64::from(value),
        max: u64::from(u8::MAX),
    })
}

impl TryFrom<ExamDraft> for Exam {
    type Error = RecordsError;

    fn try_from(draft: ExamDraft) -> Result<Self, Self::Error> {
        let out_of = narrow("out_of", draft.out_of)?;
        let curve = narrow("curve", draft.curve)?;
        if draft.course.len() > MAX_COURSE_LEN {
            return Err(RecordsError::OutOfRange {
                field: "course",
                value: draft.course.len() as u64,
                max: MAX_COURSE_LEN as u64,
            });
        }
        Ok(Self {
            out_of,
            course: draft.course,
            curve,
        })
    }
}

impl From<Exam> for ExamDraft {
    fn from(exam: Exam) -> Self {
        Self {
            out_of: exam.out_of.into(),
            course: exam.course,
            curve: exam.curve.into(),
        }
    }
}
