//! Keyed exam and participation tables.

use std::collections::BTreeMap;

use agora_types::ExamId;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::exam::{Exam, ExamDraft};
use crate::RecordsError;

/// Exam records and per-exam participation values. Writes are upserts.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ExamStore {
    exams: BTreeMap<ExamId, Exam>,
    participation: BTreeMap<ExamId, u64>,
}

impl ExamStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate `draft` and store it at `id`, returning the exam it replaced.
    pub fn insert_exam(
        &mut self,
        id: ExamId,
        draft: ExamDraft,
    ) -> Result<Option<Exam>, RecordsError> {
        let exam = Exam::try_from(draft)?;
        let previous = self.exams.insert(id, exam);
        debug!(%id, replaced = previous.is_some(), "exam stored");
        Ok(previous)
    }

    pub fn get_exam(&self, id: ExamId) -> Option<&Exam> {
        self.exams.get(&id)
    }

    pub fn insert_participation(&mut self, id: ExamId, value: u64) -> Option<u64> {
        self.participation.insert(id, value)
    }

    pub fn get_participation(&self, id: ExamId) -> Option<u64> {
        self.participation.get(&id).copied()
    }

    pub fn exam_count(&self) -> u64 {
        self.exams.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(out_of: u32) -> ExamDraft {
        ExamDraft {
            out_of,
            course: "X".into(),
            curve: 0,
        }
    }

    #[test]
    fn out_of_range_is_rejected_before_write() {
        let mut store = ExamStore::new();
        let id = ExamId::new(1);
        store.insert_exam(id, draft(100)).unwrap();

        let err = store.insert_exam(id, draft(256)).unwrap_err();
        assert!(matches!(err, RecordsError::OutOfRange { field: "out_of", .. }));
        assert_eq!(store.get_exam(id).unwrap().out_of, 100);
    }

    #[test]
    fn insert_returns_previous() {
        let mut store = ExamStore::new();
        let id = ExamId::new(1);
        assert_eq!(store.insert_exam(id, draft(255)).unwrap(), None);
        let previous = store.insert_exam(id, draft(50)).unwrap().unwrap();
        assert_eq!(previous.out_of, 255);
        assert_eq!(store.exam_count(), 1);
    }

    #[test]
    fn participation_upserts() {
        let mut store = ExamStore::new();
        let id = ExamId::new(9);
        assert_eq!(store.get_participation(id), None);
        assert_eq!(store.insert_participation(id, 70), None);
        assert_eq!(store.insert_participation(id, 85), Some(70));
        assert_eq!(store.get_participation(id), Some(85));
    }

    #[test]
    fn store_survives_bincode_snapshot() {
        let mut store = ExamStore::new();
        store.insert_exam(ExamId::new(2), draft(30)).unwrap();
        store.insert_participation(ExamId::new(2), 12);

        let bytes = bincode::serialize(&store).unwrap();
        let restored: ExamStore = bincode::deserialize(&bytes).unwrap();
        assert_eq!(restored.get_exam(ExamId::new(2)), store.get_exam(ExamId::new(2)));
        assert_eq!(restored.get_participation(ExamId::new(2)), Some(12));
    }
}
