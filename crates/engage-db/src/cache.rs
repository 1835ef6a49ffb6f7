//! Course start dates shared across course workers.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use chrono::NaiveDate;
use engage_core::CourseId;

/// Read-mostly map from course to its recorded start date.
///
/// Entries are never evicted. Each course is loaded by at most the one
/// worker computing it, so concurrent loads of the same key do not occur in
/// practice; if they did, both would store the same date.
#[derive(Debug, Default)]
pub struct CourseStartCache {
    starts: RwLock<HashMap<CourseId, NaiveDate>>,
}

impl CourseStartCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, course: &CourseId) -> Option<NaiveDate> {
        self.starts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(course)
            .copied()
    }

    pub fn insert(&self, course: CourseId, start: NaiveDate) {
        self.starts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(course, start);
    }

    /// Returns the cached start, or runs `load` and caches its result.
    ///
    /// Failed loads are not cached.
    pub fn get_or_try_load<E>(
        &self,
        course: &CourseId,
        load: impl FnOnce() -> Result<NaiveDate, E>,
    ) -> Result<NaiveDate, E> {
        if let Some(start) = self.get(course) {
            return Ok(start);
        }
        let start = load()?;
        self.insert(course.clone(), start);
        Ok(start)
    }

    pub fn len(&self) -> usize {
        self.starts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FromIterator<(CourseId, NaiveDate)> for CourseStartCache {
    fn from_iter<I: IntoIterator<Item = (CourseId, NaiveDate)>>(entries: I) -> Self {
        Self {
            starts: RwLock::new(entries.into_iter().collect()),
        }
    }
}
