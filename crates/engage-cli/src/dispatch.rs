//! Parallel computation across courses.
//!
//! Courses run on a dedicated, bounded `rayon` pool. One course failing does
//! not stop the others; the outcome lists both.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::thread;

use engage_core::CourseId;
use engage_db::CourseStartCache;
use rayon::ThreadPoolBuildError;
use rayon::prelude::*;
use thiserror::Error;

use crate::pipeline::{self, CourseOutput, WorkerParams};
use crate::writer::{self, COMBINED_STEM, PartialWriteError, TablePaths};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("failed to start worker pool")]
    Pool(#[from] ThreadPoolBuildError),
    #[error("failed to combine course tables")]
    Combine(#[from] PartialWriteError),
}

/// A course that could not be computed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedCourse {
    pub course: CourseId,
    pub error: String,
}

/// Results of a multi-course run, ordered by course ID.
#[derive(Debug, Default)]
pub struct DispatchOutcome {
    pub courses: Vec<CourseOutput>,
    pub failed: Vec<FailedCourse>,
    /// Tables merged across courses; present when more than one course was
    /// requested and at least one succeeded.
    pub combined: Option<TablePaths>,
}

impl DispatchOutcome {
    pub fn all_failed(&self) -> bool {
        self.courses.is_empty() && !self.failed.is_empty()
    }
}

/// Two thirds of the available cores, rounded up.
pub fn default_workers() -> usize {
    let cores = thread::available_parallelism().map_or(1, NonZeroUsize::get);
    (cores * 2).div_ceil(3)
}

/// Pairs each course with its file stem.
///
/// A course whose stem is already taken, by an earlier course or by the
/// combined tables, is failed rather than allowed to overwrite those files.
fn claim_stems(
    courses: Vec<CourseId>,
    stem_of: impl Fn(&CourseId) -> String,
) -> (Vec<(CourseId, String)>, Vec<FailedCourse>) {
    let mut owners: HashMap<String, CourseId> = HashMap::new();
    let mut claimed = Vec::with_capacity(courses.len());
    let mut rejected = Vec::new();
    for course in courses {
        let stem = stem_of(&course);
        let error = if stem == COMBINED_STEM {
            Some(format!("output name {stem} is reserved for the combined tables"))
        } else {
            owners
                .get(&stem)
                .map(|owner| format!("output name {stem} already used by course {owner}"))
        };
        match error {
            Some(error) => {
                tracing::warn!(course = %course, %error, "course rejected");
                rejected.push(FailedCourse { course, error });
            }
            None => {
                owners.insert(stem.clone(), course.clone());
                claimed.push((course, stem));
            }
        }
    }
    (claimed, rejected)
}

/// Computes every course on a pool of `workers` threads.
pub fn run_many(
    courses: &[CourseId],
    params: &WorkerParams,
    cache: &CourseStartCache,
    workers: usize,
) -> Result<DispatchOutcome, DispatchError> {
    let mut courses = courses.to_vec();
    courses.sort();
    courses.dedup();
    let requested = courses.len();
    let (claimed, rejected) = claim_stems(courses, writer::course_stem);

    let workers = workers.clamp(1, claimed.len().max(1));
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("engage-worker-{i}"))
        .build()?;
    tracing::info!(courses = claimed.len(), workers, "dispatching courses");

    let results: Vec<_> = pool.install(|| {
        claimed
            .par_iter()
            .map(|(course, stem)| (course, pipeline::run_course(course, stem, params, cache)))
            .collect()
    });

    let mut outcome = DispatchOutcome {
        failed: rejected,
        ..DispatchOutcome::default()
    };
    for (course, result) in results {
        match result {
            Ok(output) => outcome.courses.push(output),
            Err(e) => {
                tracing::warn!(course = %course, error = %e, "course failed");
                outcome.failed.push(FailedCourse {
                    course: course.clone(),
                    error: e.to_string(),
                });
            }
        }
    }
    outcome.failed.sort_by(|a, b| a.course.cmp(&b.course));

    if requested > 1 && !outcome.courses.is_empty() {
        let parts: Vec<&TablePaths> = outcome.courses.iter().map(|c| &c.paths).collect();
        let combined = writer::combine_tables(&params.output_dir, COMBINED_STEM, &parts)?;
        outcome.combined = Some(combined);
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    use engage_core::{ActivityEvent, EngagementConfig, StudentId, parse_timestamp};
    use engage_db::{CourseRuntime, Database};
    use insta::assert_snapshot;

    const MEDSTATS: &str = "CME/MedStats/2013-2015";
    const REAL: &str = "My/RealCourse/2013-2015";

    fn event(course: &str, student: &str, ts: &str, video: bool) -> ActivityEvent {
        ActivityEvent::new(
            CourseId::new(course).unwrap(),
            StudentId::new(student).unwrap(),
            if video { "load_video" } else { "page_close" },
            parse_timestamp(ts).unwrap(),
            video,
        )
    }

    fn runtime(course: &str, start: &str) -> CourseRuntime {
        CourseRuntime {
            course: CourseId::new(course).unwrap(),
            start: parse_timestamp(start).unwrap(),
            end: None,
        }
    }

    /// Two students across two courses.
    fn seed(temp: &tempfile::TempDir) -> WorkerParams {
        let db_path = temp.path().join("engage.db");
        let mut db = Database::open(&db_path).unwrap();
        db.insert_activities(&[
            event(MEDSTATS, "abc", "2013-08-30 03:27:00", false),
            event(MEDSTATS, "abc", "2013-08-30 03:27:20", true),
            event(MEDSTATS, "abc", "2013-08-30 03:37:00", false),
            event(MEDSTATS, "abc", "2013-08-30 04:10:00", false),
            event(REAL, "def", "2013-09-01 04:10:00", true),
            event(MEDSTATS, "abc", "2013-09-14 03:27:24", true),
            event(MEDSTATS, "abc", "2013-09-15 03:27:25", false),
            event(MEDSTATS, "abc", "2013-09-15 03:30:35", false),
            event(MEDSTATS, "abc", "2013-09-15 03:59:00", true),
            event(MEDSTATS, "abc", "2013-09-15 04:05:00", false),
            event(REAL, "def", "2013-09-16 04:10:00", true),
            event(MEDSTATS, "abc", "2013-09-15 04:36:54", true),
        ])
        .unwrap();
        db.upsert_course_runtime(&runtime(MEDSTATS, "2013-07-30 03:27:00"))
            .unwrap();
        db.upsert_course_runtime(&runtime(REAL, "2013-09-01 03:27:00"))
            .unwrap();

        let output_dir = temp.path().join("out");
        fs::create_dir_all(&output_dir).unwrap();
        WorkerParams {
            database_path: db_path,
            output_dir,
            engagement: EngagementConfig::default(),
            video_only: false,
        }
    }

    /// Adds one student with a single video event to each course.
    fn seed_courses(params: &WorkerParams, courses: &[&str]) {
        let mut db = Database::open(&params.database_path).unwrap();
        for course in courses {
            db.insert_activities(&[event(course, "zed", "2014-01-06 10:00:00", true)])
                .unwrap();
            db.upsert_course_runtime(&runtime(course, "2014-01-01 00:00:00"))
                .unwrap();
        }
    }

    fn ids(raw: &[&str]) -> Vec<CourseId> {
        raw.iter().map(|c| CourseId::new(*c).unwrap()).collect()
    }

    #[test]
    fn default_workers_is_at_least_one() {
        assert!(default_workers() >= 1);
    }

    #[test]
    fn two_courses_merge_in_course_order() {
        let temp = tempfile::tempdir().unwrap();
        let params = seed(&temp);
        let cache = CourseStartCache::new();

        // given out of order on purpose
        let outcome = run_many(&ids(&[REAL, MEDSTATS]), &params, &cache, 4).unwrap();
        assert!(outcome.failed.is_empty());
        assert_eq!(outcome.courses.len(), 2);
        assert_eq!(outcome.courses[0].engagement.course.as_str(), MEDSTATS);
        assert_eq!(cache.len(), 2);

        let combined = outcome.combined.unwrap();
        assert_snapshot!(fs::read_to_string(&combined.summary).unwrap(), @r"
        platform,course,total_sessions,total_minutes,sessions_1to20min,sessions_21to60min,sessions_over60min
        OpenEdX,CME/MedStats/2013-2015,5,92,2,0,0
        OpenEdX,My/RealCourse/2013-2015,2,30,2,0,0
        ");
        assert_snapshot!(fs::read_to_string(&combined.weekly).unwrap(), @r"
        platform,course,student,week,minutes
        OpenEdX,CME/MedStats/2013-2015,abc,5,20
        OpenEdX,CME/MedStats/2013-2015,abc,7,72
        OpenEdX,My/RealCourse/2013-2015,def,1,15
        OpenEdX,My/RealCourse/2013-2015,def,3,15
        ");
    }

    #[test]
    fn failing_course_does_not_abort_others() {
        let temp = tempfile::tempdir().unwrap();
        let params = seed(&temp);

        let outcome = run_many(
            &ids(&[MEDSTATS, "No/Runtime/2014"]),
            &params,
            &CourseStartCache::new(),
            2,
        )
        .unwrap();
        assert_eq!(outcome.courses.len(), 1);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].course.as_str(), "No/Runtime/2014");
        assert_eq!(
            outcome.failed[0].error,
            "no start date recorded for course No/Runtime/2014"
        );
        assert!(!outcome.all_failed());
        assert!(outcome.combined.is_some());
    }

    #[test]
    fn single_course_has_no_combined_tables() {
        let temp = tempfile::tempdir().unwrap();
        let params = seed(&temp);

        let outcome = run_many(&ids(&[MEDSTATS]), &params, &CourseStartCache::new(), 1).unwrap();
        assert_eq!(outcome.courses.len(), 1);
        assert!(outcome.combined.is_none());
    }

    #[test]
    fn all_failed_when_nothing_succeeds() {
        let temp = tempfile::tempdir().unwrap();
        let params = seed(&temp);

        let outcome = run_many(&ids(&["No/Runtime/2014"]), &params, &CourseStartCache::new(), 1)
            .unwrap();
        assert!(outcome.all_failed());
    }

    #[test]
    fn similar_course_ids_get_separate_tables() {
        let temp = tempfile::tempdir().unwrap();
        let params = seed(&temp);
        seed_courses(&params, &["A/B", "A_B"]);

        let outcome = run_many(&ids(&["A/B", "A_B"]), &params, &CourseStartCache::new(), 2)
            .unwrap();
        assert!(outcome.failed.is_empty());
        assert_eq!(outcome.courses.len(), 2);
        assert_ne!(outcome.courses[0].paths.summary, outcome.courses[1].paths.summary);
        for output in &outcome.courses {
            let summary = fs::read_to_string(&output.paths.summary).unwrap();
            assert!(summary.contains(&format!("OpenEdX,{},1,15,1,0,0", output.engagement.course)));
        }

        assert_snapshot!(fs::read_to_string(outcome.combined.unwrap().summary).unwrap(), @r"
        platform,course,total_sessions,total_minutes,sessions_1to20min,sessions_21to60min,sessions_over60min
        OpenEdX,A/B,1,15,1,0,0
        OpenEdX,A_B,1,15,1,0,0
        ");
    }

    #[test]
    fn combined_tables_never_replace_a_course() {
        let temp = tempfile::tempdir().unwrap();
        let params = seed(&temp);
        seed_courses(&params, &["all/courses", "all_courses"]);

        let outcome = run_many(
            &ids(&[MEDSTATS, "all/courses", "all_courses"]),
            &params,
            &CourseStartCache::new(),
            3,
        )
        .unwrap();
        assert!(outcome.failed.is_empty());
        let combined = outcome.combined.unwrap();
        for output in &outcome.courses {
            assert_ne!(output.paths.summary, combined.summary);
            let summary = fs::read_to_string(&output.paths.summary).unwrap();
            assert_eq!(summary.lines().count(), 2, "{summary}");
        }
        assert_eq!(
            fs::read_to_string(&combined.summary).unwrap().lines().count(),
            4
        );
    }

    #[test]
    fn colliding_stems_fail_the_later_course() {
        let (claimed, rejected) = claim_stems(ids(&["A/B", "A:B", "C/D"]), |course| {
            course.as_str().replace(['/', ':'], "_")
        });
        let claimed: Vec<_> = claimed.iter().map(|(_, stem)| stem.as_str()).collect();
        assert_eq!(claimed, ["A_B", "C_D"]);
        assert_eq!(
            rejected,
            [FailedCourse {
                course: CourseId::new("A:B").unwrap(),
                error: "output name A_B already used by course A/B".to_string(),
            }]
        );
    }

    #[test]
    fn reserved_stem_fails_the_course() {
        let (claimed, rejected) =
            claim_stems(ids(&["X/Y"]), |_| COMBINED_STEM.to_string());
        assert!(claimed.is_empty());
        assert_eq!(rejected.len(), 1);
        assert_eq!(
            rejected[0].error,
            "output name combined_engagement is reserved for the combined tables"
        );
    }
}
