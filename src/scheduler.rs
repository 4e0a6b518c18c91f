//! Coverage-driven test scheduling.
//!
//! Phase 1 runs the whole suite once with coverage capture on and no mutant
//! active, which fills the coverage matrix and settles the per-mutant
//! timeout. Phase 2 dispatches each live mutant against exactly its covering
//! tests: static mutants one per invocation against the full suite,
//! single-test mutants as small parallel runs, and multi-test mutants batched
//! together when their covering sets are pairwise disjoint (with host
//! parallelism disabled so the per-test active-mutant map stays
//! deterministic).
//!
//! Workers share nothing but the job queue and the verdict channel; the
//! session is written from the draining side only.

use std::collections::{BTreeSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;

use anyhow::Result;

use crate::coverage::{decode_hit_sets, decode_id_list, PROPERTY_COVERAGE, PROPERTY_OUT_OF_TESTS};
use crate::error::EngineError;
use crate::matrix::CoverageMatrix;
use crate::mutant::{MutantId, MutantStatus};
use crate::platform::{CollectorSettings, RunSettings, TestId, TestOutcome, TestPlatform, TestRun};
use crate::session::Session;

/// Namespace of the runtime control type injected into mutated assemblies.
pub const HELPER_NAMESPACE: &str = "SharpMutant.Runtime";

/// Shared cancellation flag. Cancelling stops new host spawns; running hosts
/// are signalled through their deadline handling.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> CancellationToken {
        CancellationToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Derive the per-mutant timeout from the slowest coverage-run test.
pub fn derive_timeout_ms(longest_test_ms: u64, floor_ms: u64, multiplier: f64) -> u64 {
    let scaled = (longest_test_ms as f64 * multiplier).floor() as u64;
    scaled.max(floor_ms)
}

/// What the coverage phase settled on.
#[derive(Debug, Clone)]
pub struct CoveragePhase {
    pub longest_test_ms: u64,
    pub timeout_ms: u64,
    pub no_coverage: usize,
}

/// One test-platform invocation with the mutants it decides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunJob {
    /// Static-triggered mutant: active for the whole invocation, full suite.
    Static { mutant: MutantId, tests: Vec<TestId> },
    /// Mutant covered by exactly one test.
    Single { mutant: MutantId, test: TestId },
    /// Multiple mutants with pairwise-disjoint covering sets in one
    /// invocation, driven by the per-test active-mutant map.
    Batch {
        assignments: Vec<(MutantId, Vec<TestId>)>,
    },
}

impl RunJob {
    /// Mutants this job is allowed to produce verdicts for.
    fn assignments(&self) -> Vec<(MutantId, Vec<TestId>)> {
        match self {
            RunJob::Static { mutant, tests } => vec![(*mutant, tests.clone())],
            RunJob::Single { mutant, test } => vec![(*mutant, vec![test.clone()])],
            RunJob::Batch { assignments } => assignments.clone(),
        }
    }
}

/// Group live mutants into jobs according to their coverage.
pub fn build_plan(matrix: &CoverageMatrix, live: &[MutantId], all_tests: &[TestId]) -> Vec<RunJob> {
    let mut jobs = Vec::new();
    let mut batches: Vec<(Vec<(MutantId, Vec<TestId>)>, BTreeSet<TestId>)> = Vec::new();

    for id in live {
        let Some(entry) = matrix.entry(*id) else {
            continue;
        };

        if entry.is_static {
            jobs.push(RunJob::Static {
                mutant: *id,
                tests: all_tests.to_vec(),
            });
            continue;
        }

        match entry.tests.len() {
            0 => {} // handled as NoCoverage before planning
            1 => {
                if let Some(test) = entry.tests.iter().next() {
                    jobs.push(RunJob::Single {
                        mutant: *id,
                        test: test.clone(),
                    });
                }
            }
            _ => {
                let tests: Vec<TestId> = entry.tests.iter().cloned().collect();
                let slot = batches
                    .iter_mut()
                    .find(|(_, used)| entry.tests.is_disjoint(used));
                match slot {
                    Some((assignments, used)) => {
                        assignments.push((*id, tests));
                        used.extend(entry.tests.iter().cloned());
                    }
                    None => {
                        batches.push((vec![(*id, tests)], entry.tests.clone()));
                    }
                }
            }
        }
    }

    for (assignments, _) in batches {
        jobs.push(RunJob::Batch { assignments });
    }

    jobs
}

/// Verdict for one mutant out of one job.
#[derive(Debug)]
struct Verdict {
    mutant: MutantId,
    status: MutantStatus,
    reason: String,
    killing_tests: Vec<TestId>,
    duration_ms: u64,
}

enum WorkerMessage {
    Verdicts(Vec<Verdict>),
    Failed(EngineError),
}

/// Drives both phases against a test platform.
pub struct Scheduler<'a, P: TestPlatform + Sync> {
    platform: &'a P,
    cancel: CancellationToken,
}

impl<'a, P: TestPlatform + Sync> Scheduler<'a, P> {
    pub fn new(platform: &'a P, cancel: CancellationToken) -> Scheduler<'a, P> {
        Scheduler { platform, cancel }
    }

    /// Phase 1: run every test once with capture on, populate the matrix,
    /// classify uncovered mutants and derive the per-mutant timeout.
    pub fn run_coverage_phase(&self, session: &mut Session) -> Result<CoveragePhase> {
        let settings = RunSettings::coverage_run(session.options.concurrency, HELPER_NAMESPACE);
        let run = self.platform.run(&settings)?;

        let mut longest_test_ms = 0u64;
        for result in &run.results {
            longest_test_ms = longest_test_ms.max(result.duration_ms);

            if result.outcome == TestOutcome::Failed {
                anyhow::bail!(
                    "test {} failed before any mutation was applied; fix the suite first",
                    result.test
                );
            }

            if let Some(raw) = result.properties.get(PROPERTY_COVERAGE) {
                let Some((normal, statics)) = decode_hit_sets(raw) else {
                    anyhow::bail!("malformed coverage property {raw:?} from test {}", result.test);
                };
                session.matrix.record_hits(&result.test, &normal);
                session.matrix.record_static_hits(&result.test, &statics);
            }

            if let Some(raw) = result.properties.get(PROPERTY_OUT_OF_TESTS) {
                let Some(ids) = decode_id_list(raw) else {
                    anyhow::bail!("malformed out-of-tests property {raw:?}");
                };
                session.matrix.record_out_of_test_hits(&ids);
            }
        }

        session.adopt_coverage();

        let uncovered = session.matrix.uncovered();
        let no_coverage = uncovered.len();
        for id in uncovered {
            session.set_status(id, MutantStatus::NoCoverage, "no test covers this mutant");
        }

        let timeout_ms = derive_timeout_ms(
            longest_test_ms,
            session.options.timeout_floor_ms,
            session.options.timeout_multiplier,
        );

        Ok(CoveragePhase {
            longest_test_ms,
            timeout_ms,
            no_coverage,
        })
    }

    /// Phase 2: dispatch live mutants on the worker pool. Returns false when
    /// the run was cancelled before every job finished.
    pub fn run_mutation_phase(&self, session: &mut Session, timeout_ms: u64) -> Result<bool> {
        let live = session.live();
        let all_tests = session.test_ids();
        let jobs = build_plan(&session.matrix, &live, &all_tests);
        if jobs.is_empty() {
            return Ok(true);
        }

        let workers = session.options.concurrency.min(jobs.len()).max(1);
        let queue: Mutex<VecDeque<RunJob>> = Mutex::new(jobs.into());
        let (tx, rx) = mpsc::channel::<WorkerMessage>();

        let mut failure: Option<EngineError> = None;

        thread::scope(|scope| {
            let queue = &queue;
            let cancel = &self.cancel;
            let platform = self.platform;

            for _ in 0..workers {
                let tx = tx.clone();
                scope.spawn(move || loop {
                    if cancel.is_cancelled() {
                        break;
                    }
                    let job = queue.lock().expect("job queue lock").pop_front();
                    let Some(job) = job else { break };

                    match execute_job(platform, &job, timeout_ms) {
                        Ok(verdicts) => {
                            if tx.send(WorkerMessage::Verdicts(verdicts)).is_err() {
                                break;
                            }
                        }
                        Err(err) => {
                            cancel.cancel();
                            let _ = tx.send(WorkerMessage::Failed(err));
                            break;
                        }
                    }
                });
            }
            drop(tx);

            // Single writer: verdicts are applied here, never in workers.
            for message in rx {
                match message {
                    WorkerMessage::Verdicts(verdicts) => {
                        for v in verdicts {
                            session.record_verdict(
                                v.mutant,
                                v.status,
                                &v.reason,
                                v.killing_tests,
                                Some(v.duration_ms),
                            );
                        }
                    }
                    WorkerMessage::Failed(err) => {
                        if failure.is_none() {
                            failure = Some(err);
                        }
                    }
                }
            }
        });

        if let Some(err) = failure {
            return Err(err.into());
        }
        Ok(!self.cancel.is_cancelled())
    }
}

/// Run one job and interpret its results.
///
/// A passing result says nothing about any mutant other than the one(s)
/// assigned to that test in this invocation.
fn execute_job<P: TestPlatform>(
    platform: &P,
    job: &RunJob,
    timeout_ms: u64,
) -> Result<Vec<Verdict>, EngineError> {
    let settings = settings_for(job, timeout_ms);
    let run = platform.run(&settings)?;

    let mut verdicts = Vec::new();
    for (mutant, tests) in job.assignments() {
        verdicts.push(judge(mutant, &tests, &run, timeout_ms));
    }
    Ok(verdicts)
}

fn settings_for(job: &RunJob, timeout_ms: u64) -> RunSettings {
    let (test_filter, mutant_map, concurrency) = match job {
        RunJob::Static { mutant, .. } => {
            // Full suite; the single-entry seed map activates the mutant for
            // the whole session.
            (None, vec![(*mutant, Vec::new())], 1)
        }
        RunJob::Single { mutant, test } => {
            (Some(vec![test.clone()]), vec![(*mutant, Vec::new())], 1)
        }
        RunJob::Batch { assignments } => {
            let union: Vec<TestId> = assignments
                .iter()
                .flat_map(|(_, tests)| tests.iter().cloned())
                .collect();
            // Host parallelism must be off: the active mutant switches on
            // test-case start.
            (Some(union), assignments.clone(), 1)
        }
    };

    RunSettings {
        concurrency,
        timeout_ms: Some(timeout_ms),
        target_framework: None,
        target_platform: None,
        test_filter,
        design_mode: false,
        collector: CollectorSettings {
            capture_coverage: false,
            mutant_map,
            helper_namespace: HELPER_NAMESPACE.to_string(),
            redirect_debug_asserts: true,
        },
    }
}

fn judge(mutant: MutantId, tests: &[TestId], run: &TestRun, timeout_ms: u64) -> Verdict {
    let mut killing = Vec::new();
    let mut timed_out: Option<TestId> = None;
    let mut duration_ms = 0u64;

    for test in tests {
        let result = run.results.iter().find(|r| &r.test == test);
        match result {
            Some(r) => {
                duration_ms += r.duration_ms;
                match r.outcome {
                    TestOutcome::Failed => killing.push(test.clone()),
                    TestOutcome::TimedOut => {
                        timed_out.get_or_insert_with(|| test.clone());
                    }
                    TestOutcome::Passed | TestOutcome::Skipped => {
                        if r.duration_ms > timeout_ms {
                            timed_out.get_or_insert_with(|| test.clone());
                        }
                    }
                }
            }
            None => {
                // The host never reported the test; assume the mutant hung it.
                timed_out.get_or_insert_with(|| test.clone());
            }
        }
    }

    if !killing.is_empty() {
        let reason = format!("killed by {}", killing[0]);
        return Verdict {
            mutant,
            status: MutantStatus::Killed,
            reason,
            killing_tests: killing,
            duration_ms,
        };
    }

    if let Some(test) = timed_out {
        return Verdict {
            mutant,
            status: MutantStatus::Timeout,
            reason: format!("test {test} exceeded {timeout_ms} ms"),
            killing_tests: Vec::new(),
            duration_ms,
        };
    }

    Verdict {
        mutant,
        status: MutantStatus::Survived,
        reason: "all covering tests passed".to_string(),
        killing_tests: Vec::new(),
        duration_ms,
    }
}
