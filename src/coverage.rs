//! In-host coverage collector.
//!
//! This module runs inside the test host process. `MutantControl` is the
//! process-wide control state: the active mutant id, the capture flag, and
//! the hit buffers the instrumented code appends to. It is the single source
//! of non-determinism inside the host and is isolated behind `init`/`reset`
//! hooks.
//!
//! `hit_normal`/`hit_static` may be called from arbitrary threads; buffers
//! are drained only at test-case end on the host's reporting thread, which
//! the test-platform message ordering sequences after all hits of the test.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Mutex, OnceLock};

use crate::mutant::MutantId;
use crate::platform::{CollectorSettings, TestId};

/// Property name the per-test coverage string is reported under.
pub const PROPERTY_COVERAGE: &str = "Coverage";

/// Property name for hits observed before the first test started.
pub const PROPERTY_OUT_OF_TESTS: &str = "OutOfTests";

/// Encode two hit sets as `"<normal_ids>;<static_ids>"`, ids in decimal,
/// comma-separated. Either side may be empty.
pub fn encode_hit_sets(normal: &BTreeSet<i32>, statics: &BTreeSet<i32>) -> String {
    let join = |set: &BTreeSet<i32>| {
        set.iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",")
    };
    format!("{};{}", join(normal), join(statics))
}

/// Decode a `Coverage` property back into (normal, static) id lists.
pub fn decode_hit_sets(value: &str) -> Option<(Vec<MutantId>, Vec<MutantId>)> {
    let (normal, statics) = value.split_once(';')?;
    Some((decode_id_list(normal)?, decode_id_list(statics)?))
}

/// Decode an `OutOfTests` property (a single comma-separated id list).
pub fn decode_id_list(value: &str) -> Option<Vec<MutantId>> {
    if value.is_empty() {
        return Some(Vec::new());
    }
    value
        .split(',')
        .map(|part| part.trim().parse::<i32>().ok().map(MutantId))
        .collect()
}

/// Process-wide mutation control state.
#[derive(Debug)]
pub struct MutantControl {
    active: AtomicI32,
    capture: AtomicBool,
    redirect_asserts: AtomicBool,
    hits: Mutex<HitBuffers>,
}

#[derive(Debug, Default)]
struct HitBuffers {
    /// Normal hits of the test currently running.
    current: BTreeSet<i32>,

    /// Static-initializer hits since the last drain; shared across tests.
    statics: BTreeSet<i32>,
}

impl Default for MutantControl {
    fn default() -> Self {
        Self {
            active: AtomicI32::new(MutantId::NONE.0),
            capture: AtomicBool::new(false),
            redirect_asserts: AtomicBool::new(false),
            hits: Mutex::new(HitBuffers::default()),
        }
    }
}

impl MutantControl {
    pub fn new() -> MutantControl {
        MutantControl::default()
    }

    /// The process-wide instance used by instrumented code.
    pub fn global() -> &'static MutantControl {
        static GLOBAL: OnceLock<MutantControl> = OnceLock::new();
        GLOBAL.get_or_init(MutantControl::default)
    }

    /// Apply collector settings at session start.
    ///
    /// A seed map with exactly one entry pre-sets the active mutant for the
    /// whole session, which skips per-test switching for single-mutant runs.
    pub fn init(&self, settings: &CollectorSettings) {
        self.reset();
        self.capture
            .store(settings.capture_coverage, Ordering::SeqCst);
        self.redirect_asserts
            .store(settings.redirect_debug_asserts, Ordering::SeqCst);

        if let [(single, _)] = settings.mutant_map.as_slice() {
            self.active.store(single.0, Ordering::SeqCst);
        }
    }

    /// Clear all control state back to defaults.
    pub fn reset(&self) {
        self.active.store(MutantId::NONE.0, Ordering::SeqCst);
        self.capture.store(false, Ordering::SeqCst);
        self.redirect_asserts.store(false, Ordering::SeqCst);
        let mut hits = self.hits.lock().expect("hit buffer lock");
        hits.current.clear();
        hits.statics.clear();
    }

    pub fn active_mutant_id(&self) -> MutantId {
        MutantId(self.active.load(Ordering::SeqCst))
    }

    pub fn set_active(&self, id: MutantId) {
        self.active.store(id.0, Ordering::SeqCst);
    }

    pub fn capture_coverage(&self) -> bool {
        self.capture.load(Ordering::SeqCst)
    }

    /// Should debug assertions throw instead of halting the host? Mutations
    /// that trip assertions then surface as test failures (Killed), not as
    /// host crashes.
    pub fn redirect_debug_asserts(&self) -> bool {
        self.redirect_asserts.load(Ordering::SeqCst)
    }

    /// Record a hit at an ordinary mutant site.
    ///
    /// While a mutant is active the collector only routes mutation behavior;
    /// no coverage is captured.
    pub fn hit_normal(&self, id: MutantId) {
        if !self.capture_coverage() || self.active_mutant_id() != MutantId::NONE {
            return;
        }
        self.hits
            .lock()
            .expect("hit buffer lock")
            .current
            .insert(id.0);
    }

    /// Record a hit inside a one-time initializer.
    pub fn hit_static(&self, id: MutantId) {
        if !self.capture_coverage() || self.active_mutant_id() != MutantId::NONE {
            return;
        }
        self.hits
            .lock()
            .expect("hit buffer lock")
            .statics
            .insert(id.0);
    }

    fn take_current(&self) -> BTreeSet<i32> {
        std::mem::take(&mut self.hits.lock().expect("hit buffer lock").current)
    }

    fn take_statics(&self) -> BTreeSet<i32> {
        std::mem::take(&mut self.hits.lock().expect("hit buffer lock").statics)
    }

    fn clear_current(&self) {
        self.hits.lock().expect("hit buffer lock").current.clear();
    }
}

/// What the collector attaches to a finished test case.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestCaseProperties {
    pub coverage: Option<String>,
    pub out_of_tests: Option<String>,
}

/// Host-session state machine: `Idle → Session → PerTest* → Session → Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Idle,
    Session,
    InTest,
}

/// Drives the collector through the test-platform callbacks.
pub struct HostSession<'a> {
    control: &'a MutantControl,
    settings: CollectorSettings,
    state: SessionState,
    seen_first_test: bool,
    pre_test_hits: BTreeSet<i32>,
}

impl<'a> HostSession<'a> {
    pub fn new(control: &'a MutantControl) -> HostSession<'a> {
        HostSession {
            control,
            settings: CollectorSettings::default(),
            state: SessionState::Idle,
            seen_first_test: false,
            pre_test_hits: BTreeSet::new(),
        }
    }

    pub fn session_start(&mut self, settings: CollectorSettings) {
        debug_assert_eq!(self.state, SessionState::Idle, "session already started");
        self.control.init(&settings);
        self.settings = settings;
        self.state = SessionState::Session;
        self.seen_first_test = false;
        self.pre_test_hits.clear();
    }

    pub fn test_case_start(&mut self, test: &TestId) {
        debug_assert_eq!(self.state, SessionState::Session, "test outside session");
        self.state = SessionState::InTest;

        // Batched runs carry a per-test active-mutant map; switch before the
        // test body runs.
        if let Some(active) = self.active_for(test) {
            self.control.set_active(active);
        }

        if !self.control.capture_coverage() {
            return;
        }

        self.control.clear_current();

        if !self.seen_first_test {
            // Static hits before the first test are global pre-test hits;
            // they cannot be credited to any test.
            self.pre_test_hits = self.control.take_statics();
            self.seen_first_test = true;
        }
    }

    pub fn test_case_end(&mut self, _test: &TestId) -> TestCaseProperties {
        debug_assert_eq!(self.state, SessionState::InTest, "end without start");
        self.state = SessionState::Session;

        if !self.control.capture_coverage() {
            return TestCaseProperties::default();
        }

        let normal = self.control.take_current();
        let statics = self.control.take_statics();

        let out_of_tests = if self.pre_test_hits.is_empty() {
            None
        } else {
            let drained = std::mem::take(&mut self.pre_test_hits);
            Some(
                drained
                    .iter()
                    .map(|id| id.to_string())
                    .collect::<Vec<_>>()
                    .join(","),
            )
        };

        TestCaseProperties {
            coverage: Some(encode_hit_sets(&normal, &statics)),
            out_of_tests,
        }
    }

    pub fn session_end(&mut self) {
        debug_assert_eq!(self.state, SessionState::Session, "end inside a test");
        self.state = SessionState::Idle;
        self.control.reset();
    }

    fn active_for(&self, test: &TestId) -> Option<MutantId> {
        // Whole-session presets (single entry) were applied at init.
        if self.settings.mutant_map.len() <= 1 {
            return None;
        }
        for (mutant, tests) in &self.settings.mutant_map {
            if tests.contains(test) {
                return Some(*mutant);
            }
        }
        Some(MutantId::NONE)
    }
}
