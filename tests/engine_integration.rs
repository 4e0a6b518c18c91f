//! Full-pipeline integration: orchestrate, compile with rollback, run the
//! coverage phase and the mutation phase against an in-process test host
//! that executes the real collector lifecycle.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use sharp_mutant::coverage::{
    HostSession, MutantControl, PROPERTY_COVERAGE, PROPERTY_OUT_OF_TESTS,
};
use sharp_mutant::error::EngineError;
use sharp_mutant::frontend::{LanguageFrontend, SemanticModel, TreeFileFrontend};
use sharp_mutant::mutant::{MutantId, MutantStatus, MutationKind, MutationLevel};
use sharp_mutant::mutators::MutatorRegistry;
use sharp_mutant::options::Options;
use sharp_mutant::orchestrator::MutantOrchestrator;
use sharp_mutant::platform::{
    RunSettings, TestDescription, TestId, TestOutcome, TestPlatform, TestResult, TestRun,
};
use sharp_mutant::rollback::compile_with_rollback;
use sharp_mutant::scheduler::{CancellationToken, Scheduler};
use sharp_mutant::score::{ExitVerdict, ScoreSummary};
use sharp_mutant::session::Session;
use sharp_mutant::span::SourceSpan;
use sharp_mutant::syntax::{
    BinaryOp, Block, Expr, ExprKind, Member, MemberKind, Param, Stmt, StmtKind, SyntaxTree,
    TypeDecl, UpdateOp,
};

fn span_at(start: u32, end: u32) -> SourceSpan {
    SourceSpan::new("src/Calc.cs", start, end, 1 + start / 10, 1 + start % 10)
}

fn ident(name: &str, start: u32) -> Expr {
    Expr::new(
        ExprKind::Ident(name.into()),
        span_at(start, start + name.len() as u32),
    )
}

fn update_stmt(name: &str, op: UpdateOp, start: u32) -> Stmt {
    Stmt {
        kind: StmtKind::Expr(Expr::new(
            ExprKind::Update {
                op,
                prefix: false,
                target: Box::new(ident(name, start)),
            },
            span_at(start, start + 3),
        )),
        span: span_at(start, start + 4),
        trivia: Default::default(),
    }
}

fn method(name: &str, body: Vec<Stmt>, span_start: u32) -> Member {
    Member {
        kind: MemberKind::Method {
            name: name.into(),
            params: vec![Param {
                name: "a".into(),
                ty: "int".into(),
            }],
            body: Block { statements: body },
            is_static: false,
        },
        attributes: Vec::new(),
        span: span_at(span_start, span_start + 30),
    }
}

/// Calc with four methods and a static constructor:
///   Bump:   `x++;`        -> mutant 0 (update), covered by t1
///   Check:  `return a<b;` -> mutants 1,2 (comparison), covered by t2
///   Dead:   `y--;`        -> mutant 3 (update), covered by nothing
///   cctor:  `s++;`        -> mutant 4 (update), static-triggered
fn calc_tree() -> SyntaxTree {
    let check_body = vec![Stmt {
        kind: StmtKind::Return(Some(Expr::new(
            ExprKind::Binary {
                op: BinaryOp::Lt,
                lhs: Box::new(ident("a", 60)),
                rhs: Box::new(ident("b", 64)),
            },
            span_at(60, 65),
        ))),
        span: span_at(53, 66),
        trivia: Default::default(),
    }];

    SyntaxTree {
        path: "src/Calc.cs".into(),
        is_generated: false,
        types: vec![TypeDecl {
            name: "Calc".into(),
            attributes: Vec::new(),
            members: vec![
                method("Bump", vec![update_stmt("x", UpdateOp::Increment, 20)], 10),
                method("Check", check_body, 50),
                method("Dead", vec![update_stmt("y", UpdateOp::Decrement, 90)], 80),
                Member {
                    kind: MemberKind::StaticCtor {
                        body: Block::single(update_stmt("s", UpdateOp::Increment, 120)),
                    },
                    attributes: Vec::new(),
                    span: span_at(110, 140),
                },
            ],
            span: span_at(0, 150),
        }],
    }
}

/// Which guard sites a test executes, and when it fails.
struct TestBehavior {
    normal_sites: Vec<MutantId>,
    fails_when_active: BTreeSet<i32>,
}

/// Test host that runs the real collector lifecycle in-process.
struct InProcessHost {
    tests: Vec<TestDescription>,
    behaviors: BTreeMap<String, TestBehavior>,
    /// Static sites executed once per host session, before the first test.
    static_sites: Vec<MutantId>,
    /// Tests that fail while one of `static_sites` is active.
    static_killers: BTreeSet<String>,
}

impl InProcessHost {
    fn test(id: &str) -> TestDescription {
        TestDescription {
            id: TestId::new(id),
            name: format!("CalcTests.{id}"),
            source_path: "tests/CalcTests.dll".into(),
            framework_tag: "xunit".to_string(),
        }
    }
}

impl TestPlatform for InProcessHost {
    fn discover(&self, _settings: &RunSettings) -> Result<Vec<TestDescription>, EngineError> {
        Ok(self.tests.clone())
    }

    fn run(&self, settings: &RunSettings) -> Result<TestRun, EngineError> {
        let control = MutantControl::new();
        let mut host = HostSession::new(&control);
        host.session_start(settings.collector.clone());

        // One-time initializers fire when the host assembly loads.
        for site in &self.static_sites {
            control.hit_static(*site);
        }
        let static_active = self
            .static_sites
            .iter()
            .any(|s| *s == control.active_mutant_id());

        let selected: Vec<TestId> = match &settings.test_filter {
            Some(filter) => filter.clone(),
            None => self.tests.iter().map(|t| t.id.clone()).collect(),
        };

        let mut results = Vec::new();
        for test in selected {
            host.test_case_start(&test);

            let behavior = self.behaviors.get(test.as_str());
            if let Some(b) = behavior {
                for site in &b.normal_sites {
                    control.hit_normal(*site);
                }
            }

            let active = control.active_mutant_id();
            let failed = behavior
                .map(|b| b.fails_when_active.contains(&active.0))
                .unwrap_or(false)
                || (static_active && self.static_killers.contains(test.as_str()));

            let props = host.test_case_end(&test);
            let mut properties = BTreeMap::new();
            if let Some(cov) = props.coverage {
                properties.insert(PROPERTY_COVERAGE.to_string(), cov);
            }
            if let Some(oot) = props.out_of_tests {
                properties.insert(PROPERTY_OUT_OF_TESTS.to_string(), oot);
            }

            results.push(TestResult {
                test,
                outcome: if failed {
                    TestOutcome::Failed
                } else {
                    TestOutcome::Passed
                },
                duration_ms: 10,
                properties,
            });
        }

        host.session_end();
        Ok(TestRun { results })
    }
}

fn behavior(sites: &[i32], fails_when: &[i32]) -> TestBehavior {
    TestBehavior {
        normal_sites: sites.iter().map(|s| MutantId(*s)).collect(),
        fails_when_active: fails_when.iter().copied().collect(),
    }
}

#[test]
fn full_pipeline_classifies_every_mutant() {
    let tree = calc_tree();
    let options = Options::new("proj".into());

    // Orchestrate.
    let registry = MutatorRegistry::standard();
    let semantics = SemanticModel::of(&tree);
    let mut orchestrator = MutantOrchestrator::new(&registry, &options);
    let mut session = Session::new(options.clone());
    session.units.push(
        orchestrator
            .mutate_unit(&tree, &semantics)
            .expect("tree should be mutated"),
    );
    let mut placements = orchestrator.into_registry();

    let kinds: Vec<MutationKind> = session.units[0].mutants.iter().map(|m| m.kind).collect();
    assert_eq!(
        kinds,
        vec![
            MutationKind::Update,
            MutationKind::Equality,
            MutationKind::Equality,
            MutationKind::Update,
            MutationKind::Update,
        ],
        "expected 5 mutants in traversal order"
    );

    // Compile with rollback through the shipped frontend; the instrumented
    // artifact must land on disk.
    let td = tempfile::TempDir::new().expect("TempDir should create");
    let artifact = td.path().join("instrumented.ast.json");
    let frontend = TreeFileFrontend;
    let rollback = compile_with_rollback(&frontend, &mut session.units, &mut placements, &artifact)
        .expect("instrumented trees should compile");
    assert_eq!(rollback.attempts, 1);
    assert!(artifact.exists(), "artifact written by the frontend");

    // Test host: t1 covers mutant 0 and kills it; t2 covers mutants 1 and 2
    // and kills only mutant 1; t3 covers nothing but catches the static
    // mutant 4. Mutant 3 is never executed.
    let host = InProcessHost {
        tests: vec![
            InProcessHost::test("t1"),
            InProcessHost::test("t2"),
            InProcessHost::test("t3"),
        ],
        behaviors: BTreeMap::from([
            ("t1".to_string(), behavior(&[0], &[0])),
            ("t2".to_string(), behavior(&[1, 2], &[1])),
            ("t3".to_string(), behavior(&[], &[])),
        ]),
        static_sites: vec![MutantId(4)],
        static_killers: ["t3".to_string()].into_iter().collect(),
    };

    session.tests = host.discover(&RunSettings::coverage_run(1, "SharpMutant.Runtime")).expect("discovery");
    session.seed_matrix();

    let scheduler = Scheduler::new(&host, CancellationToken::new());

    let phase = scheduler
        .run_coverage_phase(&mut session)
        .expect("coverage phase");
    assert_eq!(phase.longest_test_ms, 10);
    assert_eq!(phase.timeout_ms, 5000, "floored timeout");
    assert_eq!(phase.no_coverage, 1, "only the Dead site is uncovered");

    // The static mutant was reported through OutOfTests, not per-test hits.
    let entry = session.matrix.entry(MutantId(4)).expect("static entry");
    assert!(entry.is_static);

    let completed = scheduler
        .run_mutation_phase(&mut session, phase.timeout_ms)
        .expect("mutation phase");
    assert!(completed);

    let status_of = |id: i32| session.mutant(MutantId(id)).expect("mutant").status;
    assert_eq!(status_of(0), MutantStatus::Killed);
    assert_eq!(status_of(1), MutantStatus::Killed);
    assert_eq!(status_of(2), MutantStatus::Survived);
    assert_eq!(status_of(3), MutantStatus::NoCoverage);
    assert_eq!(status_of(4), MutantStatus::Killed);

    let killed_static = session.mutant(MutantId(4)).expect("static mutant");
    assert_eq!(killed_static.killing_tests, vec!["t3".to_string()]);

    // Score: 3 killed / (3 killed + 1 survived) = 75%.
    let summary = ScoreSummary::tally(session.mutants());
    let score = summary.score(false);
    assert!((score - 0.75).abs() < 1e-9);

    assert_eq!(
        ExitVerdict::evaluate(score, Some(80.0)).exit_code(),
        2,
        "75% is below an 80% break threshold"
    );
    assert_eq!(ExitVerdict::evaluate(score, Some(70.0)).exit_code(), 0);
}

#[test]
fn mutated_fixture_roundtrips_through_the_tree_frontend() {
    let frontend = TreeFileFrontend;
    let fixture = Path::new("tests/fixtures/simple_units/src/Calc.ast.json");
    let tree = frontend.parse(fixture).expect("fixture should parse");

    assert_eq!(tree.types.len(), 1);
    assert_eq!(tree.types[0].name, "Calc");

    let registry = MutatorRegistry::standard();
    let options = Options::new("tests/fixtures/simple_units".into());
    let semantics = SemanticModel::of(&tree);
    let mut orchestrator = MutantOrchestrator::new(&registry, &options);
    let unit = orchestrator
        .mutate_unit(&tree, &semantics)
        .expect("fixture should be mutated");

    assert_eq!(unit.mutants.len(), 1);
    assert_eq!(unit.mutants[0].display_name, "x++ -> x--");
}

#[test]
fn higher_levels_discover_more_mutants_with_stable_ids() {
    let tree = calc_tree();
    let registry = MutatorRegistry::standard();
    let semantics = SemanticModel::of(&tree);

    let mut basic_options = Options::new("proj".into());
    basic_options.level = MutationLevel::Basic;
    let mut basic = MutantOrchestrator::new(&registry, &basic_options);
    let basic_unit = basic.mutate_unit(&tree, &semantics).expect("mutates");

    let standard_options = Options::new("proj".into());
    let mut standard = MutantOrchestrator::new(&registry, &standard_options);
    let standard_unit = standard.mutate_unit(&tree, &semantics).expect("mutates");

    // Basic level drops the update mutants but keeps comparisons.
    assert_eq!(basic_unit.mutants.len(), 2);
    assert_eq!(standard_unit.mutants.len(), 5);

    // Ids restart per session and stay dense in traversal order.
    let ids: Vec<i32> = standard_unit.mutants.iter().map(|m| m.id.0).collect();
    assert_eq!(ids, vec![0, 1, 2, 3, 4]);
}
