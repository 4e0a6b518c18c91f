use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::frontend::{LanguageFrontend, TreeFileFrontend};
use crate::host::CommandTestPlatform;
use crate::mutant::MutationLevel;
use crate::mutators::MutatorRegistry;
use crate::options::{MutatePattern, Options};
use crate::orchestrator::MutantOrchestrator;
use crate::platform::{detect_frameworks, CollectorSettings, RunSettings, TestPlatform};
use crate::project::Project;
use crate::report::{render_all_mutants, render_surviving_mutants};
use crate::rollback::compile_with_rollback;
use crate::run_report::{CoverageReport, MutationRunReport};
use crate::scan::ProjectOverview;
use crate::scheduler::{CancellationToken, Scheduler, HELPER_NAMESPACE};
use crate::score::{ExitVerdict, ScoreSummary};
use crate::session::Session;
use crate::toolchain::host_version;
use crate::ui::Ui;

/// Top-level CLI arguments for the `sharp-mutant` binary.
#[derive(Debug, Parser)]
#[command(
    name = "sharp-mutant",
    version,
    about = "Coverage-driven mutation testing for managed-language projects"
)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands supported by `sharp-mutant`.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Discover mutation sites without running any test.
    Scan {
        /// Path to the project root holding `.ast.json` units.
        #[arg(long, default_value = ".")]
        project: PathBuf,

        /// Mutation level: basic, standard, advanced or complete.
        #[arg(long, default_value = "standard", value_parser = parse_level)]
        level: MutationLevel,
    },

    /// Run mutation testing.
    Run {
        /// Path to the project root holding `.ast.json` units.
        #[arg(long, default_value = ".")]
        project: PathBuf,

        /// Mutation level: basic, standard, advanced or complete.
        #[arg(long, default_value = "standard", value_parser = parse_level)]
        level: MutationLevel,

        /// Worker pool width for mutant test runs.
        #[arg(long, default_value_t = 4)]
        concurrency: usize,

        /// Lower bound for the derived per-mutant timeout, in milliseconds.
        #[arg(long, default_value_t = 5000)]
        timeout_floor_ms: u64,

        /// Factor applied to the longest coverage-run test.
        #[arg(long, default_value_t = 1.5)]
        timeout_multiplier: f64,

        /// Fail the run (exit 2) when the score drops below this percentage.
        #[arg(long)]
        break_at: Option<f64>,

        /// Count uncovered mutants as survivors in the score.
        #[arg(long)]
        count_uncovered: bool,

        /// File pattern to mutate; prefix with '!' to exclude. Repeatable.
        #[arg(long = "mutate")]
        mutate: Vec<String>,

        /// Command used to launch the test host.
        #[arg(long, default_value = "sharp-test-host")]
        host_cmd: String,

        /// Extra argument passed to the test host command. Repeatable.
        #[arg(long = "host-arg")]
        host_args: Vec<String>,

        /// Artifact directory.
        #[arg(long, default_value = "mutants.out")]
        out_dir: PathBuf,

        /// Emit the run report as JSON on stdout.
        #[arg(long)]
        json: bool,
    },
}

fn parse_level(raw: &str) -> Result<MutationLevel, String> {
    match raw.to_ascii_lowercase().as_str() {
        "basic" => Ok(MutationLevel::Basic),
        "standard" => Ok(MutationLevel::Standard),
        "advanced" => Ok(MutationLevel::Advanced),
        "complete" => Ok(MutationLevel::Complete),
        other => Err(format!(
            "unknown level {other:?} (expected basic, standard, advanced or complete)"
        )),
    }
}

/// Parse CLI arguments, dispatch, and return the process exit code.
pub fn run() -> Result<i32> {
    let cli = Cli::parse();

    match cli.command {
        Command::Scan { project, level } => {
            let mut options = Options::new(project);
            options.level = level;
            scan_command(&options)
        }

        Command::Run {
            project,
            level,
            concurrency,
            timeout_floor_ms,
            timeout_multiplier,
            break_at,
            count_uncovered,
            mutate,
            host_cmd,
            host_args,
            out_dir,
            json,
        } => {
            let mut options = Options::new(project);
            options.level = level;
            options.concurrency = concurrency;
            options.timeout_floor_ms = timeout_floor_ms;
            options.timeout_multiplier = timeout_multiplier;
            options.break_at = break_at;
            options.count_uncovered = count_uncovered;
            options.mutate_patterns = mutate.iter().map(|p| MutatePattern::parse(p)).collect();
            options.host_cmd = host_cmd;
            options.host_args = host_args;
            options.out_dir = out_dir;
            options.json_output = json;

            let ui = Ui::new(options.json_output);
            match run_command(&options, &ui) {
                Ok(code) => Ok(code),
                Err(err) => {
                    if options.json_output {
                        let report = MutationRunReport::failure(
                            options.project_root.clone(),
                            format!("{err:#}"),
                        );
                        if let Ok(json) = serde_json::to_string_pretty(&report) {
                            println!("{json}");
                        }
                    }
                    Err(err)
                }
            }
        }
    }
}

fn scan_command(options: &Options) -> Result<i32> {
    let ui = Ui::new(false);
    ui.title("sharp-mutant: scan");
    ui.line(format!("project: {:?}", options.project_root));

    let frontend = TreeFileFrontend;
    let project = Project::from_root(options.project_root.clone())?;
    let trees = project.load_trees(&frontend)?;

    let registry = MutatorRegistry::standard();
    let mut orchestrator = MutantOrchestrator::new(&registry, options);
    let mut mutants = Vec::new();
    for tree in &trees {
        let semantics = frontend.semantics(tree);
        if let Some(unit) = orchestrator.mutate_unit(tree, &semantics) {
            mutants.extend(unit.mutants);
        }
    }

    let overview =
        ProjectOverview::from_discovery(options.project_root.clone(), &trees, &mutants);
    print_scan_summary(&ui, &overview);

    Ok(0)
}

/// Print a short summary based on the project overview.
fn print_scan_summary(ui: &Ui, overview: &ProjectOverview) {
    ui.line("--- project overview ---");
    ui.line(format!("project root:        {}", overview.root.display()));
    ui.line(format!("unit files:          {}", overview.unit_files));
    ui.line(format!("generated units:     {}", overview.generated_units));
    ui.line(format!("types:               {}", overview.types));
    ui.line(format!("methods:             {}", overview.methods));
    ui.line(format!("mutation sites:      {}", overview.total_sites));
    for (kind, count) in &overview.sites_by_kind {
        ui.line(format!("  {kind:<18} {count}"));
    }
}

fn run_command(options: &Options, ui: &Ui) -> Result<i32> {
    options.validate()?;

    ui.title("sharp-mutant: run");
    ui.line(format!("project: {:?}", options.project_root));

    match host_version(&options.host_cmd) {
        Ok(version) => ui.line(format!("test host: {version}")),
        Err(_) => ui.warn(format!(
            "could not probe `{} --version`; continuing",
            options.host_cmd
        )),
    }

    // Load and mutate every unit.
    let frontend = TreeFileFrontend;
    let project = Project::from_root(options.project_root.clone())?;
    let trees = project.load_trees(&frontend)?;

    let registry = MutatorRegistry::standard();
    let mut orchestrator = MutantOrchestrator::new(&registry, options);
    let mut session = Session::new(options.clone());
    for tree in &trees {
        let semantics = frontend.semantics(tree);
        if let Some(unit) = orchestrator.mutate_unit(tree, &semantics) {
            session.units.push(unit);
        }
    }
    let mut placements = orchestrator.into_registry();

    let discovered: usize = session.units.iter().map(|u| u.mutants.len()).sum();
    ui.line(format!("discovered {discovered} mutants"));

    if discovered == 0 {
        ui.line("no mutants discovered, exiting");
        return Ok(0);
    }

    // Compile with rollback; the instrumented artifact lands in the out dir.
    let artifact = options.out_dir.join("instrumented.ast.json");
    let rollback = compile_with_rollback(&frontend, &mut session.units, &mut placements, &artifact)?;
    if !rollback.rolled_back.is_empty() {
        ui.warn(format!(
            "{} mutants rolled back as compile errors ({} compile attempts)",
            rollback.rolled_back.len(),
            rollback.attempts
        ));
    }

    // Discover tests.
    let platform = CommandTestPlatform::new(options.host_cmd.clone(), options.host_args.clone())
        .with_cwd(options.project_root.clone());
    session.tests = platform
        .discover(&discovery_settings(options))
        .context("test discovery failed")?;
    ui.line(format!("discovered {} tests", session.tests.len()));

    let frameworks = detect_frameworks(&session.tests);
    let names = frameworks.names();
    if !names.is_empty() {
        ui.line(format!("test frameworks: {}", names.join(", ")));
    }

    session.seed_matrix();

    // Cancellation: Ctrl-C stops spawning new hosts.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        let _ = ctrlc::set_handler(move || cancel.cancel());
    }

    let scheduler = Scheduler::new(&platform, cancel);

    let phase = scheduler.run_coverage_phase(&mut session)?;
    ui.line(format!(
        "coverage run: longest test {} ms, per-mutant timeout {} ms, {} uncovered",
        phase.longest_test_ms, phase.timeout_ms, phase.no_coverage
    ));

    let completed = scheduler.run_mutation_phase(&mut session, phase.timeout_ms)?;
    if !completed {
        ui.warn("run cancelled; remaining mutants stay pending");
    }

    for mutant in session.mutants() {
        ui.mutant_progress(mutant);
    }

    // Score and report.
    let summary = ScoreSummary::tally(session.mutants());
    let score = summary.score(options.count_uncovered);
    let verdict = ExitVerdict::evaluate(score, options.break_at);

    let report = MutationRunReport::success(
        options.project_root.clone(),
        CoverageReport {
            tests: session.tests.len(),
            longest_test_ms: phase.longest_test_ms,
            timeout_ms: phase.timeout_ms,
        },
        summary.clone(),
        summary.score_percent(options.count_uncovered),
        options.break_at,
        session.mutants().cloned().collect(),
    );

    crate::out::write_all(&options.out_dir, &report)
        .with_context(|| format!("failed to write artifacts to {:?}", options.out_dir))?;

    ui.line(format!(
        "--- mutation run summary ---\nmutants total:    {}\nmutants killed:   {}\nmutants timeout:  {}\nmutants survived: {}\nno coverage:      {}\ncompile errors:   {}\nignored:          {}",
        summary.total,
        summary.killed,
        summary.timeout,
        summary.survived,
        summary.no_coverage,
        summary.compile_errors,
        summary.ignored,
    ));

    let all: Vec<_> = session.mutants().cloned().collect();
    for line in render_surviving_mutants(&all) {
        ui.line(line);
    }
    if options.json_output {
        // Keep stdout machine-readable; the detailed list goes to stderr
        // with the rest of the human output.
        for line in render_all_mutants(&all) {
            ui.line(line);
        }
    }

    ui.score_line(summary.score_percent(options.count_uncovered), options.break_at);

    if let ExitVerdict::BreakThresholdViolated {
        score_percent,
        break_at,
    } = &verdict
    {
        ui.error(format!(
            "mutation score {score_percent:.2}% is below the break threshold {break_at:.2}%"
        ));
    }

    if options.json_output {
        let json = serde_json::to_string_pretty(&report).context("serialize run report")?;
        println!("{json}");
    }

    Ok(verdict.exit_code())
}

fn discovery_settings(options: &Options) -> RunSettings {
    RunSettings {
        concurrency: options.concurrency,
        timeout_ms: None,
        target_framework: None,
        target_platform: None,
        test_filter: None,
        design_mode: true,
        collector: CollectorSettings {
            capture_coverage: false,
            mutant_map: Vec::new(),
            helper_namespace: HELPER_NAMESPACE.to_string(),
            redirect_debug_asserts: false,
        },
    }
}
