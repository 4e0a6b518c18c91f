use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::mutant::{Mutant, MutantStatus};
use crate::report::format_mutant;
use crate::run_report::MutationRunReport;

/// Write `mutants.json` containing all discovered mutants.
pub fn write_mutants_json(out_dir: &Path, mutants: &[Mutant]) -> Result<()> {
    let path = out_dir.join("mutants.json");
    write_pretty_json(&path, mutants)
}

/// Write `outcomes.json`: the full run report.
pub fn write_outcomes_json(out_dir: &Path, report: &MutationRunReport) -> Result<()> {
    let path = out_dir.join("outcomes.json");
    write_pretty_json(&path, report)
}

/// Write per-status outcome lists:
/// - caught.txt     (killed)
/// - timeout.txt    (timed out; counted as caught in the score)
/// - missed.txt     (survived)
/// - nocoverage.txt (never executed by a test)
/// - unviable.txt   (rolled back as compile errors)
/// - ignored.txt    (filtered or unplaceable)
pub fn write_outcome_txts(out_dir: &Path, mutants: &[Mutant]) -> Result<()> {
    write_txt_for(out_dir.join("caught.txt"), mutants, MutantStatus::Killed)?;
    write_txt_for(out_dir.join("timeout.txt"), mutants, MutantStatus::Timeout)?;
    write_txt_for(out_dir.join("missed.txt"), mutants, MutantStatus::Survived)?;
    write_txt_for(
        out_dir.join("nocoverage.txt"),
        mutants,
        MutantStatus::NoCoverage,
    )?;
    write_txt_for(
        out_dir.join("unviable.txt"),
        mutants,
        MutantStatus::CompileError,
    )?;
    write_txt_for(out_dir.join("ignored.txt"), mutants, MutantStatus::Ignored)?;
    Ok(())
}

/// Write a minimal `diff/000001.diff` file per tested mutant.
pub fn write_diff_dir(out_dir: &Path, mutants: &[Mutant]) -> Result<()> {
    let diff_dir = out_dir.join("diff");
    fs::create_dir_all(&diff_dir)
        .with_context(|| format!("failed to create diff dir {:?}", diff_dir))?;

    let mut ordered: Vec<&Mutant> = mutants.iter().collect();
    ordered.sort_by_key(|m| m.id);

    for m in ordered {
        // Skip diffs for mutants that never reached a test run.
        if matches!(
            m.status,
            MutantStatus::Pending | MutantStatus::Ignored | MutantStatus::CompileError
        ) {
            continue;
        }

        let file = m.span.file.display().to_string();
        let kind = m.kind.name();

        let content = format!(
            "--- {file}\n+++ {file}\n@@ [{start}..{end}] {kind}\n- {orig:?}\n+ {mutated:?}\n",
            start = m.span.start,
            end = m.span.end,
            orig = m.original_snippet,
            mutated = m.mutated_snippet,
        );

        let path = diff_dir.join(format!("{:06}.diff", m.id.0));
        fs::write(&path, content).with_context(|| format!("failed to write {:?}", path))?;
    }

    Ok(())
}

/// Write a stable `log` file (no timestamps) with coverage + summary + error.
pub fn write_log(out_dir: &Path, report: &MutationRunReport) -> Result<()> {
    let path = out_dir.join("log");

    let mut lines = Vec::new();
    lines.push(format!("tool: {}", report.tool));
    lines.push(format!("version: {}", report.version));
    lines.push(format!("project_root: {}", report.project_root.display()));
    lines.push(format!("discovered: {}", report.discovered));
    lines.push(format!(
        "coverage: tests={} longest_test_ms={} timeout_ms={}",
        report.coverage.tests, report.coverage.longest_test_ms, report.coverage.timeout_ms
    ));
    lines.push(format!(
        "summary: killed={} timeout={} survived={} no_coverage={} compile_errors={} ignored={}",
        report.summary.killed,
        report.summary.timeout,
        report.summary.survived,
        report.summary.no_coverage,
        report.summary.compile_errors,
        report.summary.ignored,
    ));
    match report.score_percent {
        Some(score) => lines.push(format!("score: {score:.2}")),
        None => lines.push("score: undefined".to_string()),
    }
    if let Some(err) = &report.error {
        lines.push(format!("error: {err}"));
    }

    let content = lines.join("\n") + "\n";
    fs::write(&path, content).with_context(|| format!("failed to write {:?}", path))?;
    Ok(())
}

/// Create the artifact directory and write everything.
pub fn write_all(out_dir: &Path, report: &MutationRunReport) -> Result<()> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create out dir {:?}", out_dir))?;
    write_mutants_json(out_dir, &report.mutants)?;
    write_outcomes_json(out_dir, report)?;
    write_outcome_txts(out_dir, &report.mutants)?;
    write_diff_dir(out_dir, &report.mutants)?;
    write_log(out_dir, report)?;
    Ok(())
}

fn write_txt_for(path: PathBuf, mutants: &[Mutant], want: MutantStatus) -> Result<()> {
    let mut ordered: Vec<&Mutant> = mutants.iter().filter(|m| m.status == want).collect();
    ordered.sort_by_key(|m| m.id);

    // The file is created even when the list is empty.
    let mut out = String::new();
    for m in ordered {
        out.push_str(&format_mutant(m));
        out.push('\n');
    }

    fs::write(&path, out).with_context(|| format!("failed to write {:?}", path))?;
    Ok(())
}

// `?Sized` allows passing unsized values such as slices (e.g. `&[Mutant]` where `T = [Mutant]`).
fn write_pretty_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("serialize json")?;
    fs::write(path, json).with_context(|| format!("failed to write {:?}", path))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutant::{MutantId, MutationKind};
    use crate::span::SourceSpan;
    use tempfile::TempDir;

    fn mutant(id: i32, status: MutantStatus) -> Mutant {
        Mutant {
            id: MutantId(id),
            kind: MutationKind::Update,
            display_name: "x++ -> x--".to_string(),
            span: SourceSpan::new("src/Calc.cs", 20, 23, 4, 5),
            original_snippet: "x++".to_string(),
            mutated_snippet: "x--".to_string(),
            status,
            status_reason: String::new(),
            covering_tests: Default::default(),
            is_static: false,
            killing_tests: Vec::new(),
            duration_ms: Some(10),
        }
    }

    fn non_empty_lines(s: &str) -> usize {
        s.lines().filter(|l| !l.trim().is_empty()).count()
    }

    #[test]
    fn outcome_txts_bucket_exactly_matching_statuses() {
        let mutants = vec![
            mutant(0, MutantStatus::Killed),
            mutant(1, MutantStatus::Survived),
            mutant(2, MutantStatus::Timeout),
            mutant(3, MutantStatus::NoCoverage),
            mutant(4, MutantStatus::CompileError),
            mutant(5, MutantStatus::Ignored),
        ];

        let td = TempDir::new().expect("TempDir should create");
        write_outcome_txts(td.path(), &mutants).expect("write_outcome_txts should succeed");

        for (file, expected) in [
            ("caught.txt", 1),
            ("missed.txt", 1),
            ("timeout.txt", 1),
            ("nocoverage.txt", 1),
            ("unviable.txt", 1),
            ("ignored.txt", 1),
        ] {
            let text = fs::read_to_string(td.path().join(file)).expect("read bucket file");
            assert_eq!(non_empty_lines(&text), expected, "{file} should list one");
        }
    }

    #[test]
    fn diff_dir_skips_untested_mutants() {
        let mutants = vec![
            mutant(0, MutantStatus::Killed),
            mutant(1, MutantStatus::Ignored),
            mutant(2, MutantStatus::CompileError),
        ];

        let td = TempDir::new().expect("TempDir should create");
        write_diff_dir(td.path(), &mutants).expect("write_diff_dir should succeed");

        assert!(td.path().join("diff/000000.diff").exists());
        assert!(!td.path().join("diff/000001.diff").exists());
        assert!(!td.path().join("diff/000002.diff").exists());

        let diff = fs::read_to_string(td.path().join("diff/000000.diff")).expect("read diff");
        assert!(diff.contains("- \"x++\""));
        assert!(diff.contains("+ \"x--\""));
    }
}
