use crate::mutant::{Mutant, MutantStatus};

/// Print a detailed list of all mutants and their statuses.
pub fn print_all_mutants(mutants: &[Mutant]) {
    for line in render_all_mutants(mutants) {
        println!("{line}");
    }
}

/// Print a short list of surviving mutants.
pub fn print_surviving_mutants(mutants: &[Mutant]) {
    for line in render_surviving_mutants(mutants) {
        println!("{line}");
    }
}

/// Render a detailed list of all mutants and their statuses.
pub fn render_all_mutants(mutants: &[Mutant]) -> Vec<String> {
    if mutants.is_empty() {
        return Vec::new();
    }

    let ordered = collect_sorted(mutants.iter());

    let mut out = Vec::with_capacity(ordered.len() + 1);
    out.push("--- mutants (detailed) ---".to_string());

    for m in ordered {
        let status = m.status.label();
        let duration = duration_label(m.duration_ms);
        let base = format_mutant(m);

        out.push(format!("{status:>13} {duration:>8} {base}"));
    }

    out
}

/// Render a short list of surviving mutants.
///
/// Survivors are the actionable output of a run: each line points at a code
/// change no test noticed.
pub fn render_surviving_mutants(mutants: &[Mutant]) -> Vec<String> {
    let survivors = collect_sorted(
        mutants
            .iter()
            .filter(|m| m.status == MutantStatus::Survived),
    );

    if survivors.is_empty() {
        return Vec::new();
    }

    let mut out = Vec::with_capacity(survivors.len() + 1);
    out.push(format!(
        "--- surviving mutants ({} of {}) ---",
        survivors.len(),
        mutants.len()
    ));

    for m in survivors {
        out.push(format_mutant(m));
    }

    out
}

fn collect_sorted<'a>(iter: impl Iterator<Item = &'a Mutant>) -> Vec<&'a Mutant> {
    let mut v: Vec<&'a Mutant> = iter.collect();
    v.sort_by_key(|m| m.id);
    v
}

fn duration_label(duration_ms: Option<u64>) -> String {
    match duration_ms {
        Some(ms) => format!("{ms}ms"),
        None => "-".to_string(),
    }
}

/// Format one mutant as a single, readable line.
pub fn format_mutant(m: &Mutant) -> String {
    let file = m.span.file.display();

    format!(
        "#{id} {file}:{line}:{col} {kind}: {orig:?} -> {mutated:?}",
        id = m.id,
        line = m.span.line,
        col = m.span.column,
        kind = m.kind.name(),
        orig = m.original_snippet,
        mutated = m.mutated_snippet,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutant::{MutantId, MutationKind};
    use crate::span::SourceSpan;

    fn mutant(id: i32, status: MutantStatus) -> Mutant {
        Mutant {
            id: MutantId(id),
            kind: MutationKind::Equality,
            display_name: "a == b -> a != b".to_string(),
            span: SourceSpan::new("src/Calc.cs", 12, 14, 3, 9),
            original_snippet: "a == b".to_string(),
            mutated_snippet: "a != b".to_string(),
            status,
            status_reason: String::new(),
            covering_tests: Default::default(),
            is_static: false,
            killing_tests: Vec::new(),
            duration_ms: Some(123),
        }
    }

    #[test]
    fn format_is_stable() {
        let line = format_mutant(&mutant(7, MutantStatus::Survived));
        insta::assert_snapshot!(
            line,
            @r#"#7 src/Calc.cs:3:9 equality: "a == b" -> "a != b""#
        );
    }

    #[test]
    fn survivors_render_only_survivors() {
        let mutants = vec![
            mutant(1, MutantStatus::Killed),
            mutant(2, MutantStatus::Survived),
            mutant(3, MutantStatus::Timeout),
        ];

        let lines = render_surviving_mutants(&mutants);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "--- surviving mutants (1 of 3) ---");
        assert!(lines[1].starts_with("#2 "));
    }

    #[test]
    fn empty_input_renders_nothing() {
        assert!(render_all_mutants(&[]).is_empty());
        assert!(render_surviving_mutants(&[]).is_empty());
    }
}
