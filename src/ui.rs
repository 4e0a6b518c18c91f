use console::{style, Term};
use std::{env, fmt::Display};

use crate::mutant::{Mutant, MutantStatus};

/// Console front-end for the engine:
/// - normal mode: human output to stdout, errors to stderr
/// - `--json` mode: every human line goes to stderr so stdout stays one
///   machine-readable JSON document
/// - styling only on a real TTY, and never under NO_COLOR or CI
#[derive(Debug, Clone)]
pub struct Ui {
    out: Term,
    err: Term,
    fancy: bool,
    enabled: bool,
}

/// Styling must key off the stream human output actually lands on,
/// otherwise ANSI escapes leak into pipes and log files.
fn stream_supports_fancy(out: &Term) -> bool {
    let no_color = env::var_os("NO_COLOR").is_some();
    let in_ci = env::var_os("CI").is_some();
    out.is_term() && !no_color && !in_ci
}

impl Ui {
    pub fn new(json: bool) -> Self {
        let out = if json { Term::stderr() } else { Term::stdout() };
        let err = Term::stderr();
        let fancy = stream_supports_fancy(&out);

        Self {
            out,
            err,
            fancy,
            enabled: true,
        }
    }

    /// Swallow all output; keeps unit tests quiet.
    #[cfg(test)]
    pub fn silent() -> Self {
        Self {
            out: Term::stdout(),
            err: Term::stderr(),
            fancy: false,
            enabled: false,
        }
    }

    fn write_out(&self, s: &str) {
        if self.enabled {
            let _ = self.out.write_line(s);
        }
    }

    fn write_err(&self, s: &str) {
        if self.enabled {
            let _ = self.err.write_line(s);
        }
    }

    pub fn line(&self, msg: impl Display) {
        self.write_out(&msg.to_string());
    }

    pub fn title(&self, msg: impl Display) {
        let s = msg.to_string();
        if self.fancy {
            self.write_out(&style(s).bold().to_string());
        } else {
            self.write_out(&s);
        }
    }

    pub fn warn(&self, msg: impl Display) {
        let s = msg.to_string();
        if self.fancy {
            self.write_err(&style(s).yellow().to_string());
        } else {
            self.write_err(&s);
        }
    }

    pub fn error(&self, msg: impl Display) {
        let s = msg.to_string();
        if self.fancy {
            self.write_err(&style(s).red().bold().to_string());
        } else {
            self.write_err(&s);
        }
    }

    /// Per-mutant progress line.
    ///
    /// Important: in non-fancy mode this prints plain stable lines, so CI
    /// logs and test assertions never see ANSI styling.
    pub fn mutant_progress(&self, m: &Mutant) {
        if !self.fancy {
            match m.status {
                MutantStatus::Survived => {
                    self.line(format!("mutant {} survived (tests still pass)", m.id));
                }
                MutantStatus::Killed => {
                    self.line(format!(
                        "mutant {} killed (tests failed under mutation)",
                        m.id
                    ));
                }
                MutantStatus::Timeout => {
                    self.line(format!("mutant {} timed out (counted as caught)", m.id));
                }
                _ => {}
            }
            return;
        }

        let tag = match m.status {
            MutantStatus::Killed => style("KILLED").red().bold(),
            MutantStatus::Survived => style("SURVIVED").green().bold(),
            MutantStatus::Timeout => style("TIMEOUT").yellow().bold(),
            MutantStatus::NoCoverage => style("NO COVER").dim(),
            MutantStatus::CompileError => style("UNVIABLE").yellow(),
            MutantStatus::Ignored => style("IGNORED").dim(),
            MutantStatus::Pending => return,
        };

        let dur = m
            .duration_ms
            .map(|ms| format!("{ms}ms"))
            .unwrap_or_else(|| "-".to_string());

        let file = m.span.file.display();
        let change = format!("{:?} -> {:?}", m.original_snippet, m.mutated_snippet);

        self.line(format!(
            "{tag} {dur:>6}  #{id} {file}:{line}:{col} {kind}: {change}",
            id = m.id,
            line = m.span.line,
            col = m.span.column,
            kind = m.kind.name(),
        ));
    }

    /// Final score line.
    pub fn score_line(&self, score_percent: f64, break_at: Option<f64>) {
        if score_percent.is_nan() {
            self.line("mutation score: undefined (no testable mutants)");
            return;
        }

        let text = match break_at {
            Some(b) => format!("mutation score: {score_percent:.2}% (break at {b:.2}%)"),
            None => format!("mutation score: {score_percent:.2}%"),
        };

        if self.fancy {
            let styled = match break_at {
                Some(b) if score_percent < b => style(text).red().bold(),
                _ => style(text).green().bold(),
            };
            self.write_out(&styled.to_string());
        } else {
            self.write_out(&text);
        }
    }

    /// Used for runner errors; keeps stderr/stdout routing consistent.
    pub fn runner_error(&self, msg: impl Display) {
        self.error(msg);
    }

    #[allow(dead_code)]
    pub fn is_fancy(&self) -> bool {
        self.fancy && self.enabled
    }
}
