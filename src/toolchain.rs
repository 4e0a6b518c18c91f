use std::process::Command;

use anyhow::{Context, Result};

/// Probe the test-host command for its version string.
///
/// Best-effort diagnostics for run logs; hosts answer `--version` on either
/// stream.
pub fn host_version(cmd: &str) -> Result<String> {
    let out = Command::new(cmd)
        .arg("--version")
        .output()
        .with_context(|| format!("failed to execute `{cmd} --version`"))?;

    let text = if out.stdout.is_empty() {
        String::from_utf8_lossy(&out.stderr).to_string()
    } else {
        String::from_utf8_lossy(&out.stdout).to_string()
    };

    let one_line = text.trim().replace('\n', " ");
    if !out.status.success() {
        anyhow::bail!("`{cmd} --version` failed: {one_line}");
    }

    Ok(one_line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_command_reports_context() {
        let err = host_version("definitely-not-a-real-host-cmd").expect_err("must fail");
        assert!(err.to_string().contains("--version"));
    }
}
