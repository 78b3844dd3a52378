use std::time::Duration;

/// Output captured from a generator agent process
#[derive(Debug, Clone)]
pub struct AgentOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code from the process (-1 when killed by a signal)
    pub exit_code: i32,
    pub duration: Duration,
}

impl AgentOutput {
    pub fn new(stdout: String, stderr: String, exit_code: i32, duration: Duration) -> Self {
        Self {
            stdout,
            stderr,
            exit_code,
            duration,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Output with surrounding whitespace removed
    pub fn trimmed_stdout(&self) -> &str {
        self.stdout.trim()
    }

    /// Last few stderr lines, for error messages
    pub fn stderr_tail(&self, lines: usize) -> String {
        let all: Vec<&str> = self.stderr.lines().collect();
        let start = all.len().saturating_sub(lines);
        all[start..].join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stderr_tail() {
        let output = AgentOutput::new(
            String::new(),
            "one\ntwo\nthree".to_string(),
            1,
            Duration::from_secs(1),
        );
        assert!(!output.success());
        assert_eq!(output.stderr_tail(2), "two\nthree");
        assert_eq!(output.stderr_tail(10), "one\ntwo\nthree");
    }
}
