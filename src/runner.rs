#![forbid(unsafe_code)]

//! Subprocess seam shared by the downloader and the prober.
//!
//! Production code goes through [`SystemRunner`]; tests swap in a scripted
//! runner that checks each invocation against an expected command line and
//! replays canned output.

use std::io;
use std::path::Path;
use std::process::{Command, Stdio};

/// Result of a command that was started and ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when the process was killed by a signal.
    pub code: Option<i32>,
    /// stdout followed by stderr, lossily decoded.
    pub output: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Renders the exit state the way shells report it (`exit status 1`).
    pub fn status_text(&self) -> String {
        match self.code {
            Some(code) => format!("exit status {code}"),
            None => "terminated by signal".to_string(),
        }
    }
}

pub trait CommandRunner {
    /// Runs `program` with `args`, blocking until it exits. Only failures to
    /// start the process are errors; a non-zero exit is reported through
    /// [`CommandOutput::code`].
    fn run(&self, program: &Path, args: &[String]) -> io::Result<CommandOutput>;
}

/// Runs real processes via `std::process::Command`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &Path, args: &[String]) -> io::Result<CommandOutput> {
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        Ok(CommandOutput {
            code: output.status.code(),
            output: combined,
        })
    }
}

/// Space separated command line, used for logging and invocation matching.
pub fn command_line(program: &Path, args: &[String]) -> String {
    let mut line = program.to_string_lossy().into_owned();
    for arg in args {
        line.push(' ');
        line.push_str(arg);
    }
    line
}

/// Every argument wrapped in single quotes: `'prog' '-x' 'url'`.
pub fn quoted_invocation(program: &Path, args: &[String]) -> String {
    let mut parts = Vec::with_capacity(args.len() + 1);
    parts.push(program.to_string_lossy().into_owned());
    parts.extend(args.iter().cloned());
    format!("'{}'", parts.join("' '"))
}


#[cfg(test)]
mod tests {
    use super::scripted::ScriptedRunner;
    use super::*;
    use std::path::PathBuf;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn quoted_invocation_wraps_every_argument() {
        let quoted = quoted_invocation(
            Path::new("/usr/bin/youtube-dl"),
            &args(&["-x", "--audio-format", "mp3"]),
        );
        assert_eq!(quoted, "'/usr/bin/youtube-dl' '-x' '--audio-format' 'mp3'");
    }

    #[test]
    fn status_text_matches_shell_wording() {
        let failed = CommandOutput {
            code: Some(1),
            output: String::new(),
        };
        assert!(!failed.success());
        assert_eq!(failed.status_text(), "exit status 1");

        let killed = CommandOutput {
            code: None,
            output: String::new(),
        };
        assert_eq!(killed.status_text(), "terminated by signal");
    }

    #[cfg(unix)]
    #[test]
    fn system_runner_combines_stdout_and_stderr() {
        let output = SystemRunner
            .run(
                &PathBuf::from("sh"),
                &args(&["-c", "echo out; echo err 1>&2; exit 3"]),
            )
            .unwrap();
        assert_eq!(output.code, Some(3));
        assert_eq!(output.output, "out\nerr\n");
    }

    #[test]
    fn system_runner_reports_missing_binary() {
        let err = SystemRunner
            .run(&PathBuf::from("/nonexistent/feedtube-tool"), &[])
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn scripted_runner_replays_in_order() {
        let runner = ScriptedRunner::new()
            .expect("/bin/tool a", "first", 0)
            .expect_matching(r"^/bin/tool b\d$", "second", 2);

        let first = runner.run(Path::new("/bin/tool"), &args(&["a"])).unwrap();
        assert_eq!(first.output, "first");
        let second = runner.run(Path::new("/bin/tool"), &args(&["b7"])).unwrap();
        assert_eq!(second.code, Some(2));
        runner.assert_done();
    }

    #[test]
    fn scripted_runner_rejects_unexpected_commands() {
        let runner = ScriptedRunner::new().expect("/bin/tool a", "", 0);
        let err = runner
            .run(Path::new("/bin/tool"), &args(&["z"]))
            .unwrap_err();
        assert!(err.to_string().contains("unexpected command: /bin/tool z"));
        assert_eq!(runner.unexpected(), vec!["/bin/tool z".to_string()]);
        assert_eq!(runner.remaining(), 1);
        assert_eq!(runner.invocations().len(), 1);
    }
}
