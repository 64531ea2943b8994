use std::env;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use crate::error::ExitError;

/// Builder for the long-lived messaging bridge process.
#[derive(Debug, Clone)]
pub struct BridgeCommand {
    program: String,
    args: Vec<String>,
}

impl BridgeCommand {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
            args: Vec::new(),
        }
    }

    pub fn args<S: AsRef<str>>(mut self, args: &[S]) -> Self {
        self.args.extend(args.iter().map(|s| s.as_ref().to_string()));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Start the bridge with piped stdin/stdout. Its stderr is inherited so the
    /// operator sees pairing prompts and protocol noise directly.
    pub fn spawn(&self) -> Result<BridgeProcess, ExitError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ExitError::Bridge(format!("{} not found", self.program))
            } else {
                ExitError::Bridge(format!("spawning {}: {e}", self.program))
            }
        })?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        Ok(BridgeProcess {
            program: self.program.clone(),
            child,
            stdin,
            stdout,
        })
    }
}

/// A running bridge. Killed on drop.
#[derive(Debug)]
pub struct BridgeProcess {
    program: String,
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: Option<ChildStdout>,
}

impl BridgeProcess {
    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.stdin.take()
    }

    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.stdout.take()
    }

    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// True while the process has not exited.
    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    pub fn kill(&mut self) {
        if self.is_running() {
            if let Err(e) = self.child.kill() {
                tracing::warn!("failed to kill {}: {e}", self.program);
            }
        }
        let _ = self.child.wait();
    }
}

impl Drop for BridgeProcess {
    fn drop(&mut self) {
        self.kill();
    }
}

/// Resolve `program` the way the OS would: a path is checked directly,
/// a bare name is searched on `PATH`.
pub fn locate(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    let path = env::var_os("PATH")?;
    env::split_paths(&path)
        .map(|dir| dir.join(program))
        .find(|p| p.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Write};

    #[test]
    fn spawn_pipes_stdin_to_stdout() {
        let mut bridge = BridgeCommand::new("cat").spawn().unwrap();
        let mut stdin = bridge.take_stdin().unwrap();
        let stdout = bridge.take_stdout().unwrap();

        writeln!(stdin, "{{\"type\":\"ready\"}}").unwrap();
        drop(stdin);

        let mut lines = BufReader::new(stdout).lines();
        assert_eq!(lines.next().unwrap().unwrap(), "{\"type\":\"ready\"}");
    }

    #[test]
    fn spawn_not_found() {
        let err = BridgeCommand::new("nonexistent-bridge-xyz").spawn().unwrap_err();
        assert!(matches!(err, ExitError::Bridge(ref m) if m.contains("not found")));
    }

    #[test]
    fn args_reach_the_child() {
        let mut bridge = BridgeCommand::new("sh")
            .args(&["-c", "echo \"hello $0\"", "from-arg"])
            .spawn()
            .unwrap();
        let stdout = bridge.take_stdout().unwrap();
        let line = BufReader::new(stdout).lines().next().unwrap().unwrap();
        assert_eq!(line, "hello from-arg");
    }

    #[test]
    fn kill_stops_a_running_bridge() {
        let mut bridge = BridgeCommand::new("sleep").args(&["30"]).spawn().unwrap();
        assert!(bridge.is_running());
        bridge.kill();
        assert!(!bridge.is_running());
    }

    #[test]
    fn locate_finds_sh_on_path() {
        assert!(locate("sh").is_some());
        assert!(locate("definitely-not-a-real-program-xyz").is_none());
    }
}
