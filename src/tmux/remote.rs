//! Opaque remote tunnel: wraps every driver call in a shell-over-SSH
//! invocation when the orchestrator runs against a remote host. Spec §4.2
//! "every driver call is wrapped in an opaque tunnel"; SPEC_FULL §9
//! resolves the open question by keeping all retry logic at the caller
//! (Orchestrator / Shutdown Supervisor), never here.

use std::process::Stdio;

use tokio::process::Command;

/// An opaque shell-over-SSH tunnel. Carries no retry or connection-reuse
/// logic by design - see SPEC_FULL §9.
#[derive(Debug, Clone)]
pub struct RemoteTunnel {
    pub host: String,
    pub ssh_binary: String,
    pub extra_args: Vec<String>,
}

impl RemoteTunnel {
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into(), ssh_binary: "ssh".to_string(), extra_args: Vec::new() }
    }

    /// Run `cmd args...` on the remote host via `ssh host -- cmd args...`,
    /// returning stdout. Quoting matches the teacher's `CommandExecutor`
    /// convention of surfacing stderr on failure.
    pub async fn run(&self, cmd: &str, args: &[&str]) -> anyhow::Result<String> {
        let remote_cmd = shell_join(cmd, args);

        let mut command = Command::new(&self.ssh_binary);
        command.args(&self.extra_args).arg(&self.host).arg("--").arg(&remote_cmd);
        command.stdout(Stdio::piped()).stderr(Stdio::piped());

        let output = command.output().await?;
        if !output.status.success() {
            anyhow::bail!(
                "remote command failed on {}: {}\nstderr: {}",
                self.host,
                remote_cmd,
                String::from_utf8_lossy(&output.stderr)
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

fn shell_join(cmd: &str, args: &[&str]) -> String {
    let mut parts = vec![shell_quote(cmd)];
    parts.extend(args.iter().map(|a| shell_quote(a)));
    parts.join(" ")
}

fn shell_quote(arg: &str) -> String {
    if arg.chars().all(|c| c.is_ascii_alphanumeric() || "-_./:@".contains(c)) {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', "'\\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_quote_leaves_simple_tokens_bare() {
        assert_eq!(shell_quote("cc_agents_0"), "cc_agents_0");
        assert_eq!(shell_quote("-t"), "-t");
    }

    #[test]
    fn shell_quote_escapes_single_quotes() {
        assert_eq!(shell_quote("it's"), "'it'\\''s'");
    }

    #[test]
    fn shell_join_quotes_keystroke_args() {
        let joined = shell_join("tmux", &["send-keys", "-t", "pane", "hello world"]);
        assert_eq!(joined, "tmux send-keys -t pane 'hello world'");
    }
}
