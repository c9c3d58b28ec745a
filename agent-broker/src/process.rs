//! Process-tree inspection for the local pty backend.
//!
//! A session's shell is the root of a process tree; a command is only
//! "done" once every descendant of that shell has exited. This mirrors
//! the original worker-side implementation, which polled `ps --ppid` for
//! the same reason: a pty's EOF only tells you the shell itself died, not
//! that a backgrounded child finished.

use std::process::Stdio;
use tokio::process::Command;

/// One row of `ps --ppid <pid> -o pid,ppid,stat,cmd --no-headers`.
#[derive(Debug, Clone)]
pub struct ProcRow {
    /// Process id.
    pub pid: u32,
    /// Parent process id.
    pub ppid: u32,
    /// `ps` state string (e.g. `S`, `R`, `Z`, `T`).
    pub stat: String,
    /// Full command line.
    pub cmd: String,
}

impl ProcRow {
    fn is_zombie_or_stopped(&self) -> bool {
        self.stat.starts_with('Z') || self.stat.starts_with('T')
    }

    fn is_bare_shell(&self) -> bool {
        matches!(self.cmd.as_str(), "/bin/bash" | "bash" | "-bash")
    }

    fn is_kernel_thread(&self) -> bool {
        self.cmd.starts_with('[') && self.cmd.ends_with(']') && !self.cmd.contains(' ')
    }

    /// Whether this row is itself the `ps --ppid` probe process, which
    /// always shows up as a child of the shell it's inspecting.
    fn is_probe_artifact(&self) -> bool {
        self.cmd.starts_with("ps --ppid") || self.cmd.starts_with("ps -o")
    }
}

fn parse_ps_line(line: &str) -> Option<ProcRow> {
    let mut parts = line.trim().splitn(4, char::is_whitespace);
    let pid: u32 = parts.next()?.parse().ok()?;
    let ppid: u32 = parts.next()?.parse().ok()?;
    let stat = parts.next()?.to_string();
    let cmd = parts.next().unwrap_or("").trim().to_string();
    Some(ProcRow { pid, ppid, stat, cmd })
}

/// Enumerate all live descendants of `root_pid`, recursively, via
/// repeated `ps --ppid` calls (there is no single `ps` invocation that
/// walks a whole subtree).
pub async fn descendants(root_pid: u32) -> std::io::Result<Vec<ProcRow>> {
    let mut all = Vec::new();
    let mut frontier = vec![root_pid];

    while let Some(pid) = frontier.pop() {
        let output = Command::new("ps")
            .args(["--ppid", &pid.to_string(), "-o", "pid,ppid,stat,cmd", "--no-headers"])
            .stdin(Stdio::null())
            .output()
            .await?;

        let text = String::from_utf8_lossy(&output.stdout);
        for line in text.lines() {
            if let Some(row) = parse_ps_line(line) {
                frontier.push(row.pid);
                all.push(row);
            }
        }
    }

    Ok(all)
}

/// Filter out rows that don't count as "still running" for completion
/// purposes: the `ps` probe itself, bare shells, kernel threads, and
/// zombie/stopped processes.
pub fn filter_relevant(rows: Vec<ProcRow>) -> Vec<ProcRow> {
    rows.into_iter()
        .filter(|row| {
            !row.is_probe_artifact()
                && !row.is_bare_shell()
                && !row.is_kernel_thread()
                && !row.is_zombie_or_stopped()
        })
        .collect()
}

/// Result of [`check_shell_children`].
pub struct CompletionCheck {
    /// Whether the command is considered complete.
    pub completed: bool,
    /// Human-readable explanation (e.g. naming survivors when not done).
    pub rationale: String,
}

/// Check whether a shell's command has completed: either the shell pid
/// itself is gone, or it has no relevant surviving descendants.
pub async fn check_shell_children(shell_pid: u32, shell_alive: bool) -> CompletionCheck {
    if !shell_alive {
        return CompletionCheck {
            completed: true,
            rationale: "shell process has exited".into(),
        };
    }

    let rows = match descendants(shell_pid).await {
        Ok(rows) => rows,
        Err(e) => {
            return CompletionCheck {
                completed: false,
                rationale: format!("failed to enumerate descendants: {e}"),
            }
        }
    };

    let survivors = filter_relevant(rows);

    if survivors.is_empty() {
        CompletionCheck {
            completed: true,
            rationale: "no surviving descendant processes".into(),
        }
    } else {
        let names: Vec<String> = survivors
            .iter()
            .map(|r| format!("{} (pid {})", r.cmd, r.pid))
            .collect();
        CompletionCheck {
            completed: false,
            rationale: format!("still running: {}", names.join(", ")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_ps_line() {
        let row = parse_ps_line("  1234  1  S  python train.py --epochs 5").unwrap();
        assert_eq!(row.pid, 1234);
        assert_eq!(row.ppid, 1);
        assert_eq!(row.stat, "S");
        assert_eq!(row.cmd, "python train.py --epochs 5");
    }

    #[test]
    fn filters_bare_shells_and_kernel_threads_and_zombies() {
        let rows = vec![
            ProcRow { pid: 1, ppid: 0, stat: "S".into(), cmd: "/bin/bash".into() },
            ProcRow { pid: 2, ppid: 1, stat: "S".into(), cmd: "[kworker/0:1]".into() },
            ProcRow { pid: 3, ppid: 1, stat: "Z".into(), cmd: "defunct".into() },
            ProcRow { pid: 4, ppid: 1, stat: "T".into(), cmd: "stopped_job".into() },
            ProcRow { pid: 5, ppid: 1, stat: "R".into(), cmd: "python train.py".into() },
            ProcRow { pid: 6, ppid: 1, stat: "S".into(), cmd: "ps --ppid 1 -o pid,ppid,stat,cmd".into() },
        ];
        let survivors = filter_relevant(rows);
        assert_eq!(survivors.len(), 1);
        assert_eq!(survivors[0].pid, 5);
    }

    #[tokio::test]
    async fn dead_shell_is_always_completed() {
        let check = check_shell_children(99999, false).await;
        assert!(check.completed);
    }
}
