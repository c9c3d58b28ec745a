//! Safety validation for destructive shell commands.
//!
//! Every command is split on `&&`, `||`, and `;` into segments (the same
//! boundaries a shell treats as sequencing operators) and each segment is
//! shell-tokenized before inspection. This stops an attacker from hiding a
//! dangerous command behind a benign-looking first segment.

use agent_core::BrokerError;
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

static SEGMENT_SPLIT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"&&|\|\||;").unwrap());
static RM_BYPASS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\brm\s+/").unwrap());
static KILL_BYPASS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(kill|pkill|killall|nohup)\b").unwrap());

/// Split a shell command on sequencing operators into raw segments.
fn segments(command: &str) -> Vec<&str> {
    SEGMENT_SPLIT.split(command).map(str::trim).collect()
}

/// Tokenize one segment the way a shell would, for inspecting individual
/// words rather than substrings. Falls back to a naive whitespace split if
/// the segment has unbalanced quoting (so validation still runs instead of
/// silently passing a command it couldn't parse).
fn tokenize(segment: &str) -> Vec<String> {
    shell_words::split(segment).unwrap_or_else(|_| {
        segment.split_whitespace().map(str::to_owned).collect()
    })
}

/// Reject `rm` invocations that would delete anything outside `/workspace`.
///
/// Walks every `&&`/`||`/`;`-delimited segment, tokenizes it, and for any
/// segment whose first non-flag token is `rm`, collects the remaining
/// non-flag tokens as target paths. A command is rejected if:
/// - no segment contains a tokenized `rm` but the raw text still matches
///   `rm\s+/` (an attempted bypass, e.g. via a quoting trick or alias),
/// - an `rm` segment gives no target path at all,
/// - a target path is not absolute,
/// - a target path normalizes to somewhere outside `/workspace`,
/// - a target path normalizes to exactly `/workspace` itself.
pub fn validate_rm_command(command: &str) -> Result<(), BrokerError> {
    let mut found_rm = false;

    for segment in segments(command) {
        let tokens = tokenize(segment);
        let Some(rm_pos) = tokens.iter().position(|t| t == "rm") else {
            continue;
        };
        found_rm = true;

        let paths: Vec<&String> = tokens[rm_pos + 1..]
            .iter()
            .filter(|t| !t.starts_with('-'))
            .collect();

        if paths.is_empty() {
            return Err(BrokerError::SafetyRejected(
                "rm command has no target path".into(),
            ));
        }

        for path in paths {
            check_rm_target(path)?;
        }
    }

    if !found_rm && RM_BYPASS.is_match(command) {
        return Err(BrokerError::SafetyRejected(
            "command appears to attempt rm outside of tokenized form".into(),
        ));
    }

    Ok(())
}

fn check_rm_target(path: &str) -> Result<(), BrokerError> {
    if !path.starts_with('/') {
        return Err(BrokerError::SafetyRejected(format!(
            "rm target must be an absolute path: {path}"
        )));
    }

    let normalized = normalize(path);

    if !normalized.starts_with("/workspace") {
        return Err(BrokerError::SafetyRejected(format!(
            "rm target escapes /workspace: {path}"
        )));
    }

    if normalized == "/workspace" {
        return Err(BrokerError::SafetyRejected(
            "rm target is /workspace itself".into(),
        ));
    }

    Ok(())
}

/// Lexically normalize a path (resolve `.`/`..` components without
/// touching the filesystem — the path need not exist).
fn normalize(path: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for component in Path::new(path).components() {
        use std::path::Component;
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            Component::Normal(seg) => out.push(seg.to_str().unwrap_or("")),
            Component::RootDir | Component::Prefix(_) => {}
        }
    }
    format!("/{}", out.join("/"))
}

/// Reject any segment that exact-token-matches `kill`, `pkill`, `killall`,
/// or `nohup` — the broker has dedicated session-management operations
/// (`kill_session_processes`) for terminating processes; raw signals sent
/// from inside a command bypass that bookkeeping entirely.
pub fn validate_kill_commands(command: &str) -> Result<(), BrokerError> {
    for segment in segments(command) {
        let tokens = tokenize(segment);
        for blocked in BLOCKED {
            if tokens.iter().any(|t| t == blocked) {
                return Err(BrokerError::SafetyRejected(format!(
                    "use kill_session_processes instead of '{blocked}' in a command"
                )));
            }
        }
    }

    if KILL_BYPASS.is_match(command) {
        let tokenized_any_blocked = segments(command)
            .iter()
            .any(|seg| tokenize(seg).iter().any(|t| BLOCKED.contains(&t.as_str())));
        if !tokenized_any_blocked {
            return Err(BrokerError::SafetyRejected(
                "command appears to attempt kill/pkill/killall/nohup outside of tokenized form"
                    .into(),
            ));
        }
    }

    Ok(())
}

const BLOCKED: [&str; 4] = ["kill", "pkill", "killall", "nohup"];

/// Run both safety checks; the first rejection wins.
pub fn validate_command(command: &str) -> Result<(), BrokerError> {
    validate_rm_command(command)?;
    validate_kill_commands(command)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rm_under_workspace_is_allowed() {
        assert!(validate_rm_command("rm /workspace/scratch/file.txt").is_ok());
    }

    #[test]
    fn rm_outside_workspace_is_rejected() {
        assert!(validate_rm_command("rm /etc/passwd").is_err());
    }

    #[test]
    fn rm_workspace_itself_is_rejected() {
        assert!(validate_rm_command("rm -rf /workspace").is_err());
    }

    #[test]
    fn rm_relative_path_is_rejected() {
        assert!(validate_rm_command("rm file.txt").is_err());
    }

    #[test]
    fn rm_dotdot_escape_is_rejected() {
        assert!(validate_rm_command("rm -rf /workspace/../etc").is_err());
    }

    #[test]
    fn rm_hidden_in_second_segment_is_caught() {
        assert!(validate_rm_command("echo hi && rm /etc/shadow").is_err());
    }

    #[test]
    fn rm_with_no_path_is_rejected() {
        assert!(validate_rm_command("rm -rf").is_err());
    }

    #[test]
    fn kill_is_rejected_anywhere() {
        assert!(validate_kill_commands("echo hi; kill -9 1234").is_err());
        assert!(validate_kill_commands("pkill -f myproc").is_err());
        assert!(validate_kill_commands("killall python").is_err());
        assert!(validate_kill_commands("nohup long_job.sh &").is_err());
    }

    #[test]
    fn ordinary_command_passes_both_checks() {
        assert!(validate_command("python run_experiment.py --epochs 10").is_ok());
    }

    #[test]
    fn word_containing_rm_substring_is_not_flagged() {
        assert!(validate_rm_command("npm run build").is_ok());
    }
}
