//! JSON Schema builders for the built-in action handlers.

use serde_json::{json, Value};

/// Schema for `run`: execute a command in a session.
pub fn run_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "session_id": {"type": "string", "description": "Target session id; auto-created if absent"},
            "computer_ip": {"type": "string", "description": "Worker host, omitted for a local session"},
            "command": {"type": "string", "description": "Shell command to execute"},
            "wait_for_completion": {
                "type": "boolean",
                "description": "Block until the command finishes (up to a ~10s hard cap, after which it is killed) instead of returning immediately"
            }
        },
        "required": ["session_id", "command"]
    })
}

/// Schema for `input_in_session`: write stdin to a waiting command.
pub fn input_in_session_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "session_id": {"type": "string"},
            "computer_ip": {"type": "string"},
            "text": {"type": "string", "description": "Text to write to stdin"}
        },
        "required": ["session_id", "text"]
    })
}

/// Schema for `check_session_idle`.
pub fn check_session_idle_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "session_id": {"type": "string"},
            "computer_ip": {"type": "string"}
        },
        "required": ["session_id"]
    })
}

/// Schema for `get_session_output`.
pub fn get_session_output_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "session_id": {"type": "string"},
            "computer_ip": {"type": "string"},
            "start_lines": {
                "type": "integer",
                "description": "Without end_lines, return the last start_lines lines of output"
            },
            "end_lines": {
                "type": "integer",
                "description": "With start_lines, return the lines between the two offsets counted from the end (auto-swapped if start_lines < end_lines)"
            },
            "since_timestamp": {
                "type": "string",
                "description": "RFC3339 timestamp; overrides start_lines/end_lines and returns output newer than this"
            }
        },
        "required": ["session_id"]
    })
}

/// Schema for `think`: log a thought with no side effects.
pub fn think_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "thought": {"type": "string"}
        },
        "required": ["thought"]
    })
}

/// Schema for `finish`: declare the task done.
pub fn finish_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "task_completed": {"type": "boolean"},
            "reason": {"type": "string"}
        },
        "required": ["task_completed", "reason"]
    })
}

/// Schema for `sleep`: pause for a fixed duration.
pub fn sleep_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "seconds": {"type": "number", "description": "How long to pause, in seconds"}
        },
        "required": ["seconds"]
    })
}

/// Schema for `eval`: opaque evaluation hook, shape defined by the
/// embedding application's `validate()` callback.
pub fn eval_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "args": {"type": "object"}
        }
    })
}

/// Schema for `internal_summarize`: the only tool offered on a SUMMARY
/// turn, restricted to producing the synopsis text.
pub fn internal_summarize_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "summary_content": {"type": "string", "description": "Synopsis of the summarized turns"}
        },
        "required": ["summary_content"]
    })
}
