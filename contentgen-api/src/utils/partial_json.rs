//! Best-effort parsing of a JSON document that is still being streamed.
//!
//! The model emits the document token by token. After every delta the
//! accumulated text is closed off (open string, arrays and objects) and
//! trailing fragments that cannot be completed are dropped until the
//! result parses.

use serde_json::Value;

/// Upper bound on truncation steps for one repair attempt
const MAX_REPAIR_STEPS: usize = 256;

#[derive(Debug, Default)]
struct ScanState {
    in_string: bool,
    escaped: bool,
    closers: Vec<char>,
    last_string_start: Option<usize>,
}

fn scan(input: &str) -> ScanState {
    let mut state = ScanState::default();
    let mut current_start = 0;

    for (idx, ch) in input.char_indices() {
        if state.in_string {
            if state.escaped {
                state.escaped = false;
            } else if ch == '\\' {
                state.escaped = true;
            } else if ch == '"' {
                state.in_string = false;
                state.last_string_start = Some(current_start);
            }
            continue;
        }

        match ch {
            '"' => {
                state.in_string = true;
                current_start = idx;
            }
            '{' => state.closers.push('}'),
            '[' => state.closers.push(']'),
            '}' | ']' => {
                state.closers.pop();
            }
            _ => {}
        }
    }

    state
}

fn close(input: &str, state: &ScanState) -> String {
    let mut out = String::with_capacity(input.len() + state.closers.len() + 1);
    if state.in_string {
        // A dangling backslash cannot be completed
        out.push_str(if state.escaped {
            &input[..input.len() - 1]
        } else {
            input
        });
        out.push('"');
    } else {
        out.push_str(input);
    }
    out.extend(state.closers.iter().rev());
    out
}

/// Close a truncated JSON document so that it parses.
///
/// Returns `None` when nothing parseable is left, e.g. for empty input.
pub fn repair(input: &str) -> Option<String> {
    let mut current = input.trim_start();

    for _ in 0..MAX_REPAIR_STEPS {
        let state = scan(current);
        if !state.in_string {
            current = current.trim_end();
        }
        if current.is_empty() {
            return None;
        }

        let candidate = close(current, &state);
        if serde_json::from_str::<Value>(&candidate).is_ok() {
            return Some(candidate);
        }

        current = if !state.in_string && current.ends_with('"') {
            // Complete string that is neither a value nor followed by a colon
            match state.last_string_start {
                Some(start) => &current[..start],
                None => return None,
            }
        } else {
            let mut chars = current.chars();
            chars.next_back();
            chars.as_str()
        };
    }

    None
}

/// Parse the longest valid prefix of a streamed JSON document
pub fn parse_partial(input: &str) -> Option<Value> {
    repair(input).and_then(|fixed| serde_json::from_str(&fixed).ok())
}
