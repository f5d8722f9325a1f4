use serde_json::{Map, Value};

/// Returns the first balanced `{...}` or `[...]` span that parses as JSON.
/// Prose, markdown fences and unparseable spans before it are skipped.
pub fn extract_json(text: &str) -> Option<Value> {
    candidates(text, &['{', '[']).next()
}

/// Like [`extract_json`] but only accepts objects.
pub fn extract_object(text: &str) -> Option<Map<String, Value>> {
    candidates(text, &['{']).find_map(|value| match value {
        Value::Object(map) => Some(map),
        _ => None,
    })
}

fn candidates<'a>(text: &'a str, openers: &'a [char]) -> impl Iterator<Item = Value> + 'a {
    let mut start = 0;
    std::iter::from_fn(move || {
        while let Some(offset) = text[start..].find(openers) {
            let open = start + offset;
            start = open + 1;
            if let Some(len) = balanced_len(&text.as_bytes()[open..]) {
                if let Ok(value) = serde_json::from_str::<Value>(&text[open..open + len]) {
                    return Some(value);
                }
            }
        }
        None
    })
}

/// Byte length of the bracketed span starting at `bytes[0]`, skipping over
/// string literals and their escapes.
fn balanced_len(bytes: &[u8]) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' | b'[' => depth += 1,
            b'}' | b']' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}
