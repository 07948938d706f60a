use serde_json::Value;

/// Walk `path` through nested JSON objects.
///
/// Returns `None` when any key is missing, when an intermediate value is not an
/// object, or when the value at the end of the path is `null`. Never panics.
pub fn lookup<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut current = value;
    for key in path {
        current = current.as_object()?.get(*key)?;
    }
    if current.is_null() {
        None
    } else {
        Some(current)
    }
}

/// String at `path`, if present and actually a string
pub fn lookup_str<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    lookup(value, path).and_then(Value::as_str)
}

/// Owned string at `path`
pub fn lookup_string(value: &Value, path: &[&str]) -> Option<String> {
    lookup_str(value, path).map(str::to_string)
}

pub fn lookup_bool(value: &Value, path: &[&str]) -> Option<bool> {
    lookup(value, path).and_then(Value::as_bool)
}

/// First element of the array at `path`. A non-array or empty array is absence.
pub fn first_in<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    lookup(value, path)
        .and_then(Value::as_array)
        .and_then(|items| items.first())
        .filter(|item| !item.is_null())
}

/// The array at `path`, or an empty slice
pub fn array_at<'a>(value: &'a Value, path: &[&str]) -> &'a [Value] {
    lookup(value, path)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}
