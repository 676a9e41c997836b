use serde_json::Value;

/// Looks up a dotted path such as `token.access_token` or `items.0.id`.
///
/// Numeric segments index arrays. An empty path returns the value itself.
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .try_fold(value, |current, segment| match current {
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            Value::Object(map) => map.get(segment),
            _ => None,
        })
}
