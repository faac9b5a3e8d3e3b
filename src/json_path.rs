//! Dotted-path writes into a `serde_json::Map`, used by the modify engine's
//! `set_data` op. Intermediate segments are created as objects on demand.

const MAX_DEPTH: usize = 5;

#[derive(Debug, Clone, thiserror::Error)]
pub enum PathError {
    #[error("data path is too deep (max {MAX_DEPTH} segments)")]
    TooDeep,
    #[error("data path segment '{0}' traverses a non-object value")]
    NotAnObject(String),
    #[error("data path is empty")]
    Empty,
}

pub fn set_path(
    root: &mut serde_json::Map<String, serde_json::Value>,
    path: &str,
    value: serde_json::Value,
) -> Result<(), PathError> {
    let segments: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        return Err(PathError::Empty);
    }
    if segments.len() > MAX_DEPTH {
        return Err(PathError::TooDeep);
    }

    let mut cursor = root;
    for segment in &segments[..segments.len() - 1] {
        let entry = cursor
            .entry(segment.to_string())
            .or_insert_with(|| serde_json::Value::Object(serde_json::Map::new()));
        cursor = entry
            .as_object_mut()
            .ok_or_else(|| PathError::NotAnObject(segment.to_string()))?;
    }
    cursor.insert(segments[segments.len() - 1].to_string(), value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sets_a_shallow_key() {
        let mut root = serde_json::Map::new();
        set_path(&mut root, "table_number", json!(12)).unwrap();
        assert_eq!(root.get("table_number"), Some(&json!(12)));
    }

    #[test]
    fn creates_intermediate_objects() {
        let mut root = serde_json::Map::new();
        set_path(&mut root, "guest.name", json!("Alex")).unwrap();
        assert_eq!(root["guest"]["name"], json!("Alex"));
    }

    #[test]
    fn rejects_paths_past_max_depth() {
        let mut root = serde_json::Map::new();
        let err = set_path(&mut root, "a.b.c.d.e.f", json!(1));
        assert!(matches!(err, Err(PathError::TooDeep)));
    }

    #[test]
    fn rejects_traversal_through_a_scalar() {
        let mut root = serde_json::Map::new();
        root.insert("guest".to_string(), json!("not an object"));
        let err = set_path(&mut root, "guest.name", json!("Alex"));
        assert!(matches!(err, Err(PathError::NotAnObject(_))));
    }
}
