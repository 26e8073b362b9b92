//! Client-facing image references.
//!
//! Public paths are URL paths, not filesystem paths: they are built with `/`
//! regardless of platform and cleaned lexically, never resolved against disk.

/// Lexically clean a slash-separated path.
///
/// Collapses repeated separators, drops `.` components and resolves `..`
/// against the preceding component. A rooted path never climbs above `/`;
/// a relative path keeps leading `..` components. An empty result becomes `.`.
pub fn clean_path(path: &str) -> String {
    if path.is_empty() {
        return ".".to_string();
    }

    let rooted = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();

    for component in path.split('/') {
        match component {
            "" | "." => {}
            ".." => match parts.last() {
                Some(&last) if last != ".." => {
                    parts.pop();
                }
                _ if rooted => {}
                _ => parts.push(".."),
            },
            other => parts.push(other),
        }
    }

    let joined = parts.join("/");
    match (rooted, joined.is_empty()) {
        (true, _) => format!("/{}", joined),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}

/// Build the reference a client uses to fetch an image: request prefix,
/// configured base path and image id joined and cleaned.
pub fn public_path(prefix: &str, base_path: &str, id: &str) -> String {
    let joined = [prefix, base_path, id]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("/");

    clean_path(&joined)
}
