//! String path helpers.
//!
//! Paths inside txfs are `/`-separated strings rooted at `/`. [`normalize`]
//! is the only function that resolves `.` and `..`; everything else works on
//! the literal string so that callers get exact, predictable comparisons.

/// Normalize a path: collapse duplicate slashes, resolve `.` and `..`,
/// strip the trailing slash and force a leading slash.
///
/// `..` at the root stays at the root.
pub fn normalize(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    if parts.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", parts.join("/"))
    }
}

/// Parent directory by literal string slicing.
///
/// `"/a/b.txt"` → `"/a"`, `"/b.txt"` → `"/"`, `"b.txt"` → `"."`.
/// No normalization is applied, so `"/a/./b"` has parent `"/a/."`.
pub fn parent(path: &str) -> &str {
    let trimmed = if path.len() > 1 {
        path.trim_end_matches('/')
    } else {
        path
    };
    match trimmed.rfind('/') {
        Some(0) => "/",
        Some(idx) => &trimmed[..idx],
        None => ".",
    }
}

/// Final path component (`"/a/b.txt"` → `"b.txt"`, `"/"` → `""`).
pub fn basename(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed,
    }
}

/// Join a directory and a child name.
pub fn join(dir: &str, name: &str) -> String {
    if dir.ends_with('/') {
        format!("{dir}{name}")
    } else {
        format!("{dir}/{name}")
    }
}

/// Returns true if `path` lies strictly below `dir`.
///
/// Equal paths are not nested. Every absolute path other than `/` is nested
/// under `/`.
pub fn is_nested(dir: &str, path: &str) -> bool {
    if dir == "/" {
        return path.starts_with('/') && path != "/";
    }
    let dir = dir.trim_end_matches('/');
    path.len() > dir.len() + 1 && path.starts_with(dir) && path.as_bytes()[dir.len()] == b'/'
}

/// Path of `path` relative to `dir`, when `path` is nested under `dir`.
pub fn relative<'a>(dir: &str, path: &'a str) -> Option<&'a str> {
    if !is_nested(dir, path) {
        return None;
    }
    if dir == "/" {
        Some(&path[1..])
    } else {
        Some(&path[dir.trim_end_matches('/').len() + 1..])
    }
}

/// Strict ancestors of a normalized absolute path, nearest first.
///
/// `"/a/b/c"` yields `"/a/b"`, `"/a"`, `"/"`. The root has no ancestors.
pub fn ancestors(path: &str) -> impl Iterator<Item = &str> {
    let mut current = Some(path);
    std::iter::from_fn(move || {
        let p = current?;
        if p == "/" || !p.starts_with('/') {
            current = None;
            return None;
        }
        let up = parent(p);
        current = Some(up);
        Some(up)
    })
}

/// Returns true when the two paths have different parent directories.
///
/// Uses exact string equality of the parents, not semantic resolution.
pub fn is_cross_directory_move(old_path: &str, new_path: &str) -> bool {
    parent(old_path) != parent(new_path)
}
