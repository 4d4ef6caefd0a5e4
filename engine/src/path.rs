//! URL path composition.

/// Join path segments with single slashes.
///
/// Empty segments are skipped. A leading slash on the first segment and a
/// trailing slash on the last one are preserved.
pub fn join(parts: &[&str]) -> String {
    let parts: Vec<&str> = parts.iter().copied().filter(|p| !p.is_empty()).collect();
    let last = parts.len().saturating_sub(1);
    let mut out = String::new();

    for (i, part) in parts.iter().enumerate() {
        if i == 0 && part.starts_with('/') {
            out.push('/');
        }
        let mut segment = part.trim_start_matches('/');
        if i < last {
            segment = segment.trim_end_matches('/');
        }
        if segment.is_empty() {
            if i == last && part.ends_with('/') && !out.ends_with('/') {
                out.push('/');
            }
            continue;
        }
        if !out.is_empty() && !out.ends_with('/') {
            out.push('/');
        }
        out.push_str(segment);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_segments() {
        assert_eq!(join(&["users/me", "instances"]), "users/me/instances");
        assert_eq!(join(&["", "widgets"]), "widgets");
        assert_eq!(join(&["widgets", ""]), "widgets");
        assert_eq!(join(&["/resource", "2"]), "/resource/2");
        assert_eq!(join(&["a/", "/b"]), "a/b");
    }

    #[test]
    fn keeps_directory_slashes() {
        assert_eq!(join(&["files", "/dir/"]), "files/dir/");
        assert_eq!(join(&["files", "/"]), "files/");
        assert_eq!(join(&["/"]), "/");
        assert_eq!(join(&[]), "");
    }
}
