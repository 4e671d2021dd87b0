//! CheckMK folder paths: `/` separated in the UI and our configuration,
//! `~` separated on the wire.

/// Trailing slashes stripped; empty input is the root.
pub fn normalize_folder_path(path: &str) -> String {
    if path.is_empty() || path == "/" {
        return "/".into();
    }
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".into()
    } else {
        trimmed.to_string()
    }
}

pub fn split_folder_path(path: &str) -> Vec<String> {
    if path.is_empty() || path == "/" || path == "~" {
        return Vec::new();
    }
    let separator = if path.starts_with('~') { '~' } else { '/' };
    path.split(separator)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

/// Wire form: `~` joined with a leading `~`; root is `/`.
pub fn to_wire_path(parts: &[String]) -> String {
    if parts.is_empty() {
        return "/".into();
    }
    format!("~{}", parts.join("~"))
}

pub fn folder_to_wire(path: &str) -> String {
    to_wire_path(&split_folder_path(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_strips_trailing_slashes() {
        assert_eq!(normalize_folder_path("/network/Berlin/"), "/network/Berlin");
        assert_eq!(normalize_folder_path("/"), "/");
        assert_eq!(normalize_folder_path(""), "/");
    }

    #[test]
    fn split_handles_both_separators() {
        assert_eq!(split_folder_path("/network/Berlin"), vec!["network", "Berlin"]);
        assert_eq!(split_folder_path("~network~Berlin"), vec!["network", "Berlin"]);
        assert!(split_folder_path("/").is_empty());
        assert!(split_folder_path("~").is_empty());
    }

    #[test]
    fn wire_round_trip() {
        assert_eq!(folder_to_wire("/network/Berlin"), "~network~Berlin");
        assert_eq!(folder_to_wire("/"), "/");
        assert_eq!(
            split_folder_path(&folder_to_wire("/a/b/c")),
            vec!["a", "b", "c"]
        );
    }
}
