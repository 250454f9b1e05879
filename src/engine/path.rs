//! URL resolution against inherited paths and aliases.
//!
//! A node's URLs are resolved relative to the nearest declared path among its
//! ancestors. Names declared as aliases (`alias` namespace, `first` lookup)
//! stand in for both URLs and paths.

use super::registry::Tree;
use crate::types::NodeId;

/// Directory part of a full URL, trailing slash included.
///
/// `"/app/main.html"` → `"/app/"`, `"/main.html"` → `"/"`. URLs without any
/// slash have no directory.
pub fn dir_of(url: &str) -> Option<String> {
    let last = url.rfind('/')?;
    if last == 0 {
        return Some("/".to_string());
    }
    Some(url[..=last].to_string())
}

pub fn with_trailing_slash(path: &str) -> String {
    if path.ends_with('/') {
        path.to_string()
    } else {
        format!("{path}/")
    }
}

/// Absolute or scheme-qualified URLs are used as-is.
pub fn is_raw(url: &str) -> bool {
    url.starts_with('/') || url.starts_with("http://") || url.starts_with("https://")
}

/// Collapse `..` and `.` segments.
///
/// A `..` never climbs past the leading root segment.
pub fn normalize(url: &str) -> String {
    let mut remnants: Vec<&str> = Vec::new();
    for (i, chunk) in url.split('/').enumerate() {
        match chunk {
            ".." => {
                let at_root = remnants.len() == 1 && remnants[0].is_empty();
                if !remnants.is_empty() && !at_root {
                    remnants.pop();
                }
            }
            "." if i > 0 => {}
            _ => remnants.push(chunk),
        }
    }
    remnants.join("/")
}

fn needs_normalizing(url: &str) -> bool {
    url.split('/').any(|chunk| chunk == ".." || chunk == ".")
}

impl Tree {
    /// Path used to resolve URLs declared on `from`.
    pub fn resolve_path(&self, from: NodeId, path: Option<&str>, root: &str) -> String {
        let path = match path {
            Some(p) if !p.is_empty() => self.find_alias(from, p).unwrap_or_else(|| p.to_string()),
            _ => self
                .inherited_path(from)
                .map(str::to_string)
                .unwrap_or_else(|| root.to_string()),
        };
        if path.is_empty() {
            return "/".to_string();
        }
        with_trailing_slash(&path)
    }

    /// Absolute, normalized URL for `url` as declared on `from`.
    pub fn resolve_url(&self, from: NodeId, url: &str, path: Option<&str>, root: &str) -> String {
        let url = self.find_alias(from, url).unwrap_or_else(|| url.to_string());
        let full = if is_raw(&url) {
            url
        } else {
            format!("{}{}", self.resolve_path(from, path, root), url)
        };
        if needs_normalizing(&full) {
            normalize(&full)
        } else {
            full
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Binding;

    #[test]
    fn test_dir_of() {
        assert_eq!(dir_of("/app/main.html").as_deref(), Some("/app/"));
        assert_eq!(dir_of("/main.html").as_deref(), Some("/"));
        assert_eq!(dir_of("/app/").as_deref(), Some("/app/"));
        assert_eq!(dir_of("main.html"), None);
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("/app/widgets/../list.html"), "/app/list.html");
        assert_eq!(normalize("/app/./list.html"), "/app/list.html");
        assert_eq!(normalize("/../x.html"), "/x.html");
        assert_eq!(
            normalize("http://host/a/b/../../c.js"),
            "http://host/c.js"
        );
    }

    #[test]
    fn test_resolve_url_uses_inherited_path() {
        let mut tree = Tree::new();
        let root = tree.allocate(None);
        tree.node_mut(root).unwrap().path = Some("/app/".into());
        let child = tree.allocate(Some(root));

        assert_eq!(tree.resolve_url(child, "list.html", None, "/"), "/app/list.html");
        assert_eq!(tree.resolve_url(child, "/abs.html", None, "/"), "/abs.html");
        assert_eq!(
            tree.resolve_url(child, "../lib/util.js", None, "/"),
            "/lib/util.js"
        );
        assert_eq!(
            tree.resolve_url(child, "x.html", Some("/other"), "/"),
            "/other/x.html"
        );
    }

    #[test]
    fn test_resolve_url_with_alias() {
        let mut tree = Tree::new();
        let root = tree.allocate(None);
        tree.define(root, "widgets", Binding::Alias("/shared/widgets/".into()))
            .unwrap();
        tree.define(root, "button", Binding::Alias("/shared/widgets/button.html".into()))
            .unwrap();
        let child = tree.allocate(Some(root));

        assert_eq!(
            tree.resolve_url(child, "button", None, "/"),
            "/shared/widgets/button.html"
        );
        assert_eq!(
            tree.resolve_url(child, "menu.html", Some("widgets"), "/"),
            "/shared/widgets/menu.html"
        );
    }

    #[test]
    fn test_resolve_url_falls_back_to_root() {
        let mut tree = Tree::new();
        let root = tree.allocate(None);
        assert_eq!(tree.resolve_url(root, "main.html", None, "/site"), "/site/main.html");
    }
}
