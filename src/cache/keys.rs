/// Identity of a cached page.
///
/// The viewer is part of the key because every page carries the viewer's
/// navigation bar. Only the `page` parameter of the query is kept, and in
/// the form the paginator reads it, so unrelated or malformed parameters
/// all land on the same entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageKey {
    pub viewer: Option<i64>,
    pub path: String,
    pub page: Option<i64>,
}

impl PageKey {
    pub fn new(viewer: Option<i64>, path: impl Into<String>, query: &str) -> Self {
        Self {
            viewer,
            path: path.into(),
            page: page_param(query),
        }
    }
}

/// The requested page number. `None` stands for the first page, which is
/// also what a missing or non-numeric value resolves to.
fn page_param(query: &str) -> Option<i64> {
    let raw = url::form_urlencoded::parse(query.as_bytes())
        .find(|(name, _)| name == "page")
        .map(|(_, value)| value)?;
    raw.trim().parse::<i64>().ok().filter(|number| *number != 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_differ_by_viewer_and_page() {
        let anonymous = PageKey::new(None, "/", "page=2");
        assert_eq!(anonymous, PageKey::new(None, "/", "page=2"));
        assert_ne!(anonymous, PageKey::new(Some(7), "/", "page=2"));
        assert_ne!(anonymous, PageKey::new(None, "/", "page=3"));
    }

    #[test]
    fn unrelated_parameters_share_an_entry() {
        let first = PageKey::new(None, "/", "");
        for query in ["junk=1", "junk=2&utm=x", "page=1", "page=abc", "page=%201%20"] {
            assert_eq!(PageKey::new(None, "/", query), first, "{query}");
        }
        assert_eq!(
            PageKey::new(None, "/", "junk=9&page=2"),
            PageKey::new(None, "/", "page=2")
        );
    }
}
