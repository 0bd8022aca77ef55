use std::path::{Path, PathBuf};

use url::Url;

pub const TASK_URI_SCHEME: &str = "pochi-task";

const NEW_TASK_UID: &str = "new";

/// Address of a task document, e.g. `pochi-task:///3f2a?cwd=%2Fwork%2Fapp`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskUri {
    pub uid: String,
    pub cwd: Option<PathBuf>,
}

impl TaskUri {
    pub fn new(uid: impl Into<String>, cwd: Option<PathBuf>) -> Self {
        Self {
            uid: uid.into(),
            cwd,
        }
    }

    /// URI for a task that has not been created yet.
    pub fn new_task(cwd: &Path) -> Self {
        Self::new(NEW_TASK_UID, Some(cwd.to_path_buf()))
    }

    pub fn is_new_task(&self) -> bool {
        self.uid == NEW_TASK_UID
    }

    /// Returns `None` for anything that is not a well-formed task URI.
    pub fn parse(raw: &str) -> Option<Self> {
        let url = Url::parse(raw).ok()?;
        if url.scheme() != TASK_URI_SCHEME {
            return None;
        }
        let uid = url.path().trim_start_matches('/');
        if uid.is_empty() {
            return None;
        }
        let cwd = url
            .query_pairs()
            .find(|(key, _)| key == "cwd")
            .map(|(_, value)| PathBuf::from(value.into_owned()))
            .filter(|path| !path.as_os_str().is_empty());
        Some(Self::new(uid, cwd))
    }

    pub fn to_uri_string(&self) -> String {
        let mut uri = format!("{TASK_URI_SCHEME}:///{}", self.uid);
        if let Some(cwd) = &self.cwd {
            let query: String = url::form_urlencoded::Serializer::new(String::new())
                .append_pair("cwd", &cwd.to_string_lossy())
                .finish();
            uri.push('?');
            uri.push_str(&query);
        }
        uri
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_cwd_with_special_characters() {
        let uri = TaskUri::new("3f2a", Some(PathBuf::from("/work/my app&co")));
        let rendered = uri.to_uri_string();
        assert!(rendered.starts_with("pochi-task:///3f2a?cwd="));
        assert_eq!(TaskUri::parse(&rendered), Some(uri));
    }

    #[test]
    fn rejects_foreign_and_malformed_uris() {
        assert_eq!(TaskUri::parse("file:///work/README.md"), None);
        assert_eq!(TaskUri::parse("pochi-task:///"), None);
        assert_eq!(TaskUri::parse("not a uri"), None);
    }

    #[test]
    fn cwd_is_optional() {
        let parsed = TaskUri::parse("pochi-task:///abc").expect("task uri");
        assert_eq!(parsed.uid, "abc");
        assert_eq!(parsed.cwd, None);
        assert!(!parsed.is_new_task());
        assert!(TaskUri::new_task(Path::new("/work")).is_new_task());
    }
}
