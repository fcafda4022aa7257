use vellum_query::OperationOptions;

/// HTTP method of a shard-protocol request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl RequestMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestMethod::Get => "GET",
            RequestMethod::Post => "POST",
            RequestMethod::Put => "PUT",
            RequestMethod::Patch => "PATCH",
            RequestMethod::Delete => "DELETE",
        }
    }
}

/// Header injected when the sender already holds the collection locks, so
/// the receiving server skips re-locking.
pub const NOLOCK_HEADER: &str = "x-vellum-nolock";

/// Path of a document operation: `/_db/<db>/_api/document/<collection>[/<key>]`,
/// segments URL-encoded.
pub fn document_path(db: &str, collection: &str, key: Option<&str>) -> String {
    let mut path = format!(
        "/_db/{}/_api/document/{}",
        urlencoding::encode(db),
        urlencoding::encode(collection)
    );
    if let Some(key) = key {
        path.push('/');
        path.push_str(&urlencoding::encode(key));
    }
    path
}

/// Option flags appended to the query string of a dispatched operation.
pub fn options_query(options: &OperationOptions) -> Vec<(String, String)> {
    fn flag(name: &str, value: bool) -> (String, String) {
        (name.to_string(), value.to_string())
    }
    vec![
        flag("waitForSync", options.wait_for_sync),
        flag("ignoreRevs", options.ignore_revs),
        flag("returnOld", options.return_old),
        flag("returnNew", options.return_new),
        flag("silent", options.silent),
    ]
}
