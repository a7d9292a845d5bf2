//! In-memory request model and the reference [`Backend`] over it.

use tracing::{debug, error};

use crate::backend::Backend;

/// The request attributes a filter program can inspect.
///
/// Query parameters, headers and cookies may repeat; a predicate over them
/// holds if it holds for any value. Header names match case-insensitively.
///
/// # Example
///
/// ```
/// use reqfilter::Request;
///
/// let req = Request::new("GET")
///     .domain("api.example.com")
///     .target("/v1/items?page=2&sort=asc")
///     .header("Accept", "application/json")
///     .cookie("session", "abc");
/// assert_eq!(req.path_str(), "/v1/items");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Request {
    method: String,
    scheme: String,
    domain: String,
    path: String,
    query: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    cookies: Vec<(String, String)>,
}

impl Request {
    #[must_use]
    pub fn new(method: &str) -> Self {
        Self {
            method: method.to_owned(),
            scheme: "http".to_owned(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn scheme(mut self, scheme: &str) -> Self {
        self.scheme = scheme.to_owned();
        self
    }

    #[must_use]
    pub fn domain(mut self, domain: &str) -> Self {
        self.domain = domain.to_owned();
        self
    }

    #[must_use]
    pub fn path(mut self, path: &str) -> Self {
        self.path = path.to_owned();
        self
    }

    /// Set path and query from an origin-form target such as `/a?b=1&c`.
    #[must_use]
    pub fn target(mut self, target: &str) -> Self {
        let (path, query) = target.split_once('?').unwrap_or((target, ""));
        self.path = path.to_owned();
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            self.query.push((name.to_owned(), value.to_owned()));
        }
        self
    }

    #[must_use]
    pub fn query(mut self, name: &str, value: &str) -> Self {
        self.query.push((name.to_owned(), value.to_owned()));
        self
    }

    #[must_use]
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    #[must_use]
    pub fn cookie(mut self, name: &str, value: &str) -> Self {
        self.cookies.push((name.to_owned(), value.to_owned()));
        self
    }

    #[must_use]
    pub fn method_str(&self) -> &str {
        &self.method
    }

    #[must_use]
    pub fn path_str(&self) -> &str {
        &self.path
    }

    fn query_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.query
            .iter()
            .filter(move |(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    fn header_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn cookie_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.cookies
            .iter()
            .filter(move |(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Error,
    Debug,
}

/// A message emitted by a print instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub level: Level,
    pub tag: Option<String>,
    pub text: String,
}

/// [`Backend`] answering predicates from a [`Request`].
///
/// Print instructions are recorded and forwarded to `tracing` under the
/// `reqfilter::print` target.
#[derive(Debug, Clone)]
pub struct RequestBackend<'r> {
    request: &'r Request,
    messages: Vec<Message>,
}

impl<'r> RequestBackend<'r> {
    #[must_use]
    pub fn new(request: &'r Request) -> Self {
        Self {
            request,
            messages: Vec::new(),
        }
    }

    #[must_use]
    pub fn request(&self) -> &'r Request {
        self.request
    }

    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    fn record(&mut self, level: Level, text: &str, tag: Option<&str>) {
        self.messages.push(Message {
            level,
            tag: tag.map(str::to_owned),
            text: text.to_owned(),
        });
    }
}

/// Integer at the start of `s`, after optional whitespace and sign.
fn leading_integer(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let sign_len = usize::from(s.starts_with(['+', '-']));
    let digits = s[sign_len..]
        .bytes()
        .take_while(u8::is_ascii_digit)
        .count();
    if digits == 0 {
        return None;
    }
    s[..sign_len + digits].parse().ok()
}

/// Whether any integer following an occurrence of `marker` satisfies `test`.
fn any_after(value: &str, marker: &str, test: impl Fn(i64) -> bool) -> bool {
    if marker.is_empty() {
        return leading_integer(value).is_some_and(&test);
    }
    value
        .match_indices(marker)
        .filter_map(|(i, _)| leading_integer(&value[i + marker.len()..]))
        .any(test)
}

fn starts_with_at(field: &str, value: &str, at: u32) -> bool {
    field
        .get(at as usize..)
        .is_some_and(|rest| rest.starts_with(value))
}

macro_rules! multi_valued {
    (
        $values:ident,
        $contains:ident, $equal:ident, $exists:ident, $gt:ident, $gt_after:ident,
        $lt:ident, $lt_after:ident, $starts_with:ident
    ) => {
        fn $contains(&mut self, name: &str, value: &str) -> bool {
            self.request.$values(name).any(|v| v.contains(value))
        }
        fn $equal(&mut self, name: &str, value: &str) -> bool {
            self.request.$values(name).any(|v| v == value)
        }
        fn $exists(&mut self, name: &str) -> bool {
            self.request.$values(name).next().is_some()
        }
        fn $gt(&mut self, name: &str, than: i64) -> bool {
            self.request
                .$values(name)
                .any(|v| leading_integer(v).is_some_and(|n| n > than))
        }
        fn $gt_after(&mut self, name: &str, marker: &str, than: i64) -> bool {
            self.request
                .$values(name)
                .any(|v| any_after(v, marker, |n| n > than))
        }
        fn $lt(&mut self, name: &str, than: i64) -> bool {
            self.request
                .$values(name)
                .any(|v| leading_integer(v).is_some_and(|n| n < than))
        }
        fn $lt_after(&mut self, name: &str, marker: &str, than: i64) -> bool {
            self.request
                .$values(name)
                .any(|v| any_after(v, marker, |n| n < than))
        }
        fn $starts_with(&mut self, name: &str, value: &str, at: u32) -> bool {
            self.request
                .$values(name)
                .any(|v| starts_with_at(v, value, at))
        }
    };
}

impl Backend for RequestBackend<'_> {
    fn print_error(&mut self, message: &str, tag: Option<&str>) {
        error!(target: "reqfilter::print", tag = tag.unwrap_or_default(), "{message}");
        self.record(Level::Error, message, tag);
    }

    fn print_debug(&mut self, message: &str, tag: Option<&str>) {
        debug!(target: "reqfilter::print", tag = tag.unwrap_or_default(), "{message}");
        self.record(Level::Debug, message, tag);
    }

    fn is_method(&mut self, method: &str) -> bool {
        self.request.method == method
    }

    fn is_scheme(&mut self, scheme: &str) -> bool {
        self.request.scheme == scheme
    }

    fn contains_domain(&mut self, value: &str) -> bool {
        self.request.domain.contains(value)
    }

    fn equal_domain(&mut self, value: &str) -> bool {
        self.request.domain == value
    }

    fn starts_with_domain(&mut self, value: &str, at: u32) -> bool {
        starts_with_at(&self.request.domain, value, at)
    }

    fn contains_path(&mut self, value: &str) -> bool {
        self.request.path.contains(value)
    }

    fn equal_path(&mut self, value: &str) -> bool {
        self.request.path == value
    }

    fn starts_with_path(&mut self, value: &str, at: u32) -> bool {
        starts_with_at(&self.request.path, value, at)
    }

    multi_valued!(
        query_values,
        contains_query_parameter,
        equal_query_parameter,
        exists_query_parameter,
        greater_than_query_parameter,
        greater_than_after_query_parameter,
        less_than_query_parameter,
        less_than_after_query_parameter,
        starts_with_query_parameter
    );

    multi_valued!(
        header_values,
        contains_header,
        equal_header,
        exists_header,
        greater_than_header,
        greater_than_after_header,
        less_than_header,
        less_than_after_header,
        starts_with_header
    );

    multi_valued!(
        cookie_values,
        contains_cookie,
        equal_cookie,
        exists_cookie,
        greater_than_cookie,
        greater_than_after_cookie,
        less_than_cookie,
        less_than_after_cookie,
        starts_with_cookie
    );
}
