//! Predicate backends.
//!
//! A [`Backend`] answers the concrete questions a program asks about one
//! request. The VM memoizes every answer, so implementations must be
//! idempotent for the lifetime of a VM instance.

use std::fmt::Display;
use std::io::{self, Write};

use tracing::warn;

/// Capability interface consulted by the [`Vm`](crate::Vm).
///
/// String arguments are borrowed from the program's string arena.
/// `at` is a byte offset into the request attribute; numeric thresholds are
/// widened to `i64`.
pub trait Backend {
    fn print_error(&mut self, message: &str, tag: Option<&str>);
    fn print_debug(&mut self, message: &str, tag: Option<&str>);

    fn is_method(&mut self, method: &str) -> bool;
    fn is_scheme(&mut self, scheme: &str) -> bool;

    fn contains_domain(&mut self, value: &str) -> bool;
    fn equal_domain(&mut self, value: &str) -> bool;
    fn not_equal_domain(&mut self, value: &str) -> bool {
        !self.equal_domain(value)
    }
    fn starts_with_domain(&mut self, value: &str, at: u32) -> bool;

    fn contains_path(&mut self, value: &str) -> bool;
    fn equal_path(&mut self, value: &str) -> bool;
    fn not_equal_path(&mut self, value: &str) -> bool {
        !self.equal_path(value)
    }
    fn starts_with_path(&mut self, value: &str, at: u32) -> bool;

    fn contains_query_parameter(&mut self, name: &str, value: &str) -> bool;
    fn equal_query_parameter(&mut self, name: &str, value: &str) -> bool;
    fn exists_query_parameter(&mut self, name: &str) -> bool;
    fn greater_than_query_parameter(&mut self, name: &str, than: i64) -> bool;
    fn greater_than_after_query_parameter(&mut self, name: &str, marker: &str, than: i64) -> bool;
    fn less_than_query_parameter(&mut self, name: &str, than: i64) -> bool;
    fn less_than_after_query_parameter(&mut self, name: &str, marker: &str, than: i64) -> bool;
    /// Present, and no value equals `value`.
    fn not_equal_query_parameter(&mut self, name: &str, value: &str) -> bool {
        self.exists_query_parameter(name) && !self.equal_query_parameter(name, value)
    }
    fn starts_with_query_parameter(&mut self, name: &str, value: &str, at: u32) -> bool;

    fn contains_header(&mut self, name: &str, value: &str) -> bool;
    fn equal_header(&mut self, name: &str, value: &str) -> bool;
    fn exists_header(&mut self, name: &str) -> bool;
    fn greater_than_header(&mut self, name: &str, than: i64) -> bool;
    fn greater_than_after_header(&mut self, name: &str, marker: &str, than: i64) -> bool;
    fn less_than_header(&mut self, name: &str, than: i64) -> bool;
    fn less_than_after_header(&mut self, name: &str, marker: &str, than: i64) -> bool;
    fn not_equal_header(&mut self, name: &str, value: &str) -> bool {
        self.exists_header(name) && !self.equal_header(name, value)
    }
    fn starts_with_header(&mut self, name: &str, value: &str, at: u32) -> bool;

    fn contains_cookie(&mut self, name: &str, value: &str) -> bool;
    fn equal_cookie(&mut self, name: &str, value: &str) -> bool;
    fn exists_cookie(&mut self, name: &str) -> bool;
    fn greater_than_cookie(&mut self, name: &str, than: i64) -> bool;
    fn greater_than_after_cookie(&mut self, name: &str, marker: &str, than: i64) -> bool;
    fn less_than_cookie(&mut self, name: &str, than: i64) -> bool;
    fn less_than_after_cookie(&mut self, name: &str, marker: &str, than: i64) -> bool;
    fn not_equal_cookie(&mut self, name: &str, value: &str) -> bool {
        self.exists_cookie(name) && !self.equal_cookie(name, value)
    }
    fn starts_with_cookie(&mut self, name: &str, value: &str, at: u32) -> bool;
}

impl<B: Backend + ?Sized> Backend for &mut B {
    fn print_error(&mut self, message: &str, tag: Option<&str>) {
        (**self).print_error(message, tag);
    }
    fn print_debug(&mut self, message: &str, tag: Option<&str>) {
        (**self).print_debug(message, tag);
    }
    fn is_method(&mut self, method: &str) -> bool {
        (**self).is_method(method)
    }
    fn is_scheme(&mut self, scheme: &str) -> bool {
        (**self).is_scheme(scheme)
    }
    fn contains_domain(&mut self, value: &str) -> bool {
        (**self).contains_domain(value)
    }
    fn equal_domain(&mut self, value: &str) -> bool {
        (**self).equal_domain(value)
    }
    fn not_equal_domain(&mut self, value: &str) -> bool {
        (**self).not_equal_domain(value)
    }
    fn starts_with_domain(&mut self, value: &str, at: u32) -> bool {
        (**self).starts_with_domain(value, at)
    }
    fn contains_path(&mut self, value: &str) -> bool {
        (**self).contains_path(value)
    }
    fn equal_path(&mut self, value: &str) -> bool {
        (**self).equal_path(value)
    }
    fn not_equal_path(&mut self, value: &str) -> bool {
        (**self).not_equal_path(value)
    }
    fn starts_with_path(&mut self, value: &str, at: u32) -> bool {
        (**self).starts_with_path(value, at)
    }
    fn contains_query_parameter(&mut self, name: &str, value: &str) -> bool {
        (**self).contains_query_parameter(name, value)
    }
    fn equal_query_parameter(&mut self, name: &str, value: &str) -> bool {
        (**self).equal_query_parameter(name, value)
    }
    fn exists_query_parameter(&mut self, name: &str) -> bool {
        (**self).exists_query_parameter(name)
    }
    fn greater_than_query_parameter(&mut self, name: &str, than: i64) -> bool {
        (**self).greater_than_query_parameter(name, than)
    }
    fn greater_than_after_query_parameter(&mut self, name: &str, marker: &str, than: i64) -> bool {
        (**self).greater_than_after_query_parameter(name, marker, than)
    }
    fn less_than_query_parameter(&mut self, name: &str, than: i64) -> bool {
        (**self).less_than_query_parameter(name, than)
    }
    fn less_than_after_query_parameter(&mut self, name: &str, marker: &str, than: i64) -> bool {
        (**self).less_than_after_query_parameter(name, marker, than)
    }
    fn not_equal_query_parameter(&mut self, name: &str, value: &str) -> bool {
        (**self).not_equal_query_parameter(name, value)
    }
    fn starts_with_query_parameter(&mut self, name: &str, value: &str, at: u32) -> bool {
        (**self).starts_with_query_parameter(name, value, at)
    }
    fn contains_header(&mut self, name: &str, value: &str) -> bool {
        (**self).contains_header(name, value)
    }
    fn equal_header(&mut self, name: &str, value: &str) -> bool {
        (**self).equal_header(name, value)
    }
    fn exists_header(&mut self, name: &str) -> bool {
        (**self).exists_header(name)
    }
    fn greater_than_header(&mut self, name: &str, than: i64) -> bool {
        (**self).greater_than_header(name, than)
    }
    fn greater_than_after_header(&mut self, name: &str, marker: &str, than: i64) -> bool {
        (**self).greater_than_after_header(name, marker, than)
    }
    fn less_than_header(&mut self, name: &str, than: i64) -> bool {
        (**self).less_than_header(name, than)
    }
    fn less_than_after_header(&mut self, name: &str, marker: &str, than: i64) -> bool {
        (**self).less_than_after_header(name, marker, than)
    }
    fn not_equal_header(&mut self, name: &str, value: &str) -> bool {
        (**self).not_equal_header(name, value)
    }
    fn starts_with_header(&mut self, name: &str, value: &str, at: u32) -> bool {
        (**self).starts_with_header(name, value, at)
    }
    fn contains_cookie(&mut self, name: &str, value: &str) -> bool {
        (**self).contains_cookie(name, value)
    }
    fn equal_cookie(&mut self, name: &str, value: &str) -> bool {
        (**self).equal_cookie(name, value)
    }
    fn exists_cookie(&mut self, name: &str) -> bool {
        (**self).exists_cookie(name)
    }
    fn greater_than_cookie(&mut self, name: &str, than: i64) -> bool {
        (**self).greater_than_cookie(name, than)
    }
    fn greater_than_after_cookie(&mut self, name: &str, marker: &str, than: i64) -> bool {
        (**self).greater_than_after_cookie(name, marker, than)
    }
    fn less_than_cookie(&mut self, name: &str, than: i64) -> bool {
        (**self).less_than_cookie(name, than)
    }
    fn less_than_after_cookie(&mut self, name: &str, marker: &str, than: i64) -> bool {
        (**self).less_than_after_cookie(name, marker, than)
    }
    fn not_equal_cookie(&mut self, name: &str, value: &str) -> bool {
        (**self).not_equal_cookie(name, value)
    }
    fn starts_with_cookie(&mut self, name: &str, value: &str, at: u32) -> bool {
        (**self).starts_with_cookie(name, value, at)
    }
}

/// Backend that answers `true` to every predicate and discards prints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoopBackend;

impl Backend for NoopBackend {
    fn print_error(&mut self, _: &str, _: Option<&str>) {}
    fn print_debug(&mut self, _: &str, _: Option<&str>) {}
    fn is_method(&mut self, _: &str) -> bool {
        true
    }
    fn is_scheme(&mut self, _: &str) -> bool {
        true
    }
    fn contains_domain(&mut self, _: &str) -> bool {
        true
    }
    fn equal_domain(&mut self, _: &str) -> bool {
        true
    }
    fn not_equal_domain(&mut self, _: &str) -> bool {
        true
    }
    fn starts_with_domain(&mut self, _: &str, _: u32) -> bool {
        true
    }
    fn contains_path(&mut self, _: &str) -> bool {
        true
    }
    fn equal_path(&mut self, _: &str) -> bool {
        true
    }
    fn not_equal_path(&mut self, _: &str) -> bool {
        true
    }
    fn starts_with_path(&mut self, _: &str, _: u32) -> bool {
        true
    }
    fn contains_query_parameter(&mut self, _: &str, _: &str) -> bool {
        true
    }
    fn equal_query_parameter(&mut self, _: &str, _: &str) -> bool {
        true
    }
    fn exists_query_parameter(&mut self, _: &str) -> bool {
        true
    }
    fn greater_than_query_parameter(&mut self, _: &str, _: i64) -> bool {
        true
    }
    fn greater_than_after_query_parameter(&mut self, _: &str, _: &str, _: i64) -> bool {
        true
    }
    fn less_than_query_parameter(&mut self, _: &str, _: i64) -> bool {
        true
    }
    fn less_than_after_query_parameter(&mut self, _: &str, _: &str, _: i64) -> bool {
        true
    }
    fn not_equal_query_parameter(&mut self, _: &str, _: &str) -> bool {
        true
    }
    fn starts_with_query_parameter(&mut self, _: &str, _: &str, _: u32) -> bool {
        true
    }
    fn contains_header(&mut self, _: &str, _: &str) -> bool {
        true
    }
    fn equal_header(&mut self, _: &str, _: &str) -> bool {
        true
    }
    fn exists_header(&mut self, _: &str) -> bool {
        true
    }
    fn greater_than_header(&mut self, _: &str, _: i64) -> bool {
        true
    }
    fn greater_than_after_header(&mut self, _: &str, _: &str, _: i64) -> bool {
        true
    }
    fn less_than_header(&mut self, _: &str, _: i64) -> bool {
        true
    }
    fn less_than_after_header(&mut self, _: &str, _: &str, _: i64) -> bool {
        true
    }
    fn not_equal_header(&mut self, _: &str, _: &str) -> bool {
        true
    }
    fn starts_with_header(&mut self, _: &str, _: &str, _: u32) -> bool {
        true
    }
    fn contains_cookie(&mut self, _: &str, _: &str) -> bool {
        true
    }
    fn equal_cookie(&mut self, _: &str, _: &str) -> bool {
        true
    }
    fn exists_cookie(&mut self, _: &str) -> bool {
        true
    }
    fn greater_than_cookie(&mut self, _: &str, _: i64) -> bool {
        true
    }
    fn greater_than_after_cookie(&mut self, _: &str, _: &str, _: i64) -> bool {
        true
    }
    fn less_than_cookie(&mut self, _: &str, _: i64) -> bool {
        true
    }
    fn less_than_after_cookie(&mut self, _: &str, _: &str, _: i64) -> bool {
        true
    }
    fn not_equal_cookie(&mut self, _: &str, _: &str) -> bool {
        true
    }
    fn starts_with_cookie(&mut self, _: &str, _: &str, _: u32) -> bool {
        true
    }
}

/// Debugging backend.
///
/// Delegates predicates to an inner backend and writes one line per answer
/// (`exists_header(host) = true`) to `output`. Debug prints go to `output`
/// and error prints to `error`, each as `"[tag ]message"`. Write failures
/// are reported as `warn` events on `reqfilter::console` and never change
/// an answer.
#[derive(Debug)]
pub struct ConsoleBackend<B = NoopBackend, O = io::Stdout, E = io::Stderr> {
    inner: B,
    output: O,
    error: E,
}

impl ConsoleBackend {
    /// Always-true backend that writes to stdout and stderr.
    #[must_use]
    pub fn stdio() -> Self {
        Self::new(NoopBackend, io::stdout(), io::stderr())
    }
}

impl<B, O: Write, E: Write> ConsoleBackend<B, O, E> {
    pub fn new(inner: B, output: O, error: E) -> Self {
        Self {
            inner,
            output,
            error,
        }
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    pub fn error(&self) -> &E {
        &self.error
    }

    pub fn into_parts(self) -> (B, O, E) {
        (self.inner, self.output, self.error)
    }

    fn log(&mut self, predicate: &str, args: &[&dyn Display], answer: bool) -> bool {
        let args: Vec<String> = args.iter().map(ToString::to_string).collect();
        if let Err(err) = writeln!(self.output, "{predicate}({}) = {answer}", args.join(", ")) {
            warn!(target: "reqfilter::console", %err, predicate, "dropped predicate log line");
        }
        answer
    }
}

fn print_line(sink: &mut impl Write, message: &str, tag: Option<&str>) {
    let written = match tag {
        Some(tag) => writeln!(sink, "{tag} {message}"),
        None => writeln!(sink, "{message}"),
    };
    if let Err(err) = written {
        warn!(target: "reqfilter::console", %err, message, "dropped print line");
    }
}

macro_rules! logged {
    ($($method:ident($($arg:ident: $ty:ty),*);)*) => {
        $(
            fn $method(&mut self, $($arg: $ty),*) -> bool {
                let answer = self.inner.$method($($arg),*);
                self.log(stringify!($method), &[$(&$arg),*], answer)
            }
        )*
    };
}

impl<B: Backend, O: Write, E: Write> Backend for ConsoleBackend<B, O, E> {
    fn print_error(&mut self, message: &str, tag: Option<&str>) {
        print_line(&mut self.error, message, tag);
        self.inner.print_error(message, tag);
    }

    fn print_debug(&mut self, message: &str, tag: Option<&str>) {
        print_line(&mut self.output, message, tag);
        self.inner.print_debug(message, tag);
    }

    logged! {
        is_method(method: &str);
        is_scheme(scheme: &str);
        contains_domain(value: &str);
        equal_domain(value: &str);
        not_equal_domain(value: &str);
        starts_with_domain(value: &str, at: u32);
        contains_path(value: &str);
        equal_path(value: &str);
        not_equal_path(value: &str);
        starts_with_path(value: &str, at: u32);
        contains_query_parameter(name: &str, value: &str);
        equal_query_parameter(name: &str, value: &str);
        exists_query_parameter(name: &str);
        greater_than_query_parameter(name: &str, than: i64);
        greater_than_after_query_parameter(name: &str, marker: &str, than: i64);
        less_than_query_parameter(name: &str, than: i64);
        less_than_after_query_parameter(name: &str, marker: &str, than: i64);
        not_equal_query_parameter(name: &str, value: &str);
        starts_with_query_parameter(name: &str, value: &str, at: u32);
        contains_header(name: &str, value: &str);
        equal_header(name: &str, value: &str);
        exists_header(name: &str);
        greater_than_header(name: &str, than: i64);
        greater_than_after_header(name: &str, marker: &str, than: i64);
        less_than_header(name: &str, than: i64);
        less_than_after_header(name: &str, marker: &str, than: i64);
        not_equal_header(name: &str, value: &str);
        starts_with_header(name: &str, value: &str, at: u32);
        contains_cookie(name: &str, value: &str);
        equal_cookie(name: &str, value: &str);
        exists_cookie(name: &str);
        greater_than_cookie(name: &str, than: i64);
        greater_than_after_cookie(name: &str, marker: &str, than: i64);
        less_than_cookie(name: &str, than: i64);
        less_than_after_cookie(name: &str, marker: &str, than: i64);
        not_equal_cookie(name: &str, value: &str);
        starts_with_cookie(name: &str, value: &str, at: u32);
    }
}
