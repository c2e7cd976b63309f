use std::io;

use annotate_snippets::{AnnotationKind, Group, Level, Renderer, Snippet};
use smol_str::SmolStr;
use thiserror::Error;

use opscript_codegen::ProcessError;
use opscript_ir::{SourceLoc, Span};

use crate::syntax::Rule;

/// Everything `preprocess` can fail with. Helper-raised errors carry the
/// helper's public name and the call site the user wrote.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Syntax(Box<pest::error::Error<Rule>>),

    #[error("number out of bounds")]
    NumberOutOfBounds(Span),

    #[error("`{name}` is not defined (at {loc})")]
    Undefined {
        name: SmolStr,
        span: Span,
        loc: SourceLoc,
    },

    #[error("unknown helper `{name}()` (at {loc})")]
    UnknownHelper {
        name: SmolStr,
        span: Span,
        loc: SourceLoc,
    },

    #[error("`{name}` is a helper and cannot be reassigned")]
    ReservedName { name: SmolStr, span: Span },

    #[error("constant `{name}` cannot be reassigned")]
    ConstReassigned { name: SmolStr, span: Span },

    /// Bad value handed to a helper: wrong type, too large, malformed hex.
    #[error("{msg} in call to `{helper}()` (at {loc})")]
    InputValidation {
        helper: SmolStr,
        msg: String,
        span: Span,
        loc: SourceLoc,
    },

    /// The exact width complaint of the `pushN` family.
    #[error("Function {helper}() expected {expected} bytes but received {actual}")]
    PushWidth {
        helper: SmolStr,
        expected: usize,
        actual: usize,
        span: Span,
        loc: SourceLoc,
    },

    /// Misuse of Action composition: raw data expected, double adoption,
    /// textual-order violations.
    #[error("{msg} in call to `{helper}()` (at {loc})")]
    Composition {
        helper: SmolStr,
        msg: String,
        span: Span,
        loc: SourceLoc,
    },

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("failed to read script: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn span(&self) -> Option<Span> {
        match self {
            Error::Syntax(err) => Some(match err.location {
                pest::error::InputLocation::Pos(p) => Span(p as u32, p as u32),
                pest::error::InputLocation::Span((s, e)) => Span(s as u32, e as u32),
            }),
            Error::NumberOutOfBounds(span)
            | Error::Undefined { span, .. }
            | Error::UnknownHelper { span, .. }
            | Error::ReservedName { span, .. }
            | Error::ConstReassigned { span, .. }
            | Error::InputValidation { span, .. }
            | Error::PushWidth { span, .. }
            | Error::Composition { span, .. } => Some(*span),
            Error::Process(_) | Error::Io(_) => None,
        }
    }

    /// Renders the error against the script source, annotated at the
    /// offending span when one is known.
    pub fn print(
        &self,
        mut w: impl io::Write,
        path: &str,
        content: &str,
        colors: bool,
    ) -> io::Result<()> {
        let label = self.to_string();
        let rend = if colors {
            Renderer::styled()
        } else {
            Renderer::plain()
        };
        let disp = match self.span() {
            Some(span) => {
                let snippet = Level::ERROR.primary_title("compile error").element(
                    Snippet::source(content)
                        .line_start(1)
                        .path(path)
                        .fold(true)
                        .annotation(
                            AnnotationKind::Primary
                                .span(span.as_range())
                                .label(label.as_str()),
                        ),
                );
                rend.render(&[snippet])
            }
            None => rend.render(&[Group::with_title(Level::ERROR.primary_title(label.as_str()))]),
        };
        writeln!(w, "{disp}")
    }

    pub fn print_to_string(&self, path: &str, content: &str, colors: bool) -> String {
        let mut v = vec![];
        self.print(&mut v, path, content, colors)
            .expect("write to vec cannot fail");
        String::from_utf8(v).expect("renderer emits utf-8")
    }
}
