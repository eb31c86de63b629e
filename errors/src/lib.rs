//! Utilities to collect multiple errors, and to report errors pointing into a source text
use std::{error::Error, fmt::Display, io, ops::Range};

use codespan_reporting::{
    diagnostic::{Diagnostic, Label},
    files::SimpleFile,
    term::{
        self,
        termcolor::{ColorChoice, StandardStream, WriteColor},
    },
};
use nonempty::{nonempty, NonEmpty};

/// One or more errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Multiple<Error> {
    pub childs: NonEmpty<Error>,
}

impl<E> Multiple<E> {
    pub fn len(&self) -> usize {
        self.childs.len()
    }
    pub fn first(&self) -> &E {
        self.childs.first()
    }
    pub fn iter(&self) -> impl Iterator<Item = &E> {
        self.childs.iter()
    }
}

impl<E> From<E> for Multiple<E> {
    fn from(value: E) -> Self {
        Self {
            childs: nonempty![value],
        }
    }
}

impl<E> IntoIterator for Multiple<E> {
    type Item = E;

    type IntoIter = <NonEmpty<E> as IntoIterator>::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.childs.into_iter()
    }
}

impl<E: Display> Display for Multiple<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, err) in self.childs.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

impl<E: Error> Error for Multiple<E> {}

#[derive(Debug, Clone)]
pub struct RootAccumulator<Error> {
    errors: Vec<Error>,
}

impl<E> Default for RootAccumulator<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> RootAccumulator<E> {
    pub fn new() -> Self {
        RootAccumulator { errors: vec![] }
    }

    pub fn finish_with<T>(self, t: T) -> Result<T, Multiple<E>> {
        match NonEmpty::from_vec(self.errors) {
            None => Ok(t),
            Some(childs) => Err(Multiple { childs }),
        }
    }
}

impl<E> Accumulator for RootAccumulator<E> {
    type Error = E;

    fn push<EI: Into<Self::Error>>(&mut self, err: EI) {
        self.errors.push(err.into())
    }
}

// Accumulator trait

pub trait Accumulator {
    type Error;

    fn push<EI: Into<Self::Error>>(&mut self, err: EI);

    fn handle<T, EI: Into<Self::Error>>(&mut self, res: Result<T, EI>) -> Option<T> {
        match res {
            Ok(t) => Some(t),
            Err(e) => {
                self.push(e);
                None
            }
        }
    }
}

// Span stuff

pub trait Spanned {
    fn span(&self) -> Range<usize>;
}

pub use codespan_reporting::diagnostic::Severity;
pub trait SourceError: Error + Spanned {
    fn severity(&self) -> Severity {
        Severity::Error
    }
    fn into_diagnostic<F>(self, file_id: F) -> Diagnostic<F>
    where
        Self: Sized,
    {
        Diagnostic::new(self.severity())
            .with_message(self.to_string())
            .with_labels(vec![Label::primary(file_id, self.span())])
    }
}

/// Render every error as a diagnostic pointing into `source`
pub fn emit_to<W, E>(
    writer: &mut W,
    name: &str,
    source: &str,
    errs: impl IntoIterator<Item = E>,
) -> io::Result<()>
where
    W: WriteColor,
    E: SourceError,
{
    let file = SimpleFile::new(name, source);
    let config = term::Config::default();
    for err in errs {
        term::emit(writer, &config, &file, &err.into_diagnostic(()))
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err.to_string()))?;
    }
    Ok(())
}

/// Render every error on stderr
pub fn emit<E: SourceError>(
    name: &str,
    source: &str,
    errs: impl IntoIterator<Item = E>,
) -> io::Result<()> {
    let mut stderr = StandardStream::stderr(ColorChoice::Auto);
    emit_to(&mut stderr, name, source, errs)
}
