//! Text form of intcode programs: decimal integers separated by commas

use std::{num::ParseIntError, ops::Range};

use errors::{Accumulator, Multiple, RootAccumulator, SourceError, Spanned};
use itertools::Itertools;
use thiserror::Error;

use crate::VMInt;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseErr {
    #[error("`{token}` is not a valid integer: {reason}")]
    InvalidInt {
        token: String,
        span: Range<usize>,
        reason: ParseIntError,
    },
    #[error("Missing value between commas")]
    MissingValue { span: Range<usize> },
}

impl Spanned for ParseErr {
    fn span(&self) -> Range<usize> {
        match self {
            ParseErr::InvalidInt { span, .. } | ParseErr::MissingValue { span } => span.clone(),
        }
    }
}
impl SourceError for ParseErr {}

/// Parse a program, reporting every malformed value
///
/// A source made only of whitespace is the empty program.
pub fn parse(source: &str) -> Result<Vec<VMInt>, Multiple<ParseErr>> {
    if source.trim().is_empty() {
        return Ok(vec![]);
    }
    let mut errors = RootAccumulator::<ParseErr>::new();
    let mut program = vec![];
    let mut start = 0;
    for token in source.split(',') {
        let end = start + token.len();
        let trimmed = token.trim();
        // position of the trimmed token inside the source
        let offset = start + (token.len() - token.trim_start().len());
        let span = offset..offset + trimmed.len();
        if trimmed.is_empty() {
            errors.push(ParseErr::MissingValue { span: start..end });
        } else if let Some(value) = errors.handle(trimmed.parse::<VMInt>().map_err(|reason| {
            ParseErr::InvalidInt {
                token: trimmed.to_owned(),
                span,
                reason,
            }
        })) {
            program.push(value)
        }
        start = end + 1;
    }
    errors.finish_with(program)
}

/// Write a program in its text form
pub fn to_source(code: &[VMInt]) -> String {
    code.iter().format(",").to_string()
}
