use std::{
    ffi::OsString,
    fmt::{Display, Write},
    fs::File,
    io::{self, stdin, Stdin},
    path::PathBuf,
};

/// A file path, or `-` for the standard streams
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PathOrDash {
    Path(PathBuf),
    Dash,
}

impl PathOrDash {
    /// Name to use in diagnostics
    pub(crate) fn name(&self) -> String {
        match self {
            PathOrDash::Path(path) => path.display().to_string(),
            PathOrDash::Dash => "<stdin>".to_owned(),
        }
    }
}

impl From<OsString> for PathOrDash {
    fn from(value: OsString) -> Self {
        if value == "-" {
            Self::Dash
        } else {
            Self::Path(PathBuf::from(value))
        }
    }
}

impl Display for PathOrDash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathOrDash::Path(path) => path.display().fmt(f),
            PathOrDash::Dash => f.write_char('-'),
        }
    }
}

#[derive(Debug)]
pub(crate) enum FileOrStdin {
    File(File),
    Stdin(Stdin),
}

impl FileOrStdin {
    pub(crate) fn open(path: &PathOrDash) -> io::Result<Self> {
        match path {
            PathOrDash::Path(path) => File::open(path).map(Self::File),
            PathOrDash::Dash => Ok(Self::Stdin(stdin())),
        }
    }
}

impl std::io::Read for FileOrStdin {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            FileOrStdin::File(f) => f.read(buf),
            FileOrStdin::Stdin(s) => s.read(buf),
        }
    }

    fn read_to_end(&mut self, buf: &mut Vec<u8>) -> io::Result<usize> {
        match self {
            FileOrStdin::File(f) => f.read_to_end(buf),
            FileOrStdin::Stdin(s) => s.read_to_end(buf),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dash_is_stdin() {
        assert_eq!(PathOrDash::from(OsString::from("-")), PathOrDash::Dash);
        assert_eq!(PathOrDash::Dash.name(), "<stdin>");
        assert_eq!(PathOrDash::Dash.to_string(), "-");
    }

    #[test]
    fn paths_are_kept() {
        let path = PathOrDash::from(OsString::from("day9.txt"));
        assert_eq!(path, PathOrDash::Path(PathBuf::from("day9.txt")));
        assert_eq!(path.name(), "day9.txt");
    }
}
