//! Guess the format of a program file from its extension and content

use std::ffi::OsStr;

use uncased::AsUncased;

use crate::{path_or_dash::PathOrDash, Format};

pub(crate) fn format(path: &PathOrDash, content: &[u8]) -> Format {
    if let PathOrDash::Path(path) = path {
        if let Some(ext) = path.extension().and_then(OsStr::to_str) {
            let ext = ext.as_uncased();
            if ext == "json" {
                return Format::Json;
            } else if ext == "yaml" || ext == "yml" {
                return Format::Yaml;
            }
        }
    }

    // a json list is never a valid source
    let maybe_json = content
        .iter()
        .copied()
        .take(100)
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|b| b == b'[');
    if maybe_json {
        Format::Json
    } else {
        Format::Source
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn path(p: &str) -> PathOrDash {
        PathOrDash::Path(PathBuf::from(p))
    }

    #[test]
    fn by_extension() {
        assert_eq!(format(&path("day9.json"), b""), Format::Json);
        assert_eq!(format(&path("day9.YAML"), b""), Format::Yaml);
        assert_eq!(format(&path("day9.Yml"), b""), Format::Yaml);
        assert_eq!(format(&path("day9.txt"), b"1,0,0,0,99"), Format::Source);
        assert_eq!(format(&path("day9"), b"1,0,0,0,99"), Format::Source);
    }

    #[test]
    fn by_content() {
        assert_eq!(format(&PathOrDash::Dash, b"  \n[1, 0, 0, 0, 99]"), Format::Json);
        assert_eq!(format(&PathOrDash::Dash, b"1,0,0,0,99\n"), Format::Source);
        assert_eq!(format(&path("input"), b"[99]"), Format::Json);
    }

    #[test]
    fn extension_wins() {
        assert_eq!(format(&path("prog.yaml"), b"[99]"), Format::Yaml);
    }
}
