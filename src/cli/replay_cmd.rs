//! `replay`: print recoverable records.

use std::path::Path;

use crate::record::RECORD_SEPARATOR;
use crate::store::replay::{replay_dir, replay_file, LogContents};

/// Returns the process exit code.
pub fn run_replay(target: &Path) -> i32 {
    let result = if target.is_dir() {
        replay_dir(target)
    } else {
        replay_file(target).map(|contents| vec![contents])
    };
    match result {
        Ok(files) => {
            print!("{}", render(&files));
            0
        }
        Err(e) => {
            eprintln!("Cannot replay {}: {}", target.display(), e);
            1
        }
    }
}

fn render(files: &[LogContents]) -> String {
    let mut out = String::new();
    for file in files {
        for record in &file.records {
            out.push_str(RECORD_SEPARATOR);
            out.push_str(record);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::EntryKind;
    use std::path::PathBuf;

    #[test]
    fn rendered_records_keep_separators() {
        let files = vec![LogContents {
            path: PathBuf::from("a.log"),
            kind: EntryKind::Log,
            valid_bytes: 0,
            records: vec!["one\n".into(), "two\n".into()],
        }];
        let text = render(&files);
        assert_eq!(text.matches(RECORD_SEPARATOR).count(), 2);
        assert!(text.ends_with("two\n"));
    }

    #[test]
    fn missing_target_fails() {
        assert_eq!(run_replay(Path::new("/nonexistent/issues.log")), 1);
    }
}
