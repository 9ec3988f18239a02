use crate::error::Error;
use crate::model::Action;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

const MAX_NAME_ATTEMPTS: usize = 1000;

/// Write one line per action to a new `run-<timestamp>.txt` in `dir`.
///
/// An existing plan is never overwritten; a second run within the same
/// second gets a numeric suffix.
pub fn write_plan(dir: &Path, actions: &[Action]) -> Result<PathBuf, Error> {
    fs::create_dir_all(dir).map_err(|err| Error::io_at(dir, "creating plan directory", err))?;

    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S").to_string();
    let (path, file) = create_unique(dir, &stamp)?;

    let mut out = BufWriter::new(file);
    for action in actions.iter().filter(|a| !a.is_skip()) {
        writeln!(out, "{}", action).map_err(|err| Error::io_at(&path, "writing", err))?;
    }
    out.flush().map_err(|err| Error::io_at(&path, "writing", err))?;

    info!("Dry run plan written to {}", path.display());
    Ok(path)
}

fn create_unique(dir: &Path, stamp: &str) -> Result<(PathBuf, File), Error> {
    for attempt in 0..MAX_NAME_ATTEMPTS {
        let name = if attempt == 0 {
            format!("run-{}.txt", stamp)
        } else {
            format!("run-{}-{}.txt", stamp, attempt)
        };
        let path = dir.join(name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(err) => return Err(Error::io_at(&path, "creating", err)),
        }
    }
    Err(Error::Io(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("No free plan file name in {}", dir.display()),
    )))
}

/// Read a plan file back as `(src, dst)` pairs for its move lines.
pub fn read_moves(path: &Path) -> io::Result<Vec<(PathBuf, PathBuf)>> {
    let text = fs::read_to_string(path)?;
    Ok(text
        .lines()
        .filter_map(|line| line.split_once(" -> "))
        .map(|(src, dst)| (PathBuf::from(src), PathBuf::from(dst)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn plan_lines_and_unique_names() {
        let tmp = tempdir().unwrap();
        let actions = vec![
            Action::move_file("/s/a.txt").with_dst("/d/a.txt"),
            Action::skip("/s/b.txt"),
            Action::move_file("/s/c.txt").with_dst("/d/c.txt"),
        ];

        let first = write_plan(tmp.path(), &actions).unwrap();
        let second = write_plan(tmp.path(), &actions).unwrap();
        assert_ne!(first, second);

        let text = fs::read_to_string(&first).unwrap();
        assert_eq!(text, "/s/a.txt -> /d/a.txt\n/s/c.txt -> /d/c.txt\n");
        assert_eq!(fs::read_to_string(&second).unwrap(), text);

        let moves = read_moves(&first).unwrap();
        assert_eq!(moves[1], (PathBuf::from("/s/c.txt"), PathBuf::from("/d/c.txt")));
    }

    #[test]
    fn empty_plan_is_an_empty_file() {
        let tmp = tempdir().unwrap();
        let path = write_plan(&tmp.path().join("plans"), &[]).unwrap();
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("run-"));
        assert_eq!(fs::read_to_string(path).unwrap(), "");
    }
}
