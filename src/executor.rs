use crate::error::Error;
use crate::hasher::digest::read_chunk;
use crate::hasher::DEFAULT_CHUNK_SIZE;
use crate::model::{Action, ActionKind, Transform};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use tracing::debug;

/// Applies planned actions to the filesystem.
///
/// Destinations are never overwritten: an action whose destination already
/// exists fails with `AlreadyExists`. Moves are plain renames, so source and
/// destination must share a filesystem. `transform` writes the transformed
/// bytes to the destination and leaves the source alone.
#[derive(Debug, Clone, Default)]
pub struct Executor {
    xor_key: Option<Vec<u8>>,
}

impl Executor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_xor_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        let key = key.into();
        self.xor_key = (!key.is_empty()).then_some(key);
        self
    }

    /// Reject a plan this executor could not finish, before anything is
    /// applied.
    pub fn check<'a>(&self, actions: impl IntoIterator<Item = &'a Action>) -> Result<(), Error> {
        if self.xor_key.is_some() {
            return Ok(());
        }
        match actions
            .into_iter()
            .find(|a| a.kind == ActionKind::Transform && a.transform == Transform::Xor)
        {
            Some(action) => Err(Error::Argument(format!(
                "xor transform planned for {} but no key was given",
                action.src.display()
            ))),
            None => Ok(()),
        }
    }

    pub fn apply(&self, action: &Action) -> Result<(), Error> {
        match action.kind {
            ActionKind::Skip => Ok(()),
            ActionKind::Delete => fs::remove_file(&action.src)
                .map_err(|err| Error::io_at(&action.src, "deleting", err)),
            ActionKind::Move => {
                let dst = prepare_destination(action)?;
                fs::rename(&action.src, dst).map_err(|err| {
                    Error::io_at(&action.src, &format!("moving to {}", dst.display()), err)
                })
            }
            ActionKind::Copy => {
                let dst = prepare_destination(action)?;
                self.write_copy(&action.src, dst, None)
            }
            ActionKind::Transform => {
                let dst = prepare_destination(action)?;
                let key = match action.transform {
                    Transform::None => None,
                    Transform::Xor => Some(self.xor_key.as_deref().ok_or_else(|| {
                        Error::Argument("xor transform requested without a key".to_string())
                    })?),
                };
                self.write_copy(&action.src, dst, key)
            }
        }
    }

    fn write_copy(&self, src: &Path, dst: &Path, xor_key: Option<&[u8]>) -> Result<(), Error> {
        let mut reader = File::open(src).map_err(|err| Error::io_at(src, "opening", err))?;
        let mut writer = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(dst)
            .map_err(|err| Error::io_at(dst, "creating", err))?;

        let mut buf = vec![0u8; DEFAULT_CHUNK_SIZE];
        let mut offset = 0usize;
        loop {
            let n = read_chunk(&mut reader, &mut buf)
                .map_err(|err| Error::io_at(src, "reading", err))?;
            if n == 0 {
                break;
            }
            if let Some(key) = xor_key {
                xor_in_place(&mut buf[..n], key, offset);
            }
            writer
                .write_all(&buf[..n])
                .map_err(|err| Error::io_at(dst, "writing", err))?;
            offset = offset.wrapping_add(n);
        }
        writer.flush().map_err(|err| Error::io_at(dst, "flushing", err))?;
        debug!("Wrote {} bytes to {}", offset, dst.display());
        Ok(())
    }
}

/// Check the destination is free and create its parent directories.
fn prepare_destination(action: &Action) -> Result<&Path, Error> {
    let dst = action.dst.as_deref().ok_or_else(|| {
        Error::Argument(format!(
            "{} action for {} has no destination",
            action.kind,
            action.src.display()
        ))
    })?;

    if fs::symlink_metadata(dst).is_ok() {
        return Err(Error::Io(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("Refusing to overwrite {}", dst.display()),
        )));
    }
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).map_err(|err| Error::io_at(parent, "creating", err))?;
    }
    Ok(dst)
}

/// XOR `data` with a repeating `key`, where `data` starts `offset` bytes into
/// the stream.
pub fn xor_in_place(data: &mut [u8], key: &[u8], offset: usize) {
    if key.is_empty() {
        return;
    }
    let len = key.len();
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= key[(offset + i) % len];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn move_creates_parents_and_relocates() {
        let tmp = tempdir().unwrap();
        let src = tmp.path().join("a.txt");
        let dst = tmp.path().join("out/deep/a.txt");
        fs::write(&src, "hi").unwrap();

        Executor::new()
            .apply(&Action::move_file(&src).with_dst(&dst))
            .unwrap();
        assert!(!src.exists());
        assert_eq!(fs::read_to_string(&dst).unwrap(), "hi");
    }

    #[test]
    fn existing_destination_is_never_overwritten() {
        let tmp = tempdir().unwrap();
        let src = tmp.path().join("a.txt");
        let dst = tmp.path().join("b.txt");
        fs::write(&src, "new").unwrap();
        fs::write(&dst, "old").unwrap();

        for action in [
            Action::move_file(&src).with_dst(&dst),
            Action::copy_file(&src).with_dst(&dst),
        ] {
            match Executor::new().apply(&action) {
                Err(Error::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::AlreadyExists),
                other => panic!("expected AlreadyExists, got {:?}", other),
            }
        }
        assert_eq!(fs::read_to_string(&src).unwrap(), "new");
        assert_eq!(fs::read_to_string(&dst).unwrap(), "old");
    }

    #[test]
    fn copy_leaves_source() {
        let tmp = tempdir().unwrap();
        let src = tmp.path().join("a");
        let dst = tmp.path().join("c/a");
        fs::write(&src, vec![7u8; 300_000]).unwrap();
        Executor::new()
            .apply(&Action::copy_file(&src).with_dst(&dst))
            .unwrap();
        assert_eq!(fs::read(&src).unwrap(), fs::read(&dst).unwrap());
    }

    #[test]
    fn delete_and_skip() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("x.tmp");
        fs::write(&path, "x").unwrap();
        Executor::new().apply(&Action::skip(&path)).unwrap();
        assert!(path.exists());
        Executor::new().apply(&Action::delete(&path)).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn xor_transform_round_trips_across_chunks() {
        let tmp = tempdir().unwrap();
        let src = tmp.path().join("plain");
        let enc = tmp.path().join("enc");
        let dec = tmp.path().join("dec");
        let data: Vec<u8> = (0..(DEFAULT_CHUNK_SIZE + 1234)).map(|i| (i % 256) as u8).collect();
        fs::write(&src, &data).unwrap();

        let executor = Executor::new().with_xor_key(b"key!!".to_vec());
        executor
            .apply(&Action::transform(&src, Transform::Xor).with_dst(&enc))
            .unwrap();
        let encoded = fs::read(&enc).unwrap();
        assert_ne!(encoded, data);
        assert_eq!(encoded[0], data[0] ^ b'k');

        executor
            .apply(&Action::transform(&enc, Transform::Xor).with_dst(&dec))
            .unwrap();
        assert_eq!(fs::read(&dec).unwrap(), data);
        assert!(src.exists());
    }

    #[test]
    fn xor_without_key_is_rejected() {
        let tmp = tempdir().unwrap();
        let src = tmp.path().join("plain");
        fs::write(&src, "x").unwrap();
        let action = Action::transform(&src, Transform::Xor).with_dst(tmp.path().join("out"));
        assert!(matches!(
            Executor::new().with_xor_key(Vec::new()).apply(&action),
            Err(Error::Argument(_))
        ));
    }

    #[test]
    fn check_rejects_xor_plan_without_key() {
        let plan = vec![
            Action::move_file("/s/a").with_dst("/d/a"),
            Action::transform("/s/b", Transform::Xor).with_dst("/d/b"),
        ];
        assert!(matches!(Executor::new().check(&plan), Err(Error::Argument(_))));
        assert!(Executor::new().with_xor_key(b"k".to_vec()).check(&plan).is_ok());
        assert!(Executor::new().check(&plan[..1]).is_ok());
    }

    #[test]
    fn missing_destination_is_an_argument_error() {
        assert!(matches!(
            Executor::new().apply(&Action::move_file("/nowhere")),
            Err(Error::Argument(_))
        ));
    }

    #[test]
    fn xor_offset_continues_the_key() {
        let mut whole = *b"abcdefgh";
        xor_in_place(&mut whole, b"xyz", 0);

        let mut split = *b"abcdefgh";
        let (head, tail) = split.split_at_mut(5);
        xor_in_place(head, b"xyz", 0);
        xor_in_place(tail, b"xyz", 5);
        assert_eq!(whole, split);
    }
}
