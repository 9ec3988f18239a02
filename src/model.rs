use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

/// Set on an action whose natural destination was taken and which was
/// renamed to `<fingerprint>-<name>`.
pub const FLAG_COLLISION_RENAMED: u64 = 1 << 0;

/// Snapshot of a file taken at crawl time. Never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub path: PathBuf,
    pub size: u64,
    /// Seconds since the unix epoch, 0 when the platform can't tell.
    pub mtime: u64,
    pub is_regular: bool,
    pub is_symlink: bool,
}

impl FileRecord {
    pub fn from_metadata(path: &Path, metadata: &Metadata, is_symlink: bool) -> Self {
        let mtime = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0);

        Self {
            path: path.to_path_buf(),
            size: metadata.len(),
            mtime,
            is_regular: metadata.is_file(),
            is_symlink,
        }
    }

    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Skip,
    Copy,
    Move,
    Delete,
    Transform,
}

impl ActionKind {
    /// Kinds that write somewhere and therefore need a destination.
    pub fn needs_destination(self) -> bool {
        matches!(self, ActionKind::Copy | ActionKind::Move | ActionKind::Transform)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActionKind::Skip => "skip",
            ActionKind::Copy => "copy",
            ActionKind::Move => "move",
            ActionKind::Delete => "delete",
            ActionKind::Transform => "transform",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transform {
    #[default]
    None,
    Xor,
}

/// One planned filesystem mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub kind: ActionKind,
    pub transform: Transform,
    pub src: PathBuf,
    pub dst: Option<PathBuf>,
    pub flags: u64,
}

impl Action {
    pub fn new(kind: ActionKind, src: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            transform: Transform::None,
            src: src.into(),
            dst: None,
            flags: 0,
        }
    }

    pub fn skip(src: impl Into<PathBuf>) -> Self {
        Self::new(ActionKind::Skip, src)
    }

    pub fn move_file(src: impl Into<PathBuf>) -> Self {
        Self::new(ActionKind::Move, src)
    }

    pub fn copy_file(src: impl Into<PathBuf>) -> Self {
        Self::new(ActionKind::Copy, src)
    }

    pub fn delete(src: impl Into<PathBuf>) -> Self {
        Self::new(ActionKind::Delete, src)
    }

    pub fn transform(src: impl Into<PathBuf>, transform: Transform) -> Self {
        Self {
            transform,
            ..Self::new(ActionKind::Transform, src)
        }
    }

    pub fn with_dst(mut self, dst: impl Into<PathBuf>) -> Self {
        self.dst = Some(dst.into());
        self
    }

    pub fn with_flags(mut self, flags: u64) -> Self {
        self.flags |= flags;
        self
    }

    pub fn is_skip(&self) -> bool {
        self.kind == ActionKind::Skip
    }

    /// True when the action writes somewhere but nobody picked where yet.
    pub fn wants_mapping(&self) -> bool {
        self.kind.needs_destination() && self.dst.is_none()
    }
}

/// The plan-file line: `<src> -> <dst>` for moves, prefixed with the kind
/// for everything else.
impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.kind != ActionKind::Move {
            write!(f, "{} ", self.kind)?;
        }
        write!(f, "{}", self.src.display())?;
        if let Some(dst) = &self.dst {
            write!(f, " -> {}", dst.display())?;
        }
        if self.transform == Transform::Xor {
            f.write_str(" [xor]")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn move_line_has_no_kind_prefix() {
        let action = Action::move_file("/src/a.txt").with_dst("/dst/a.txt");
        assert_eq!(action.to_string(), "/src/a.txt -> /dst/a.txt");
    }

    #[test]
    fn other_kinds_are_prefixed() {
        assert_eq!(Action::delete("/src/x.tmp").to_string(), "delete /src/x.tmp");
        let copy = Action::copy_file("/a").with_dst("/b");
        assert_eq!(copy.to_string(), "copy /a -> /b");
        let xor = Action::transform("/a", Transform::Xor).with_dst("/b");
        assert_eq!(xor.to_string(), "transform /a -> /b [xor]");
    }

    #[test]
    fn mapping_only_wanted_for_writers_without_destination() {
        assert!(Action::move_file("/a").wants_mapping());
        assert!(!Action::move_file("/a").with_dst("/b").wants_mapping());
        assert!(!Action::delete("/a").wants_mapping());
        assert!(!Action::skip("/a").wants_mapping());
    }

    #[test]
    fn flags_accumulate() {
        let action = Action::move_file("/a").with_flags(FLAG_COLLISION_RENAMED).with_flags(1 << 4);
        assert_eq!(action.flags, FLAG_COLLISION_RENAMED | (1 << 4));
    }
}
