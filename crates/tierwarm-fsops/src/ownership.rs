//! Ownership and permission overrides for created directories and copied files.

use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use nix::unistd::{Gid, Group, Uid, User, chown};
use tracing::debug;

use crate::error::{FsOpsError, FsOpsResult};

/// Resolved ownership override (numeric ids plus display labels).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ownership {
    uid: Option<Uid>,
    gid: Option<Gid>,
    owner_label: Option<String>,
    group_label: Option<String>,
}

impl Ownership {
    /// Resolve owner and group specs given as names or numeric ids.
    ///
    /// # Errors
    ///
    /// Returns an error when a name cannot be looked up or does not exist.
    pub fn resolve(owner: Option<&str>, group: Option<&str>) -> FsOpsResult<Self> {
        let owner = owner.map(resolve_owner).transpose()?;
        let group = group.map(resolve_group).transpose()?;
        Ok(Self {
            uid: owner.as_ref().map(|(uid, _)| *uid),
            gid: group.as_ref().map(|(gid, _)| *gid),
            owner_label: owner.map(|(_, label)| label),
            group_label: group.map(|(_, label)| label),
        })
    }

    /// Whether any override is configured.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.uid.is_none() && self.gid.is_none()
    }

    /// `user:group` form accepted by `rsync --chown`, when any override is set.
    #[must_use]
    pub fn chown_spec(&self) -> Option<String> {
        let owner = self.uid.map(|uid| uid.as_raw().to_string());
        let group = self.gid.map(|gid| gid.as_raw().to_string());
        match (owner, group) {
            (None, None) => None,
            (Some(owner), None) => Some(owner),
            (None, Some(group)) => Some(format!(":{group}")),
            (Some(owner), Some(group)) => Some(format!("{owner}:{group}")),
        }
    }

    /// Apply the override to a single path.
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::Nix`] when `chown` fails.
    pub fn apply(&self, path: &Path) -> FsOpsResult<()> {
        if self.is_empty() {
            return Ok(());
        }
        chown(path, self.uid, self.gid).map_err(|err| FsOpsError::nix("ownership.chown", path, err))
    }

    /// Human readable summary for logs.
    #[must_use]
    pub fn describe(&self) -> String {
        match (&self.owner_label, &self.group_label) {
            (None, None) => "unchanged".to_string(),
            (Some(owner), None) => format!("owner={owner}"),
            (None, Some(group)) => format!("group={group}"),
            (Some(owner), Some(group)) => format!("owner={owner},group={group}"),
        }
    }
}

/// Creates destination directories with the configured mode and ownership.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryPolicy {
    ownership: Ownership,
    mode: Option<u32>,
}

impl DirectoryPolicy {
    /// Build a policy from a resolved ownership override and optional mode bits.
    #[must_use]
    pub const fn new(ownership: Ownership, mode: Option<u32>) -> Self {
        Self { ownership, mode }
    }

    /// Ownership applied to created directories.
    #[must_use]
    pub const fn ownership(&self) -> &Ownership {
        &self.ownership
    }

    /// Create every missing ancestor of `file`, applying mode and ownership
    /// to each directory this call creates. Existing directories are untouched.
    ///
    /// # Errors
    ///
    /// Returns an error when a directory cannot be created or adjusted.
    pub fn ensure_parent(&self, file: &Path) -> FsOpsResult<()> {
        let Some(parent) = file.parent() else {
            return Ok(());
        };
        let missing: Vec<&Path> = parent
            .ancestors()
            .take_while(|dir| !dir.as_os_str().is_empty() && !dir.exists())
            .collect();

        for dir in missing.into_iter().rev() {
            match fs::create_dir(dir) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(err) => return Err(FsOpsError::io("directory.create", dir, err)),
            }
            if let Some(mode) = self.mode {
                fs::set_permissions(dir, fs::Permissions::from_mode(mode))
                    .map_err(|err| FsOpsError::io("directory.chmod", dir, err))?;
            }
            self.ownership.apply(dir)?;
            debug!(path = %dir.display(), "destination directory created");
        }
        Ok(())
    }
}

fn resolve_owner(spec: &str) -> FsOpsResult<(Uid, String)> {
    let trimmed = spec.trim();
    if trimmed.is_empty() {
        return Err(FsOpsError::InvalidInput {
            field: "owner",
            reason: "empty",
            value: Some(spec.to_string()),
        });
    }
    if let Ok(id) = trimmed.parse::<u32>() {
        return Ok((Uid::from_raw(id), format!("uid({id})")));
    }
    let user = User::from_name(trimmed)
        .map_err(|source| FsOpsError::UserLookup {
            user: trimmed.to_string(),
            source,
        })?
        .ok_or_else(|| FsOpsError::InvalidInput {
            field: "owner",
            reason: "not_found",
            value: Some(trimmed.to_string()),
        })?;
    Ok((user.uid, format!("{trimmed}({})", user.uid.as_raw())))
}

fn resolve_group(spec: &str) -> FsOpsResult<(Gid, String)> {
    let trimmed = spec.trim();
    if trimmed.is_empty() {
        return Err(FsOpsError::InvalidInput {
            field: "group",
            reason: "empty",
            value: Some(spec.to_string()),
        });
    }
    if let Ok(id) = trimmed.parse::<u32>() {
        return Ok((Gid::from_raw(id), format!("gid({id})")));
    }
    let group = Group::from_name(trimmed)
        .map_err(|source| FsOpsError::GroupLookup {
            group: trimmed.to_string(),
            source,
        })?
        .ok_or_else(|| FsOpsError::InvalidInput {
            field: "group",
            reason: "not_found",
            value: Some(trimmed.to_string()),
        })?;
    Ok((group.gid, format!("{trimmed}({})", group.gid.as_raw())))
}
