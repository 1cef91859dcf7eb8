use std::sync::Arc;

use super::{Device, Item, ItemCollection, ItemCore, State};

/// A synchronised folder, or one device's view of a folder's completion.
#[derive(Clone, Debug)]
pub struct Folder {
    inner: Arc<FolderInner>,
}

#[derive(Debug)]
struct FolderInner {
    core: ItemCore,
    path: Option<String>,
    kind: FolderKind,
    completions: ItemCollection<Folder>,
}

#[derive(Debug)]
enum FolderKind {
    Shared,
    Completion { folder_id: String, device_id: String },
}

impl Folder {
    pub fn new(id: impl Into<String>, name: impl Into<String>, path: Option<String>) -> Self {
        Self::with_kind(ItemCore::new(id, name), path, FolderKind::Shared)
    }

    /// Builds the completion proxy showing how far `device` got with `folder`.
    /// The proxy shares the folder's id and path; it is not a daemon entity.
    pub fn completion(folder: &Folder, device: &Device) -> Self {
        let core = ItemCore::new(folder.id(), completion_name(&folder.name(), &device.name()));
        Self::with_kind(
            core,
            folder.path().map(str::to_string),
            FolderKind::Completion {
                folder_id: folder.id().to_string(),
                device_id: device.id().to_string(),
            },
        )
    }

    fn with_kind(core: ItemCore, path: Option<String>, kind: FolderKind) -> Self {
        Self {
            inner: Arc::new(FolderInner {
                core,
                path,
                kind,
                completions: ItemCollection::with_key(completion_key),
            }),
        }
    }

    pub fn path(&self) -> Option<&str> {
        self.inner.path.as_deref()
    }

    pub fn is_completion_proxy(&self) -> bool {
        matches!(self.inner.kind, FolderKind::Completion { .. })
    }

    /// Folder id behind a completion proxy, or this folder's own id.
    pub fn folder_id(&self) -> &str {
        match &self.inner.kind {
            FolderKind::Shared => self.id(),
            FolderKind::Completion { folder_id, .. } => folder_id,
        }
    }

    /// Device a completion proxy reports for.
    pub fn device_id(&self) -> Option<&str> {
        match &self.inner.kind {
            FolderKind::Shared => None,
            FolderKind::Completion { device_id, .. } => Some(device_id),
        }
    }

    /// Completion proxies created for this folder, keyed by device id.
    pub fn completions(&self) -> &ItemCollection<Folder> {
        &self.inner.completions
    }

    /// Derives a proxy's state from a completion percentage: anything short
    /// of 100 is still syncing. Returns `false` for shared folders, whose
    /// state comes from the daemon directly.
    pub fn set_completion(&self, percentage: f64) -> bool {
        if !self.is_completion_proxy() {
            return false;
        }
        if percentage < 100.0 {
            self.set_state(State::Syncing);
        } else {
            self.set_state(State::Idle);
        }
        true
    }

    /// Re-derives a proxy's display name after its folder or device was renamed.
    pub(crate) fn rename_completion(&self, folder_name: &str, device_name: &str) {
        if self.is_completion_proxy() {
            self.set_name(&completion_name(folder_name, device_name));
        }
    }
}

impl Item for Folder {
    fn core(&self) -> &ItemCore {
        &self.inner.core
    }

    fn destroy(&self) {
        self.inner.completions.destroy_all();
        self.inner.core.destroy();
    }
}

fn completion_key(proxy: &Folder) -> String {
    proxy.device_id().unwrap_or(proxy.id()).to_string()
}

fn completion_name(folder_name: &str, device_name: &str) -> String {
    format!("{folder_name} ({device_name})")
}
