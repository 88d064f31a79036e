use std::path::Path;

use log::debug;

use crate::node::FolderNode;

pub const UNKNOWN_OWNER: &str = "(unknown)";

pub fn resolve_owner(node: &FolderNode) -> &str {
    if let Some(owner) = node.owner() {
        return owner;
    }
    let path = node.full_path();
    let owner = match lookup_owner(&path) {
        Some(owner) => owner,
        None => {
            debug!("lff owner unavailable for {}", path.display());
            UNKNOWN_OWNER.to_string()
        }
    };
    node.set_owner(owner)
}

#[cfg(unix)]
fn lookup_owner(path: &Path) -> Option<String> {
    use std::os::unix::fs::MetadataExt;

    let uid = std::fs::symlink_metadata(path).ok()?.uid();
    Some(user_name(uid))
}

#[cfg(not(unix))]
fn lookup_owner(_path: &Path) -> Option<String> {
    None
}

#[cfg(unix)]
mod users {
    use std::collections::HashMap;
    use std::sync::LazyLock;

    use parking_lot::RwLock;
    use uzers::get_user_by_uid;

    static NAMES: LazyLock<RwLock<HashMap<u32, String>>> =
        LazyLock::new(|| RwLock::new(HashMap::new()));

    pub(super) fn user_name(uid: u32) -> String {
        if let Some(name) = NAMES.read().get(&uid) {
            return name.clone();
        }
        let name = get_user_by_uid(uid)
            .map(|user| user.name().to_string_lossy().into_owned())
            .unwrap_or_else(|| uid.to_string());
        NAMES.write().insert(uid, name.clone());
        name
    }
}

#[cfg(unix)]
use users::user_name;
