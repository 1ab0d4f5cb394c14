//! The mount table: two mutually inverse maps between namespace and remote handle.
//! Lookups here drive every path operation's decision between "handle locally" and
//! "forward to a remote".

use std::collections::HashMap;
use std::hash::Hash;

use crate::error::{EntangldError, Result};
use crate::path;

pub struct MountTable<R> {
    namespace_to_remote: HashMap<String, R>,
    remote_to_namespace: HashMap<R, String>,
}

impl<R> Default for MountTable<R> {
    fn default() -> Self {
        Self {
            namespace_to_remote: HashMap::new(),
            remote_to_namespace: HashMap::new(),
        }
    }
}

impl<R: Clone + Eq + Hash> MountTable<R> {
    /// Registers both directions for `namespace` <-> `remote`. Rejects a namespace
    /// collision and rejects mounting the same remote twice under different names.
    pub fn attach(&mut self, namespace: &str, remote: R) -> Result<()> {
        if namespace.is_empty() {
            return Err(EntangldError::invalid_argument("attach requires a non-empty namespace"));
        }
        if self.namespace_to_remote.contains_key(namespace) {
            return Err(EntangldError::already_attached(namespace));
        }
        if let Some(existing) = self.remote_to_namespace.get(&remote) {
            return Err(EntangldError::already_attached(existing.clone()));
        }

        self.namespace_to_remote.insert(namespace.to_string(), remote.clone());
        self.remote_to_namespace.insert(remote, namespace.to_string());
        Ok(())
    }

    /// Removes both directions given either half; fails if it can find neither.
    pub fn detach(&mut self, namespace: Option<&str>, remote: Option<&R>) -> Result<String> {
        let namespace = match (namespace, remote) {
            (Some(ns), _) => ns.to_string(),
            (None, Some(r)) => self
                .remote_to_namespace
                .get(r)
                .cloned()
                .ok_or_else(|| EntangldError::not_found("remote is not attached"))?,
            (None, None) => return Err(EntangldError::invalid_argument("detach requires a namespace or a remote")),
        };

        let remote = self
            .namespace_to_remote
            .remove(&namespace)
            .ok_or_else(|| EntangldError::not_found(format!("namespace {namespace} is not attached")))?;
        self.remote_to_namespace.remove(&remote);
        Ok(namespace)
    }

    pub fn namespace_of(&self, remote: &R) -> Option<&str> {
        self.remote_to_namespace.get(remote).map(String::as_str)
    }

    pub fn remote_at(&self, namespace: &str) -> Option<&R> {
        self.namespace_to_remote.get(namespace)
    }

    pub fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.namespace_to_remote.keys().map(String::as_str)
    }

    /// Finds the longest registered namespace that `path` is at or beneath, and returns
    /// the remote, that namespace, and the residual path past it. `None` if no mount
    /// matches — the path is fully local.
    pub fn resolve<'a>(&'a self, path: &'a str) -> Option<(&'a R, &'a str, &'a str)> {
        self.namespace_to_remote
            .iter()
            .filter(|(namespace, _)| path::is_beneath(path, namespace))
            .max_by_key(|(namespace, _)| namespace.len())
            .map(|(namespace, remote)| {
                let residual = path::strip_prefix(path, namespace).unwrap_or_default();
                (remote, namespace.as_str(), residual)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attach_then_resolve_exact_and_nested() {
        let mut table: MountTable<&str> = MountTable::default();
        table.attach("child", "remote-a").unwrap();

        let (remote, namespace, residual) = table.resolve("child.system.voltage").unwrap();
        assert_eq!(*remote, "remote-a");
        assert_eq!(namespace, "child");
        assert_eq!(residual, "system.voltage");

        let (_, _, residual) = table.resolve("child").unwrap();
        assert_eq!(residual, "");
    }

    #[test]
    fn resolve_rejects_character_prefix() {
        let mut table: MountTable<&str> = MountTable::default();
        table.attach("child", "remote-a").unwrap();
        assert!(table.resolve("childish.path").is_none());
    }

    #[test]
    fn resolve_picks_longest_matching_namespace() {
        let mut table: MountTable<&str> = MountTable::default();
        table.attach("a", "remote-a").unwrap();
        table.attach("a.b", "remote-b").unwrap();

        let (remote, namespace, _) = table.resolve("a.b.c").unwrap();
        assert_eq!(*remote, "remote-b");
        assert_eq!(namespace, "a.b");
    }

    #[test]
    fn double_attach_same_namespace_fails() {
        let mut table: MountTable<&str> = MountTable::default();
        table.attach("child", "remote-a").unwrap();
        assert!(table.attach("child", "remote-b").is_err());
    }

    #[test]
    fn same_remote_twice_fails() {
        let mut table: MountTable<&str> = MountTable::default();
        table.attach("a", "remote-a").unwrap();
        assert!(table.attach("b", "remote-a").is_err());
    }

    #[test]
    fn detach_by_remote_removes_both_directions() {
        let mut table: MountTable<&str> = MountTable::default();
        table.attach("child", "remote-a").unwrap();
        let namespace = table.detach(None, Some(&"remote-a")).unwrap();
        assert_eq!(namespace, "child");
        assert!(table.resolve("child").is_none());
        assert!(table.namespace_of(&"remote-a").is_none());
    }
}
