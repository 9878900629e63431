//! Mount descriptors for overlay snapshots.

use bock_common::BockPaths;

use crate::mount::Mount;
use crate::storage::Active;

/// Compute the mounts that expose `active`.
///
/// - No parents: overlay needs at least one lower layer, so the snapshot's
///   own layer is bind mounted (`rw`, or `ro` for a view).
/// - A view of a single parent: the parent's layer is bind mounted `ro`.
/// - Otherwise one overlay mount. Writable snapshots get `workdir` and
///   `upperdir`; `lowerdir` lists the parents nearest first.
#[must_use]
pub fn mounts(paths: &BockPaths, active: &Active) -> Vec<Mount> {
    if active.parent_ids.is_empty() {
        return vec![Mount::bind(
            paths.upper(active.id).display().to_string(),
            active.readonly,
        )];
    }

    let mut options = Vec::with_capacity(3);
    if !active.readonly {
        options.push(format!("workdir={}", paths.work(active.id).display()));
        options.push(format!("upperdir={}", paths.upper(active.id).display()));
    } else if let [parent] = active.parent_ids.as_slice() {
        return vec![Mount::bind(paths.upper(*parent).display().to_string(), true)];
    }

    let lower = active
        .parent_ids
        .iter()
        .map(|id| paths.upper(*id).display().to_string())
        .collect::<Vec<_>>()
        .join(":");
    options.push(format!("lowerdir={lower}"));

    vec![Mount::overlay(options)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use bock_common::SnapshotId;
    use proptest::prelude::*;

    fn active(id: u64, readonly: bool, parents: &[u64]) -> Active {
        Active {
            id: SnapshotId::new(id),
            parent_ids: parents.iter().copied().map(SnapshotId::new).collect(),
            readonly,
        }
    }

    fn paths() -> BockPaths {
        BockPaths::with_root("/var/lib/bock/snapshot/overlay")
    }

    #[test]
    fn no_parents_binds_own_layer() {
        let rw = mounts(&paths(), &active(1, false, &[]));
        assert_eq!(
            rw,
            vec![Mount {
                mount_type: "bind".to_string(),
                source: "/var/lib/bock/snapshot/overlay/snapshots/1/fs".to_string(),
                options: vec!["rw".to_string(), "rbind".to_string()],
            }]
        );

        let ro = mounts(&paths(), &active(1, true, &[]));
        assert_eq!(ro.len(), 1);
        assert_eq!(ro[0].options, vec!["ro", "rbind"]);
    }

    #[test]
    fn view_of_single_parent_binds_parent() {
        let m = mounts(&paths(), &active(5, true, &[2]));
        assert_eq!(m.len(), 1);
        assert_eq!(m[0].mount_type, "bind");
        assert_eq!(m[0].source, "/var/lib/bock/snapshot/overlay/snapshots/2/fs");
        assert_eq!(m[0].options, vec!["ro", "rbind"]);
    }

    #[test]
    fn writable_single_parent_uses_overlay() {
        let m = mounts(&paths(), &active(3, false, &[2]));
        assert_eq!(
            m,
            vec![Mount {
                mount_type: "overlay".to_string(),
                source: "overlay".to_string(),
                options: vec![
                    "workdir=/var/lib/bock/snapshot/overlay/snapshots/3/work".to_string(),
                    "upperdir=/var/lib/bock/snapshot/overlay/snapshots/3/fs".to_string(),
                    "lowerdir=/var/lib/bock/snapshot/overlay/snapshots/2/fs".to_string(),
                ],
            }]
        );
    }

    #[test]
    fn view_of_many_parents_has_no_upper() {
        let m = mounts(&paths(), &active(9, true, &[4, 1]));
        assert_eq!(m.len(), 1);
        assert_eq!(m[0].mount_type, "overlay");
        assert_eq!(
            m[0].options,
            vec![
                "lowerdir=/var/lib/bock/snapshot/overlay/snapshots/4/fs:\
                 /var/lib/bock/snapshot/overlay/snapshots/1/fs"
            ]
        );
        assert!(m[0].is_readonly());
    }

    proptest! {
        #[test]
        fn lowerdir_follows_parent_order(
            parents in prop::collection::vec(1u64..10_000, 1..8),
            readonly in any::<bool>(),
        ) {
            prop_assume!(!(readonly && parents.len() == 1));
            let m = mounts(&paths(), &active(10_001, readonly, &parents));
            prop_assert_eq!(m.len(), 1);

            let lower = m[0]
                .options
                .last()
                .and_then(|o| o.strip_prefix("lowerdir="))
                .unwrap()
                .to_string();
            let expected = parents
                .iter()
                .map(|p| format!("/var/lib/bock/snapshot/overlay/snapshots/{p}/fs"))
                .collect::<Vec<_>>();
            prop_assert_eq!(lower.split(':').collect::<Vec<_>>(), expected);

            // Views never get a work directory or an upper layer.
            let has_upper = m[0].options.iter().any(|o| o.starts_with("upperdir="));
            let has_work = m[0].options.iter().any(|o| o.starts_with("workdir="));
            prop_assert_eq!(has_upper, !readonly);
            prop_assert_eq!(has_work, !readonly);
        }
    }
}
