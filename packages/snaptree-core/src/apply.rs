use tracing::{debug, instrument, trace};

use crate::draft::Draft;
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::patch::{Patch, PatchOp};
use crate::path::PathSeg;
use crate::value::{seq_index, Kind, Value};

impl Engine {
    /// Replays `patches` on `base`, one draft session per patch.
    ///
    /// Every payload goes through the same freeze pass as a direct assignment, so nothing the
    /// patch author still holds becomes reachable from the result. A failing patch aborts the
    /// batch with `MalformedPatch` naming its index; snapshots produced for earlier patches are
    /// unaffected.
    #[instrument(level = "trace", skip_all, fields(patches = patches.len()))]
    pub fn apply_patches(&self, base: &Value, patches: &[Patch]) -> Result<Value> {
        let mut current = self.freeze(base.clone())?;
        for (index, patch) in patches.iter().enumerate() {
            trace!(index, op = %patch.op, path = %patch.path, "applying patch");
            current = self
                .produce(&current, |draft| apply_one(draft, patch))
                .map_err(|err| annotate(index, patch, err))?;
        }
        debug!(patches = patches.len(), "patch batch applied");
        Ok(current)
    }
}

fn apply_one(root: &Draft, patch: &Patch) -> Result<Option<Value>> {
    let Some((parents, last)) = patch.path.split_last() else {
        return match patch.op {
            PatchOp::Add | PatchOp::Replace => Ok(Some(patch.required_value()?.clone())),
            PatchOp::Remove => Err(Error::MalformedPatch("the root cannot be removed".into())),
        };
    };

    let mut target = root.clone();
    for seg in parents {
        target = target.child(seg.clone())?;
    }

    match target.kind()? {
        Kind::Set => apply_to_set(&target, patch)?,
        Kind::Seq => apply_to_seq(&target, patch, last)?,
        Kind::Map => match patch.op {
            PatchOp::Add => target.set(last.clone(), patch.required_value()?.clone())?,
            PatchOp::Replace => {
                if !target.contains(last.clone())? {
                    return Err(missing(patch));
                }
                target.set(last.clone(), patch.required_value()?.clone())?;
            }
            PatchOp::Remove => {
                if target.remove(last.clone())?.is_none() {
                    return Err(missing(patch));
                }
            }
        },
        Kind::Record => match patch.op {
            PatchOp::Add | PatchOp::Replace => {
                target.set(last.clone(), patch.required_value()?.clone())?
            }
            PatchOp::Remove => {
                target.remove(last.clone())?;
            }
        },
        Kind::Leaf => {
            return Err(Error::TypeMismatch(format!(
                "`{}` does not resolve to a container",
                patch.path
            )))
        }
    }
    Ok(None)
}

fn apply_to_seq(target: &Draft, patch: &Patch, last: &PathSeg) -> Result<()> {
    match patch.op {
        PatchOp::Add if last.as_key() == Some("-") => target.push(patch.required_value()?.clone()),
        PatchOp::Add => {
            let index = seq_index(last).ok_or_else(|| {
                Error::MalformedPatch(format!("`{last}` is not a sequence index"))
            })?;
            target.insert(index, patch.required_value()?.clone())
        }
        PatchOp::Replace => {
            let len = target.len()?;
            if !seq_index(last).is_some_and(|i| i < len) {
                return Err(missing(patch));
            }
            target.set(last.clone(), patch.required_value()?.clone())
        }
        PatchOp::Remove => target.remove(last.clone()).map(|_| ()),
    }
}

// The member travels in `value`; the ordinal in the path is informational.
fn apply_to_set(target: &Draft, patch: &Patch) -> Result<()> {
    let member = patch.required_value()?.as_leaf().cloned().ok_or_else(|| {
        Error::MalformedPatch(format!("set member at `{}` must be a leaf", patch.path))
    })?;
    match patch.op {
        PatchOp::Add => {
            target.add_member(member)?;
        }
        PatchOp::Remove => {
            if !target.remove_member(member)? {
                return Err(missing(patch));
            }
        }
        PatchOp::Replace => {
            return Err(Error::MalformedPatch(format!(
                "set members at `{}` cannot be replaced",
                patch.path
            )))
        }
    }
    Ok(())
}

fn missing(patch: &Patch) -> Error {
    Error::MissingKey(format!("`{}` does not exist", patch.path))
}

fn annotate(index: usize, patch: &Patch, err: Error) -> Error {
    match err {
        Error::MalformedPatch(msg) => Error::MalformedPatch(format!("patch {index}: {msg}")),
        err if err.is_resolution() => Error::MalformedPatch(format!(
            "patch {index} ({} {}): {err}",
            patch.op, patch.path
        )),
        err => err,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path;

    fn base() -> Value {
        Engine::default()
            .freeze(Value::map([
                ("items", Value::seq(vec!["a", "b"])),
                ("tags", Value::set(["x"])),
            ]))
            .unwrap()
    }

    #[test]
    fn empty_batch_returns_base() {
        let base = base();
        let out = Engine::default().apply_patches(&base, &[]).unwrap();
        assert!(out.ptr_eq(&base));
    }

    #[test]
    fn dash_appends_to_sequence() {
        let out = Engine::default()
            .apply_patches(&base(), &[Patch::add(path!["items", "-"], "c")])
            .unwrap();
        assert_eq!(out.get("items"), Some(Value::seq(vec!["a", "b", "c"])));
    }

    #[test]
    fn set_patches_use_member_value() {
        let out = Engine::default()
            .apply_patches(
                &base(),
                &[
                    Patch::add(path!["tags", 0usize], "w"),
                    Patch::remove(path!["tags", 7usize]).with_value("x"),
                ],
            )
            .unwrap();
        assert_eq!(out.get("tags"), Some(Value::set(["w"])));
    }

    #[test]
    fn missing_parent_reports_patch_index() {
        let err = Engine::default()
            .apply_patches(
                &base(),
                &[
                    Patch::add(path!["items", 0usize], "z"),
                    Patch::replace(path!["nope", "deeper"], 1i64),
                ],
            )
            .unwrap_err();
        match err {
            Error::MalformedPatch(msg) => assert!(msg.starts_with("patch 1"), "{msg}"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn replace_requires_existing_key() {
        let err = Engine::default()
            .apply_patches(&base(), &[Patch::replace(path!["absent"], 1i64)])
            .unwrap_err();
        assert!(matches!(err, Error::MalformedPatch(_)));
    }

    #[test]
    fn removing_root_is_malformed() {
        let err = Engine::default()
            .apply_patches(&base(), &[Patch::remove(path![])])
            .unwrap_err();
        assert!(matches!(err, Error::MalformedPatch(_)));
    }

    #[test]
    fn sequence_replace_reports_stale_target() {
        let engine = Engine::default();
        let session = engine.draft(&base()).unwrap();
        let items = session.root().child("items").unwrap();
        drop(session);

        let patch = Patch::replace(path!["items", 0usize], "z");
        let err = apply_to_seq(&items, &patch, &PathSeg::Index(0)).unwrap_err();
        assert!(matches!(err, Error::StaleDraft(_)), "{err:?}");
    }
}
