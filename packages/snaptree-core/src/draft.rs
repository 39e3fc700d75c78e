use std::cell::{Cell, RefCell, RefMut};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::rc::Rc;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::freeze::Freezer;
use crate::patch::Patch;
use crate::path::{Path, PathSeg};
use crate::record::Record;
use crate::recorder::Recorder;
use crate::value::{map_key, seq_index, Kind, Leaf, Node, RecordRef, Value};

pub(crate) type DraftId = usize;

const ROOT: DraftId = 0;

#[derive(Clone, Debug)]
enum Slot {
    Value(Value),
    Draft(DraftId),
}

/// Shallow working copy of a drafted container. Child slots are either sealed values or
/// live child drafts.
enum Overlay {
    Seq(Vec<Slot>),
    Map(BTreeMap<String, Slot>),
    Set(BTreeSet<Leaf>),
    Record {
        // `None` while `update_record` has lent the working clone out.
        record: Option<Box<dyn Record>>,
        fields: BTreeMap<String, Slot>,
    },
}

impl Overlay {
    fn put(&mut self, seg: &PathSeg, slot: Slot) {
        match (self, seg) {
            (Overlay::Seq(slots), PathSeg::Index(i)) => {
                if let Some(s) = slots.get_mut(*i) {
                    *s = slot;
                }
            }
            (Overlay::Map(slots), PathSeg::Key(k)) => {
                slots.insert(k.clone(), slot);
            }
            (Overlay::Record { fields, .. }, PathSeg::Key(k)) => {
                fields.insert(k.clone(), slot);
            }
            _ => {}
        }
    }

    fn slot(&self, seg: &PathSeg) -> Option<&Slot> {
        match (self, seg) {
            (Overlay::Seq(slots), PathSeg::Index(i)) => slots.get(*i),
            (Overlay::Map(slots), PathSeg::Key(k)) => slots.get(k),
            (Overlay::Record { fields, .. }, PathSeg::Key(k)) => fields.get(k),
            _ => None,
        }
    }
}

struct DraftState {
    base: Value,
    parent: Option<(DraftId, PathSeg)>,
    children: HashMap<PathSeg, DraftId>,
    overlay: Option<Overlay>,
    modified: bool,
    detached: bool,
}

impl DraftState {
    fn new(base: Value, parent: Option<(DraftId, PathSeg)>) -> Self {
        Self {
            base,
            parent,
            children: HashMap::new(),
            overlay: None,
            modified: false,
            detached: false,
        }
    }
}

/// All drafts of one recipe invocation. Draft handles index into `states`.
struct Arena {
    states: Vec<DraftState>,
    max_depth: usize,
    recorder: Option<Recorder>,
}

fn busy() -> Error {
    Error::InvalidOperation("record draft is lent out to update_record".into())
}

impl Arena {
    fn freezer(&self) -> Freezer {
        Freezer::new(self.max_depth)
    }

    fn kind(&self, id: DraftId) -> Kind {
        self.states[id].base.kind()
    }

    fn path_of(&self, id: DraftId) -> Path {
        let mut segs = Vec::new();
        let mut cur = id;
        while let Some((parent, seg)) = &self.states[cur].parent {
            segs.push(seg.clone());
            cur = *parent;
        }
        segs.reverse();
        Path(segs)
    }

    /// Canonical child segment for the draft's container kind.
    fn normalize(&self, id: DraftId, seg: &PathSeg) -> Result<PathSeg> {
        match self.kind(id) {
            Kind::Seq => seq_index(seg).map(PathSeg::Index).ok_or_else(|| {
                Error::TypeMismatch(format!(
                    "sequence at `{}` is indexed by integers, got `{seg}`",
                    self.path_of(id)
                ))
            }),
            Kind::Map => Ok(PathSeg::Key(map_key(seg))),
            Kind::Record => match seg {
                PathSeg::Key(k) => Ok(PathSeg::Key(k.clone())),
                PathSeg::Index(_) => Err(Error::TypeMismatch(format!(
                    "record at `{}` is addressed by field name, got `{seg}`",
                    self.path_of(id)
                ))),
            },
            kind => Err(Error::TypeMismatch(format!(
                "{kind} at `{}` has no keyed children",
                self.path_of(id)
            ))),
        }
    }

    fn len(&self, id: DraftId) -> Result<usize> {
        let state = &self.states[id];
        Ok(match &state.overlay {
            None => state.base.len(),
            Some(Overlay::Seq(slots)) => slots.len(),
            Some(Overlay::Map(slots)) => slots.len(),
            Some(Overlay::Set(members)) => members.len(),
            Some(Overlay::Record { record, .. }) => record.as_ref().ok_or_else(busy)?.fields().len(),
        })
    }

    fn ensure_overlay(&mut self, id: DraftId) -> Result<()> {
        if self.states[id].overlay.is_some() {
            return Ok(());
        }
        let mut overlay = match &self.states[id].base {
            Value::Leaf(_) => {
                return Err(Error::TypeMismatch(format!(
                    "leaf at `{}` cannot be edited in place",
                    self.path_of(id)
                )))
            }
            Value::Seq(n) => Overlay::Seq(n.iter().cloned().map(Slot::Value).collect()),
            Value::Map(n) => Overlay::Map(
                n.iter()
                    .map(|(k, v)| (k.clone(), Slot::Value(v.clone())))
                    .collect(),
            ),
            Value::Set(n) => Overlay::Set((**n).clone()),
            Value::Record(r) => Overlay::Record {
                record: Some(r.record().clone_record()),
                fields: BTreeMap::new(),
            },
        };
        for (seg, child) in &self.states[id].children {
            overlay.put(seg, Slot::Draft(*child));
        }
        self.states[id].overlay = Some(overlay);
        Ok(())
    }

    /// Flags `id` and every ancestor as modified.
    fn mark_modified(&mut self, id: DraftId) -> Result<()> {
        let mut cur = id;
        loop {
            self.ensure_overlay(cur)?;
            if self.states[cur].modified {
                return Ok(());
            }
            self.states[cur].modified = true;
            match &self.states[cur].parent {
                Some((parent, _)) => cur = *parent,
                None => return Ok(()),
            }
        }
    }

    /// Marks a child draft, and everything drafted below it, as no longer attached.
    fn detach_child(&mut self, id: DraftId, seg: &PathSeg) {
        let Some(child) = self.states[id].children.remove(seg) else {
            return;
        };
        let mut pending = vec![child];
        while let Some(cur) = pending.pop() {
            let state = &mut self.states[cur];
            state.detached = true;
            pending.extend(state.children.drain().map(|(_, c)| c));
        }
    }

    /// Re-keys live child drafts of a sequence after an insertion or removal.
    fn shift_children(&mut self, id: DraftId, from: usize, grow: bool) {
        let moved: Vec<(usize, DraftId)> = self.states[id]
            .children
            .iter()
            .filter_map(|(seg, c)| seg.as_index().filter(|i| *i >= from).map(|i| (i, *c)))
            .collect();
        for (index, _) in &moved {
            self.states[id].children.remove(&PathSeg::Index(*index));
        }
        for (index, child) in moved {
            let shifted = if grow { index + 1 } else { index - 1 };
            self.states[id]
                .children
                .insert(PathSeg::Index(shifted), child);
            self.states[child].parent = Some((id, PathSeg::Index(shifted)));
        }
    }

    fn slot_value(&self, slot: &Slot, freezer: &mut Freezer) -> Result<Value> {
        match slot {
            Slot::Value(v) => Ok(v.clone()),
            Slot::Draft(child) => self.materialize(*child, freezer),
        }
    }

    /// Current value at a normalized segment, sealed. `None` when absent.
    fn current_at(
        &self,
        id: DraftId,
        seg: &PathSeg,
        freezer: &mut Freezer,
    ) -> Result<Option<Value>> {
        let state = &self.states[id];
        if let Some(child) = state.children.get(seg) {
            return self.materialize(*child, freezer).map(Some);
        }
        match &state.overlay {
            None => Ok(state.base.get(seg.clone())),
            Some(Overlay::Record { record, fields }) => match fields.get(&map_key(seg)) {
                Some(slot) => self.slot_value(slot, freezer).map(Some),
                None => {
                    let record = record.as_ref().ok_or_else(busy)?;
                    record
                        .get(&map_key(seg))
                        .map(|v| freezer.freeze(v))
                        .transpose()
                }
            },
            Some(overlay) => overlay
                .slot(seg)
                .map(|slot| self.slot_value(slot, freezer))
                .transpose(),
        }
    }

    /// Builds the sealed value a draft currently stands for. Unmodified drafts yield their base
    /// by reference; modified ones yield a fresh node whose untouched children are shared.
    fn materialize(&self, id: DraftId, freezer: &mut Freezer) -> Result<Value> {
        let state = &self.states[id];
        if !state.modified {
            return Ok(state.base.clone());
        }
        let Some(overlay) = &state.overlay else {
            return Ok(state.base.clone());
        };
        let fresh = match overlay {
            Overlay::Seq(slots) => Value::Seq(Node::new(
                slots
                    .iter()
                    .map(|slot| self.slot_value(slot, freezer))
                    .collect::<Result<Vec<_>>>()?,
            )),
            Overlay::Map(slots) => Value::Map(Node::new(
                slots
                    .iter()
                    .map(|(k, slot)| Ok((k.clone(), self.slot_value(slot, freezer)?)))
                    .collect::<Result<BTreeMap<_, _>>>()?,
            )),
            Overlay::Set(members) => Value::Set(Node::new(members.clone())),
            Overlay::Record { record, fields } => {
                // Every slot is written back: an unmodified child may still stand for a value
                // assigned before the field was drafted.
                let mut copy = record.as_ref().ok_or_else(busy)?.clone_record();
                for (field, slot) in fields {
                    copy.set(field, self.slot_value(slot, freezer)?)?;
                }
                Value::Record(RecordRef::from_box(copy))
            }
        };
        freezer.freeze(fresh)
    }

    fn child(&mut self, id: DraftId, seg: &PathSeg) -> Result<DraftId> {
        let seg = self.normalize(id, seg)?;
        if let Some(child) = self.states[id].children.get(&seg) {
            return Ok(*child);
        }
        let mut freezer = self.freezer();
        let value = self.current_at(id, &seg, &mut freezer)?.ok_or_else(|| {
            Error::MissingKey(format!("`{}`", self.path_of(id).join(seg.clone())))
        })?;
        if value.is_leaf() {
            return Err(Error::TypeMismatch(format!(
                "`{}` is a leaf",
                self.path_of(id).join(seg.clone())
            )));
        }
        let child = self.states.len();
        self.states
            .push(DraftState::new(value, Some((id, seg.clone()))));
        self.states[id].children.insert(seg.clone(), child);
        if let Some(overlay) = self.states[id].overlay.as_mut() {
            overlay.put(&seg, Slot::Draft(child));
        }
        Ok(child)
    }

    fn record_patch(&mut self, forward: Patch, inverse: impl FnOnce() -> Patch) {
        if let Some(recorder) = self.recorder.as_mut() {
            let inverse = recorder.wants_inverse().then(inverse);
            recorder.push(forward, inverse);
        }
    }

    fn set(&mut self, id: DraftId, seg: &PathSeg, value: Value) -> Result<()> {
        let seg = self.normalize(id, seg)?;
        let mut freezer = self.freezer();
        let value = freezer.freeze(value)?;
        self.ensure_overlay(id)?;

        match self.kind(id) {
            Kind::Seq => {
                let index = seg.as_index().unwrap_or_default();
                let len = self.len(id)?;
                if index == len {
                    return self.insert(id, index, value);
                }
                if index > len {
                    return Err(Error::MissingKey(format!(
                        "index {index} out of bounds for `{}` (len {len})",
                        self.path_of(id)
                    )));
                }
            }
            Kind::Record => {
                let known = match &self.states[id].overlay {
                    Some(Overlay::Record { record, .. }) => {
                        let key = map_key(&seg);
                        let record = record.as_ref().ok_or_else(busy)?;
                        record.fields().iter().any(|f| *f == key)
                    }
                    _ => false,
                };
                if !known {
                    return Err(Error::MissingKey(format!(
                        "record at `{}` has no field `{seg}`",
                        self.path_of(id)
                    )));
                }
            }
            _ => {}
        }

        let current = self.current_at(id, &seg, &mut freezer)?;
        if current.as_ref().is_some_and(|c| c.ptr_eq(&value)) {
            return Ok(());
        }
        self.detach_child(id, &seg);
        if let Some(overlay) = self.states[id].overlay.as_mut() {
            overlay.put(&seg, Slot::Value(value.clone()));
        }
        self.mark_modified(id)?;

        let path = self.path_of(id).join(seg);
        let forward = match current {
            Some(_) => Patch::replace(path.clone(), value),
            None => Patch::add(path.clone(), value),
        };
        self.record_patch(forward, move || match current {
            Some(old) => Patch::replace(path, old),
            None => Patch::remove(path),
        });
        Ok(())
    }

    fn insert(&mut self, id: DraftId, index: usize, value: Value) -> Result<()> {
        if self.kind(id) != Kind::Seq {
            return Err(Error::TypeMismatch(format!(
                "insert needs a sequence, `{}` is a {}",
                self.path_of(id),
                self.kind(id)
            )));
        }
        let value = self.freezer().freeze(value)?;
        self.ensure_overlay(id)?;
        let len = self.len(id)?;
        if index > len {
            return Err(Error::MissingKey(format!(
                "index {index} out of bounds for `{}` (len {len})",
                self.path_of(id)
            )));
        }
        self.shift_children(id, index, true);
        if let Some(Overlay::Seq(slots)) = self.states[id].overlay.as_mut() {
            slots.insert(index, Slot::Value(value.clone()));
        }
        self.mark_modified(id)?;

        let path = self.path_of(id).join(index);
        self.record_patch(Patch::add(path.clone(), value), move || Patch::remove(path));
        Ok(())
    }

    fn remove(&mut self, id: DraftId, seg: &PathSeg) -> Result<Option<Value>> {
        let seg = self.normalize(id, seg)?;
        if self.kind(id) == Kind::Record {
            return Err(Error::TypeMismatch(format!(
                "record field `{seg}` at `{}` cannot be removed",
                self.path_of(id)
            )));
        }
        let mut freezer = self.freezer();
        let Some(old) = self.current_at(id, &seg, &mut freezer)? else {
            if self.kind(id) == Kind::Seq {
                return Err(Error::MissingKey(format!(
                    "index {seg} out of bounds for `{}`",
                    self.path_of(id)
                )));
            }
            return Ok(None);
        };
        self.ensure_overlay(id)?;
        self.detach_child(id, &seg);
        match (self.states[id].overlay.as_mut(), &seg) {
            (Some(Overlay::Seq(slots)), PathSeg::Index(i)) => {
                let index = *i;
                slots.remove(index);
                self.shift_children(id, index + 1, false);
            }
            (Some(Overlay::Map(slots)), PathSeg::Key(k)) => {
                slots.remove(k);
            }
            _ => {}
        }
        self.mark_modified(id)?;

        let path = self.path_of(id).join(seg);
        let restore = old.clone();
        self.record_patch(Patch::remove(path.clone()), move || Patch::add(path, restore));
        Ok(Some(old))
    }

    fn members(&self, id: DraftId) -> Result<&BTreeSet<Leaf>> {
        let state = &self.states[id];
        match (&state.overlay, &state.base) {
            (Some(Overlay::Set(members)), _) => Ok(members),
            (None, Value::Set(n)) => Ok(&**n),
            _ => Err(Error::TypeMismatch(format!(
                "`{}` is a {}, not a set",
                self.path_of(id),
                self.kind(id)
            ))),
        }
    }

    fn add_member(&mut self, id: DraftId, member: Leaf) -> Result<bool> {
        if self.members(id)?.contains(&member) {
            return Ok(false);
        }
        self.ensure_overlay(id)?;
        let mut position = 0;
        if let Some(Overlay::Set(members)) = self.states[id].overlay.as_mut() {
            members.insert(member.clone());
            position = members.range(..&member).count();
        }
        self.mark_modified(id)?;

        let path = self.path_of(id).join(position);
        let removed = member.clone();
        self.record_patch(Patch::add(path.clone(), member), move || {
            Patch::remove(path).with_value(removed)
        });
        Ok(true)
    }

    fn remove_member(&mut self, id: DraftId, member: &Leaf) -> Result<bool> {
        if !self.members(id)?.contains(member) {
            return Ok(false);
        }
        self.ensure_overlay(id)?;
        let mut position = 0;
        if let Some(Overlay::Set(members)) = self.states[id].overlay.as_mut() {
            position = members.range(..member).count();
            members.remove(member);
        }
        self.mark_modified(id)?;

        let path = self.path_of(id).join(position);
        let restored = member.clone();
        self.record_patch(Patch::remove(path.clone()).with_value(member.clone()), move || {
            Patch::add(path, restored)
        });
        Ok(true)
    }

    /// Folds pending member writes into the working clone, detaches member drafts and lends the
    /// clone out. Returns the clone and, when recording, the members as they were before.
    fn lend_record(&mut self, id: DraftId) -> Result<(Box<dyn Record>, Option<Vec<Option<Value>>>)> {
        if self.kind(id) != Kind::Record {
            return Err(Error::TypeMismatch(format!(
                "`{}` is a {}, not a record",
                self.path_of(id),
                self.kind(id)
            )));
        }
        self.ensure_overlay(id)?;
        let mut freezer = self.freezer();

        // Fold into a fresh clone so a failure leaves pending writes and drafts in place.
        let record = match &self.states[id].overlay {
            Some(Overlay::Record { record, fields }) => {
                let mut working = record.as_ref().ok_or_else(busy)?.clone_record();
                for (field, slot) in fields {
                    working.set(field, self.slot_value(slot, &mut freezer)?)?;
                }
                working
            }
            _ => return Err(busy()),
        };

        let children: Vec<PathSeg> = self.states[id].children.keys().cloned().collect();
        for seg in children {
            self.detach_child(id, &seg);
        }
        if let Some(Overlay::Record { record: slot, fields }) = self.states[id].overlay.as_mut() {
            fields.clear();
            *slot = None;
        }
        let before = self
            .recorder
            .is_some()
            .then(|| record.fields().iter().map(|f| record.get(f)).collect());
        Ok((record, before))
    }

    /// Takes the working clone back and records one `replace` per changed member.
    fn return_record(
        &mut self,
        id: DraftId,
        record: Box<dyn Record>,
        before: Option<Vec<Option<Value>>>,
    ) -> Result<()> {
        let fields = record.fields();
        let after: Vec<Option<Value>> = fields.iter().map(|f| record.get(f)).collect();
        if let Some(Overlay::Record { record: slot, .. }) = self.states[id].overlay.as_mut() {
            *slot = Some(record);
        }
        let Some(before) = before else {
            // Not recording: compare against the base to decide whether anything changed.
            let base = &self.states[id].base;
            let changed = fields
                .iter()
                .zip(&after)
                .any(|(f, now)| base.get(*f).as_ref() != now.as_ref());
            if changed {
                self.mark_modified(id)?;
            }
            return Ok(());
        };

        let mut freezer = self.freezer();
        let mut changes = Vec::new();
        for ((field, old), new) in fields.iter().zip(before).zip(after) {
            if old == new {
                continue;
            }
            let new = new.map(|v| freezer.freeze(v)).transpose()?;
            let old = old.map(|v| freezer.freeze(v)).transpose()?;
            changes.push((*field, old, new));
        }
        if changes.is_empty() {
            return Ok(());
        }
        self.mark_modified(id)?;
        let base_path = self.path_of(id);
        for (field, old, new) in changes {
            let path = base_path.join(field);
            let forward = Patch::replace(path.clone(), new.unwrap_or_else(Value::null));
            self.record_patch(forward, move || {
                Patch::replace(path, old.unwrap_or_else(Value::null))
            });
        }
        Ok(())
    }
}

/// Scope shared by every draft of one recipe invocation.
pub(crate) struct Scope {
    arena: RefCell<Arena>,
    revoked: Cell<bool>,
}

/// Recipe-scoped mutable view over a snapshot node.
///
/// A draft is a cheap handle; cloning it yields another handle to the same draft. Child
/// drafts are created lazily on first access and memoized, so asking for the same child twice
/// returns the same draft. Writes never touch the base snapshot: they go to a shallow working
/// copy and are committed by the finalizer when the recipe returns.
///
/// Once the recipe has returned (or the session was finished or dropped) every operation fails
/// with [`Error::StaleDraft`]. A draft whose slot was overwritten or removed is stale as well.
#[derive(Clone)]
pub struct Draft {
    scope: Rc<Scope>,
    id: DraftId,
}

impl std::fmt::Debug for Draft {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Draft").field("id", &self.id).finish()
    }
}

impl Draft {
    fn arena(&self) -> Result<RefMut<'_, Arena>> {
        if self.scope.revoked.get() {
            return Err(Error::StaleDraft(
                "draft used after its recipe returned".into(),
            ));
        }
        let arena = self
            .scope
            .arena
            .try_borrow_mut()
            .map_err(|_| Error::InvalidOperation("draft re-entered while busy".into()))?;
        if arena.states[self.id].detached {
            return Err(Error::StaleDraft(
                "draft location was overwritten or removed".into(),
            ));
        }
        Ok(arena)
    }

    fn handle(&self, id: DraftId) -> Draft {
        Draft {
            scope: Rc::clone(&self.scope),
            id,
        }
    }

    /// Whether both handles refer to the same draft.
    pub fn same_draft(&self, other: &Draft) -> bool {
        Rc::ptr_eq(&self.scope, &other.scope) && self.id == other.id
    }

    pub fn kind(&self) -> Result<Kind> {
        Ok(self.arena()?.kind(self.id))
    }

    pub fn len(&self) -> Result<usize> {
        self.arena()?.len(self.id)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Location of this draft relative to the root.
    pub fn path(&self) -> Result<Path> {
        Ok(self.arena()?.path_of(self.id))
    }

    pub fn is_modified(&self) -> Result<bool> {
        Ok(self.arena()?.states[self.id].modified)
    }

    /// The base node this draft was opened over.
    pub fn original(&self) -> Result<Value> {
        Ok(self.arena()?.states[self.id].base.clone())
    }

    /// A sealed snapshot of the draft's current state.
    pub fn current(&self) -> Result<Value> {
        let arena = self.arena()?;
        let mut freezer = arena.freezer();
        arena.materialize(self.id, &mut freezer)
    }

    /// Current value of a child, or `None` when absent.
    pub fn read(&self, seg: impl Into<PathSeg>) -> Result<Option<Value>> {
        let arena = self.arena()?;
        let seg = arena.normalize(self.id, &seg.into())?;
        let mut freezer = arena.freezer();
        arena.current_at(self.id, &seg, &mut freezer)
    }

    pub fn contains(&self, seg: impl Into<PathSeg>) -> Result<bool> {
        Ok(self.read(seg)?.is_some())
    }

    /// Child segments in order: indices for sequences, keys for mappings, fields for records.
    pub fn keys(&self) -> Result<Vec<PathSeg>> {
        let arena = self.arena()?;
        let state = &arena.states[self.id];
        Ok(match (&state.overlay, &state.base) {
            (Some(Overlay::Map(slots)), _) => slots.keys().cloned().map(PathSeg::Key).collect(),
            (None, Value::Map(n)) => n.keys().cloned().map(PathSeg::Key).collect(),
            (_, Value::Record(r)) => r.fields().iter().map(|f| PathSeg::from(*f)).collect(),
            (_, Value::Seq(_)) => (0..arena.len(self.id)?).map(PathSeg::Index).collect(),
            _ => Vec::new(),
        })
    }

    /// Draft over a container child. Repeated calls return the same draft.
    pub fn child(&self, seg: impl Into<PathSeg>) -> Result<Draft> {
        let id = self.arena()?.child(self.id, &seg.into())?;
        Ok(self.handle(id))
    }

    /// Assigns a child. For sequences an index equal to the length appends.
    pub fn set(&self, seg: impl Into<PathSeg>, value: impl Into<Value>) -> Result<()> {
        self.arena()?.set(self.id, &seg.into(), value.into())
    }

    /// Removes a mapping key or sequence element and returns what was there.
    pub fn remove(&self, seg: impl Into<PathSeg>) -> Result<Option<Value>> {
        self.arena()?.remove(self.id, &seg.into())
    }

    pub fn push(&self, value: impl Into<Value>) -> Result<()> {
        let mut arena = self.arena()?;
        let len = arena.len(self.id)?;
        arena.insert(self.id, len, value.into())
    }

    pub fn insert(&self, index: usize, value: impl Into<Value>) -> Result<()> {
        self.arena()?.insert(self.id, index, value.into())
    }

    /// Adds a set member. Returns `false` when it was already present.
    pub fn add_member(&self, member: impl Into<Leaf>) -> Result<bool> {
        self.arena()?.add_member(self.id, member.into())
    }

    /// Removes a set member. Returns `false` when it was absent.
    pub fn remove_member(&self, member: impl Into<Leaf>) -> Result<bool> {
        self.arena()?.remove_member(self.id, &member.into())
    }

    pub fn contains_member(&self, member: impl Into<Leaf>) -> Result<bool> {
        Ok(self.arena()?.members(self.id)?.contains(&member.into()))
    }

    /// Runs one of the record's own mutation methods against the draft's working clone.
    ///
    /// Pending member writes are folded into the clone first and member drafts handed out
    /// earlier become stale. Every structural member whose value changed is recorded as a
    /// `replace` patch.
    pub fn update_record<T, R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R>
    where
        T: Record,
    {
        let (mut record, before) = self.arena()?.lend_record(self.id)?;
        let outcome = match record.as_any_mut().downcast_mut::<T>() {
            Some(typed) => Ok(f(typed)),
            None => Err(Error::TypeMismatch(format!(
                "record is a {}",
                record.type_name()
            ))),
        };
        let mut arena = self
            .scope
            .arena
            .try_borrow_mut()
            .map_err(|_| Error::InvalidOperation("draft re-entered while busy".into()))?;
        arena.return_record(self.id, record, before)?;
        outcome
    }
}

/// Result of finalizing a draft session.
#[derive(Clone, Debug)]
pub struct Produced {
    pub value: Value,
    pub patches: Vec<Patch>,
    pub inverse_patches: Vec<Patch>,
}

/// A root draft over one base snapshot, finished explicitly.
///
/// Finishing or dropping the session revokes every draft it handed out.
pub struct DraftSession {
    scope: Rc<Scope>,
    root: Draft,
}

impl DraftSession {
    pub(crate) fn new(base: Value, config: &Config, record: bool) -> Result<Self> {
        let base = Freezer::new(config.max_depth).freeze(base)?;
        let arena = Arena {
            states: vec![DraftState::new(base, None)],
            max_depth: config.max_depth,
            recorder: record.then(|| Recorder::new(config.inverse_patches)),
        };
        let scope = Rc::new(Scope {
            arena: RefCell::new(arena),
            revoked: Cell::new(false),
        });
        let root = Draft {
            scope: Rc::clone(&scope),
            id: ROOT,
        };
        Ok(Self { scope, root })
    }

    pub fn root(&self) -> &Draft {
        &self.root
    }

    /// Commits the drafts into a new sealed snapshot.
    pub fn finish(self) -> Result<Produced> {
        self.finish_with(None)
    }

    /// Commits, or adopts `replacement` as the whole result when the recipe returned one.
    pub(crate) fn finish_with(self, replacement: Option<Value>) -> Result<Produced> {
        let mut arena = self
            .scope
            .arena
            .try_borrow_mut()
            .map_err(|_| Error::InvalidOperation("draft session finished while busy".into()))?;
        self.scope.revoked.set(true);

        let modified = arena.states[ROOT].modified;
        let base = arena.states[ROOT].base.clone();
        let mut freezer = arena.freezer();

        let replacement = match replacement {
            Some(_) if modified => {
                return Err(Error::InvalidOperation(
                    "recipe returned a replacement value and also modified its draft".into(),
                ))
            }
            Some(value) => Some(freezer.freeze(value)?),
            None => None,
        };
        let recorder = arena.recorder.take();

        let (value, patches, inverse_patches) = match replacement {
            Some(value) if value.ptr_eq(&base) => (value, Vec::new(), Vec::new()),
            Some(value) => {
                let (patches, inverse) = match recorder {
                    Some(rec) => (
                        vec![Patch::replace(Path::root(), value.clone())],
                        if rec.wants_inverse() {
                            vec![Patch::replace(Path::root(), base)]
                        } else {
                            Vec::new()
                        },
                    ),
                    None => (Vec::new(), Vec::new()),
                };
                (value, patches, inverse)
            }
            None => {
                let value = arena.materialize(ROOT, &mut freezer)?;
                let (patches, inverse) = recorder.map(Recorder::finish).unwrap_or_default();
                (value, patches, inverse)
            }
        };

        tracing::debug!(
            modified,
            patches = patches.len(),
            drafts = arena.states.len(),
            "draft session finished"
        );
        Ok(Produced {
            value,
            patches,
            inverse_patches,
        })
    }
}

impl Drop for DraftSession {
    fn drop(&mut self) {
        self.scope.revoked.set(true);
    }
}
