use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::Arc;

use tracing::warn;

use crate::config::DEFAULT_MAX_DEPTH;
use crate::error::{Error, Result};
use crate::freeze::Freezer;
use crate::path::{Path, PathSeg};
use crate::record::{records_equal, Record};

/// Scalar value. Leaves have no identity and are never drafted.
///
/// Leaves are totally ordered (floats via `total_cmp`) so they can be members of a set.
#[derive(Clone, Debug)]
pub enum Leaf {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Leaf {
    fn rank(&self) -> u8 {
        match self {
            Leaf::Null => 0,
            Leaf::Bool(_) => 1,
            Leaf::Int(_) => 2,
            Leaf::Float(_) => 3,
            Leaf::Str(_) => 4,
        }
    }
}

impl Ord for Leaf {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Leaf::Null, Leaf::Null) => Ordering::Equal,
            (Leaf::Bool(a), Leaf::Bool(b)) => a.cmp(b),
            (Leaf::Int(a), Leaf::Int(b)) => a.cmp(b),
            (Leaf::Float(a), Leaf::Float(b)) => a.total_cmp(b),
            (Leaf::Str(a), Leaf::Str(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Leaf {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Leaf {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other).is_eq()
    }
}

impl Eq for Leaf {}

impl Hash for Leaf {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Leaf::Null => {}
            Leaf::Bool(b) => b.hash(state),
            Leaf::Int(n) => n.hash(state),
            Leaf::Float(f) => f.to_bits().hash(state),
            Leaf::Str(s) => s.hash(state),
        }
    }
}

impl fmt::Display for Leaf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Leaf::Null => f.write_str("null"),
            Leaf::Bool(b) => write!(f, "{b}"),
            Leaf::Int(n) => write!(f, "{n}"),
            Leaf::Float(x) => write!(f, "{x}"),
            Leaf::Str(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<bool> for Leaf {
    fn from(b: bool) -> Self {
        Leaf::Bool(b)
    }
}

impl From<i64> for Leaf {
    fn from(n: i64) -> Self {
        Leaf::Int(n)
    }
}

impl From<f64> for Leaf {
    fn from(x: f64) -> Self {
        Leaf::Float(x)
    }
}

impl From<&str> for Leaf {
    fn from(s: &str) -> Self {
        Leaf::Str(s.to_string())
    }
}

impl From<String> for Leaf {
    fn from(s: String) -> Self {
        Leaf::Str(s)
    }
}

/// Container kind of a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Kind {
    Leaf,
    Seq,
    Map,
    Set,
    Record,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Kind::Leaf => "leaf",
            Kind::Seq => "sequence",
            Kind::Map => "mapping",
            Kind::Set => "set",
            Kind::Record => "record",
        })
    }
}

#[derive(Debug)]
pub(crate) struct NodeInner<T> {
    pub(crate) sealed: bool,
    pub(crate) data: T,
}

// Copies made for copy-on-write start out unsealed.
impl<T: Clone> Clone for NodeInner<T> {
    fn clone(&self) -> Self {
        Self {
            sealed: false,
            data: self.data.clone(),
        }
    }
}

/// Reference-counted container node. Cloning a `Node` shares it; identity is pointer identity.
pub struct Node<T>(pub(crate) Arc<NodeInner<T>>);

impl<T> Clone for Node<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T> Node<T> {
    /// New unsealed node owned by the caller.
    pub fn new(data: T) -> Self {
        Self(Arc::new(NodeInner {
            sealed: false,
            data,
        }))
    }

    pub(crate) fn sealed(data: T) -> Self {
        Self(Arc::new(NodeInner { sealed: true, data }))
    }

    pub fn is_sealed(&self) -> bool {
        self.0.sealed
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

impl<T: Clone> Node<T> {
    /// In-place access for the owner of an unsealed node. Shared nodes are copied first.
    pub fn make_mut(&mut self) -> Result<&mut T> {
        if self.is_sealed() {
            return Err(Error::Sealed("container is part of a snapshot".into()));
        }
        Ok(&mut Arc::make_mut(&mut self.0).data)
    }
}

impl<T> Deref for Node<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0.data
    }
}

impl<T: fmt::Debug> fmt::Debug for Node<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.data.fmt(f)
    }
}

pub(crate) struct RecordCell {
    pub(crate) sealed: bool,
    pub(crate) record: Box<dyn Record>,
}

impl Clone for RecordCell {
    fn clone(&self) -> Self {
        Self {
            sealed: false,
            record: self.record.clone_record(),
        }
    }
}

/// Shared handle to a capability-marked record.
#[derive(Clone)]
pub struct RecordRef(pub(crate) Arc<RecordCell>);

impl RecordRef {
    pub fn new<R: Record>(record: R) -> Self {
        Self::from_box(Box::new(record))
    }

    pub fn from_box(record: Box<dyn Record>) -> Self {
        Self(Arc::new(RecordCell {
            sealed: false,
            record,
        }))
    }

    pub(crate) fn sealed_from_box(record: Box<dyn Record>) -> Self {
        Self(Arc::new(RecordCell {
            sealed: true,
            record,
        }))
    }

    pub fn is_sealed(&self) -> bool {
        self.0.sealed
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    pub fn type_name(&self) -> &'static str {
        self.0.record.type_name()
    }

    pub fn fields(&self) -> &'static [&'static str] {
        self.0.record.fields()
    }

    /// Reads a structural member. Members of a sealed record are returned sealed.
    ///
    /// A projected member that cannot be sealed is withheld rather than handed out unsealed.
    pub fn get(&self, field: &str) -> Option<Value> {
        let value = self.0.record.get(field)?;
        if !self.is_sealed() || value.is_sealed() {
            return Some(value);
        }
        match Freezer::new(DEFAULT_MAX_DEPTH).freeze(value) {
            Ok(frozen) => Some(frozen),
            Err(err) => {
                warn!(
                    record = self.type_name(),
                    field,
                    error = %err,
                    "sealed record member could not be frozen"
                );
                None
            }
        }
    }

    pub fn record(&self) -> &dyn Record {
        self.0.record.as_ref()
    }

    pub fn downcast_ref<T: Record>(&self) -> Option<&T> {
        self.0.record.as_any().downcast_ref::<T>()
    }

    /// In-place access for the owner of an unsealed record. Shared records are cloned first.
    pub fn make_mut<T: Record>(&mut self) -> Result<&mut T> {
        if self.is_sealed() {
            return Err(Error::Sealed(format!(
                "record {} is part of a snapshot",
                self.type_name()
            )));
        }
        let name = self.type_name();
        Arc::make_mut(&mut self.0)
            .record
            .as_any_mut()
            .downcast_mut::<T>()
            .ok_or_else(|| Error::TypeMismatch(format!("record is a {name}")))
    }
}

impl fmt::Debug for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.record.fmt(f)
    }
}

/// A node of a snapshot tree.
///
/// Cloning a `Value` is cheap and shares every container node. Values built by callers are
/// unsealed and may be edited in place by their owner; values returned by the engine are
/// sealed all the way down.
#[derive(Clone)]
pub enum Value {
    Leaf(Leaf),
    Seq(Node<Vec<Value>>),
    Map(Node<BTreeMap<String, Value>>),
    Set(Node<BTreeSet<Leaf>>),
    Record(RecordRef),
}

impl Value {
    pub fn null() -> Self {
        Value::Leaf(Leaf::Null)
    }

    pub fn seq<I, V>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Value::Seq(Node::new(items.into_iter().map(Into::into).collect()))
    }

    pub fn map<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Value::Map(Node::new(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        ))
    }

    pub fn set<I, L>(members: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<Leaf>,
    {
        Value::Set(Node::new(members.into_iter().map(Into::into).collect()))
    }

    pub fn record<R: Record>(record: R) -> Self {
        Value::Record(RecordRef::new(record))
    }

    pub fn kind(&self) -> Kind {
        match self {
            Value::Leaf(_) => Kind::Leaf,
            Value::Seq(_) => Kind::Seq,
            Value::Map(_) => Kind::Map,
            Value::Set(_) => Kind::Set,
            Value::Record(_) => Kind::Record,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Value::Leaf(_))
    }

    /// Shallow seal check. Leaves are always sealed.
    pub fn is_sealed(&self) -> bool {
        match self {
            Value::Leaf(_) => true,
            Value::Seq(n) => n.is_sealed(),
            Value::Map(n) => n.is_sealed(),
            Value::Set(n) => n.is_sealed(),
            Value::Record(r) => r.is_sealed(),
        }
    }

    /// Whether this node and everything reachable from it is sealed.
    pub fn is_deep_sealed(&self) -> bool {
        if !self.is_sealed() {
            return false;
        }
        match self {
            Value::Leaf(_) | Value::Set(_) => true,
            Value::Seq(n) => n.iter().all(Value::is_deep_sealed),
            Value::Map(n) => n.values().all(Value::is_deep_sealed),
            Value::Record(r) => r
                .fields()
                .iter()
                .filter_map(|f| r.get(f))
                .all(|v| v.is_deep_sealed()),
        }
    }

    /// Node identity. Leaves have no identity and compare by value.
    pub fn ptr_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Leaf(a), Value::Leaf(b)) => a == b,
            (Value::Seq(a), Value::Seq(b)) => a.ptr_eq(b),
            (Value::Map(a), Value::Map(b)) => a.ptr_eq(b),
            (Value::Set(a), Value::Set(b)) => a.ptr_eq(b),
            (Value::Record(a), Value::Record(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    pub(crate) fn addr(&self) -> Option<usize> {
        match self {
            Value::Leaf(_) => None,
            Value::Seq(n) => Some(n.addr()),
            Value::Map(n) => Some(n.addr()),
            Value::Set(n) => Some(n.addr()),
            Value::Record(r) => Some(r.addr()),
        }
    }

    pub fn as_leaf(&self) -> Option<&Leaf> {
        match self {
            Value::Leaf(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Leaf(Leaf::Int(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Leaf(Leaf::Float(x)) => Some(*x),
            Value::Leaf(Leaf::Int(n)) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Leaf(Leaf::Str(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Leaf(Leaf::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn as_seq(&self) -> Option<&Node<Vec<Value>>> {
        match self {
            Value::Seq(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Node<BTreeMap<String, Value>>> {
        match self {
            Value::Map(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_set(&self) -> Option<&Node<BTreeSet<Leaf>>> {
        match self {
            Value::Set(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&RecordRef> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }

    /// Downcasts a record value to its concrete type.
    pub fn record_ref<T: Record>(&self) -> Option<&T> {
        self.as_record().and_then(RecordRef::downcast_ref::<T>)
    }

    /// Number of children. Leaves have none.
    pub fn len(&self) -> usize {
        match self {
            Value::Leaf(_) => 0,
            Value::Seq(n) => n.len(),
            Value::Map(n) => n.len(),
            Value::Set(n) => n.len(),
            Value::Record(r) => r.fields().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Child at `seg`. Sets have no addressable children.
    pub fn get(&self, seg: impl Into<PathSeg>) -> Option<Value> {
        let seg = seg.into();
        match self {
            Value::Leaf(_) | Value::Set(_) => None,
            Value::Seq(n) => seq_index(&seg).and_then(|i| n.get(i).cloned()),
            Value::Map(n) => n.get(&map_key(&seg)).cloned(),
            Value::Record(r) => seg.as_key().and_then(|k| r.get(k)),
        }
    }

    pub fn get_in(&self, path: &Path) -> Option<Value> {
        let mut cur = self.clone();
        for seg in path {
            cur = cur.get(seg.clone())?;
        }
        Some(cur)
    }

    pub fn seq_mut(&mut self) -> Result<&mut Vec<Value>> {
        match self {
            Value::Seq(n) => n.make_mut(),
            other => Err(Error::TypeMismatch(format!("expected sequence, found {}", other.kind()))),
        }
    }

    pub fn map_mut(&mut self) -> Result<&mut BTreeMap<String, Value>> {
        match self {
            Value::Map(n) => n.make_mut(),
            other => Err(Error::TypeMismatch(format!("expected mapping, found {}", other.kind()))),
        }
    }

    pub fn set_mut(&mut self) -> Result<&mut BTreeSet<Leaf>> {
        match self {
            Value::Set(n) => n.make_mut(),
            other => Err(Error::TypeMismatch(format!("expected set, found {}", other.kind()))),
        }
    }

    pub fn record_mut<T: Record>(&mut self) -> Result<&mut T> {
        match self {
            Value::Record(r) => r.make_mut::<T>(),
            other => Err(Error::TypeMismatch(format!("expected record, found {}", other.kind()))),
        }
    }
}

/// Sequence index for a segment; decimal string keys are accepted.
pub(crate) fn seq_index(seg: &PathSeg) -> Option<usize> {
    match seg {
        PathSeg::Index(i) => Some(*i),
        PathSeg::Key(k) => k.parse().ok(),
    }
}

/// Mapping key for a segment; integer indices are rendered as strings.
pub(crate) fn map_key(seg: &PathSeg) -> String {
    match seg {
        PathSeg::Key(k) => k.clone(),
        PathSeg::Index(i) => i.to_string(),
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        match (self, other) {
            (Value::Leaf(a), Value::Leaf(b)) => a == b,
            (Value::Seq(a), Value::Seq(b)) => a[..] == b[..],
            (Value::Map(a), Value::Map(b)) => **a == **b,
            (Value::Set(a), Value::Set(b)) => **a == **b,
            (Value::Record(a), Value::Record(b)) => records_equal(a.record(), b.record()),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Leaf(l) => l.fmt(f),
            Value::Seq(n) => f.debug_list().entries(n.iter()).finish(),
            Value::Map(n) => f.debug_map().entries(n.iter()).finish(),
            Value::Set(n) => f.debug_set().entries(n.iter()).finish(),
            Value::Record(r) => r.fmt(f),
        }
    }
}

impl From<Leaf> for Value {
    fn from(leaf: Leaf) -> Self {
        Value::Leaf(leaf)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Leaf(Leaf::Bool(b))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Leaf(Leaf::Int(n))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Leaf(Leaf::Float(x))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Leaf(Leaf::Str(s.to_string()))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Leaf(Leaf::Str(s))
    }
}

impl From<RecordRef> for Value {
    fn from(r: RecordRef) -> Self {
        Value::Record(r)
    }
}

impl<V: Into<Value>> From<Vec<V>> for Value {
    fn from(items: Vec<V>) -> Self {
        Value::seq(items)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(entries: BTreeMap<String, Value>) -> Self {
        Value::Map(Node::new(entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaves_order_across_kinds() {
        let mut leaves = vec![
            Leaf::from("b"),
            Leaf::Float(1.5),
            Leaf::Int(3),
            Leaf::Null,
            Leaf::Bool(true),
        ];
        leaves.sort();
        assert_eq!(
            leaves,
            vec![
                Leaf::Null,
                Leaf::Bool(true),
                Leaf::Int(3),
                Leaf::Float(1.5),
                Leaf::from("b"),
            ]
        );
        assert_eq!(Leaf::Float(f64::NAN), Leaf::Float(f64::NAN));
    }

    #[test]
    fn caller_built_values_are_unsealed_and_editable() {
        let mut v = Value::seq(vec![1i64, 2]);
        assert!(!v.is_sealed());
        v.seq_mut().unwrap().push(Value::from(3i64));
        assert_eq!(v, Value::seq(vec![1i64, 2, 3]));
    }

    #[test]
    fn editing_a_shared_unsealed_value_copies_it() {
        let mut a = Value::map([("k", 1i64)]);
        let b = a.clone();
        assert!(a.ptr_eq(&b));
        a.map_mut().unwrap().insert("k".into(), Value::from(2i64));
        assert!(!a.ptr_eq(&b));
        assert_eq!(b.get("k"), Some(Value::from(1i64)));
    }

    #[test]
    fn sealed_values_refuse_in_place_edits() {
        let mut v = Value::Seq(Node::sealed(vec![Value::from(1i64)]));
        assert!(matches!(v.seq_mut(), Err(Error::Sealed(_))));
    }

    #[test]
    fn segments_are_normalized_per_kind() {
        let seq = Value::seq(vec!["a", "b"]);
        assert_eq!(seq.get("1"), Some(Value::from("b")));
        let map = Value::map([("0", true)]);
        assert_eq!(map.get(0usize), Some(Value::from(true)));
        assert_eq!(Value::set(["x"]).get(0usize), None);
    }

    #[derive(Clone, Debug)]
    struct Chain(usize);

    impl Record for Chain {
        fn type_name(&self) -> &'static str {
            "Chain"
        }

        fn fields(&self) -> &'static [&'static str] {
            &["links"]
        }

        fn get(&self, field: &str) -> Option<Value> {
            (field == "links").then(|| {
                let mut v = Value::seq(vec![0i64]);
                for _ in 0..self.0 {
                    v = Value::seq(vec![v]);
                }
                v
            })
        }

        fn set(&mut self, _field: &str, _value: Value) -> Result<()> {
            Ok(())
        }

        fn clone_record(&self) -> Box<dyn Record> {
            Box::new(self.clone())
        }

        fn freeze_members(&mut self, _freezer: &mut Freezer) -> Result<()> {
            Ok(())
        }

        fn as_any(&self) -> &dyn std::any::Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
            self
        }
    }

    #[test]
    fn sealed_record_withholds_members_it_cannot_seal() {
        let shallow = Freezer::default().freeze(Value::record(Chain(2))).unwrap();
        let links = shallow.as_record().unwrap().get("links").unwrap();
        assert!(links.is_deep_sealed());

        let deep = Freezer::default()
            .freeze(Value::record(Chain(DEFAULT_MAX_DEPTH + 8)))
            .unwrap();
        assert!(deep.is_sealed());
        assert_eq!(deep.as_record().unwrap().get("links"), None);
    }
}
