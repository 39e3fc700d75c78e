use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::warn;

use crate::config::DEFAULT_MAX_DEPTH;
use crate::error::{Error, Result};
use crate::value::{Node, RecordRef, Value};

/// Recursive sealer for one freeze pass.
///
/// Uniquely owned unsealed nodes are sealed in place. Shared unsealed nodes are copied, so a
/// caller who still holds a foreign value keeps an unsealed node that no snapshot can reach.
/// Records are never walked generically: a shared record is cloned through its own
/// capability and asked to freeze its members.
///
/// Nodes currently being frozen form the in-progress stack; meeting one of them again is a
/// cycle. Shared nodes that were already frozen in this pass are reused, so a DAG stays a DAG.
pub struct Freezer {
    max_depth: usize,
    stack: HashSet<usize>,
    // Keeps the original alive so its address cannot be reused during the pass.
    memo: HashMap<usize, (Value, Value)>,
}

impl Default for Freezer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DEPTH)
    }
}

impl Freezer {
    pub fn new(max_depth: usize) -> Self {
        Self {
            max_depth,
            stack: HashSet::new(),
            memo: HashMap::new(),
        }
    }

    /// Seals `value` and everything reachable from it.
    ///
    /// Idempotent: an already sealed value is returned as the same reference.
    pub fn freeze(&mut self, value: Value) -> Result<Value> {
        if value.is_sealed() {
            return Ok(value);
        }
        let Some(addr) = value.addr() else {
            return Ok(value);
        };
        if self.stack.contains(&addr) {
            warn!(kind = %value.kind(), depth = self.stack.len(), "freeze rejected cyclic structure");
            return Err(Error::CyclicStructure(format!(
                "{} is reachable from itself",
                value.kind()
            )));
        }
        if let Some((_, frozen)) = self.memo.get(&addr) {
            return Ok(frozen.clone());
        }
        if self.stack.len() >= self.max_depth {
            return Err(Error::TooDeep(self.max_depth));
        }

        self.stack.insert(addr);
        let result = self.freeze_node(value);
        self.stack.remove(&addr);
        result
    }

    fn freeze_node(&mut self, value: Value) -> Result<Value> {
        match value {
            Value::Leaf(_) => Ok(value),
            Value::Seq(mut node) => {
                if let Some(inner) = Arc::get_mut(&mut node.0) {
                    for item in inner.data.iter_mut() {
                        let child = std::mem::replace(item, Value::null());
                        *item = self.freeze(child)?;
                    }
                    inner.sealed = true;
                    return Ok(Value::Seq(node));
                }
                let items = node
                    .iter()
                    .cloned()
                    .map(|v| self.freeze(v))
                    .collect::<Result<Vec<_>>>()?;
                Ok(self.remember(Value::Seq(node), Value::Seq(Node::sealed(items))))
            }
            Value::Map(mut node) => {
                if let Some(inner) = Arc::get_mut(&mut node.0) {
                    for item in inner.data.values_mut() {
                        let child = std::mem::replace(item, Value::null());
                        *item = self.freeze(child)?;
                    }
                    inner.sealed = true;
                    return Ok(Value::Map(node));
                }
                let entries = node
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), self.freeze(v.clone())?)))
                    .collect::<Result<_>>()?;
                Ok(self.remember(Value::Map(node), Value::Map(Node::sealed(entries))))
            }
            Value::Set(mut node) => {
                if let Some(inner) = Arc::get_mut(&mut node.0) {
                    inner.sealed = true;
                    return Ok(Value::Set(node));
                }
                let members = (*node).clone();
                Ok(self.remember(Value::Set(node), Value::Set(Node::sealed(members))))
            }
            Value::Record(mut rec) => {
                if let Some(cell) = Arc::get_mut(&mut rec.0) {
                    cell.record.freeze_members(self)?;
                    cell.sealed = true;
                    return Ok(Value::Record(rec));
                }
                let mut copy = rec.record().clone_record();
                copy.freeze_members(self)?;
                Ok(self.remember(Value::Record(rec), Value::Record(RecordRef::sealed_from_box(copy))))
            }
        }
    }

    fn remember(&mut self, original: Value, frozen: Value) -> Value {
        if let Some(addr) = original.addr() {
            self.memo.insert(addr, (original, frozen.clone()));
        }
        frozen
    }
}
