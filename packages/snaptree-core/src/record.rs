use std::any::Any;
use std::fmt;

use crate::error::Result;
use crate::freeze::Freezer;
use crate::value::Value;

/// Capability implemented by custom structured values that take part in copy-on-write.
///
/// A record is never enumerated generically: the engine reads and writes it only through
/// this trait, so members that are computed from others (such as a current price derived
/// from a price history) survive cloning and are never written as if they were stored.
///
/// Only structural members are listed by [`Record::fields`]. Equality of two records is
/// equality of their type names and of every structural member.
pub trait Record: Any + fmt::Debug + Send + Sync {
    /// Stable name of the record type, used for equality and diagnostics.
    fn type_name(&self) -> &'static str;

    /// Names of the structural members, in a stable order.
    fn fields(&self) -> &'static [&'static str];

    /// Current value of a structural member.
    ///
    /// Members stored as [`Value`]s keep their node identity across reads. Members projected
    /// from plain Rust data are rebuilt on every call, so two reads never share a node, and a
    /// sealed record seals each projection as it is read.
    fn get(&self, field: &str) -> Option<Value>;

    /// Replace a structural member.
    fn set(&mut self, field: &str, value: Value) -> Result<()>;

    /// A structurally independent copy. Mutating the copy must never be observable through
    /// `self`.
    fn clone_record(&self) -> Box<dyn Record>;

    /// Freeze every container member this record owns.
    ///
    /// The default reads each structural member, freezes it and stores it back. Records that
    /// only own plain Rust data can override this with a no-op.
    fn freeze_members(&mut self, freezer: &mut Freezer) -> Result<()> {
        for field in self.fields() {
            let Some(value) = self.get(field) else {
                continue;
            };
            if value.is_sealed() {
                continue;
            }
            let frozen = freezer.freeze(value)?;
            self.set(field, frozen)?;
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Structural equality as defined on [`Record`].
pub(crate) fn records_equal(a: &dyn Record, b: &dyn Record) -> bool {
    if a.type_name() != b.type_name() {
        return false;
    }
    let fields = a.fields();
    if fields != b.fields() {
        return false;
    }
    fields.iter().all(|f| a.get(f) == b.get(f))
}
