use crate::patch::Patch;

/// Collects forward and inverse patches while a draft is being written.
///
/// Forward patches are kept in write order. Inverse patches are collected in the same order
/// and reversed on `finish`, so replaying them in sequence undoes the writes last-first.
#[derive(Debug, Default)]
pub(crate) struct Recorder {
    patches: Vec<Patch>,
    inverse: Option<Vec<Patch>>,
}

impl Recorder {
    pub(crate) fn new(with_inverse: bool) -> Self {
        Self {
            patches: Vec::new(),
            inverse: with_inverse.then(Vec::new),
        }
    }

    pub(crate) fn wants_inverse(&self) -> bool {
        self.inverse.is_some()
    }

    pub(crate) fn push(&mut self, forward: Patch, inverse: Option<Patch>) {
        self.patches.push(forward);
        if let (Some(list), Some(patch)) = (self.inverse.as_mut(), inverse) {
            list.push(patch);
        }
    }

    pub(crate) fn finish(self) -> (Vec<Patch>, Vec<Patch>) {
        let mut inverse = self.inverse.unwrap_or_default();
        inverse.reverse();
        (self.patches, inverse)
    }
}
