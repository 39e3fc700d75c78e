use crate::config::Config;
use crate::draft::{Draft, DraftSession, Produced};
use crate::error::{Error, Result};
use crate::freeze::Freezer;
use crate::value::Value;

/// What a recipe may hand back besides mutating its draft.
///
/// `()` keeps the drafted result; a `Value` replaces the whole result.
pub trait RecipeOutput {
    fn into_replacement(self) -> Option<Value>;
}

impl RecipeOutput for () {
    fn into_replacement(self) -> Option<Value> {
        None
    }
}

impl RecipeOutput for Value {
    fn into_replacement(self) -> Option<Value> {
        Some(self)
    }
}

impl RecipeOutput for Option<Value> {
    fn into_replacement(self) -> Option<Value> {
        self
    }
}

/// Entry point for producing snapshots under a given [`Config`].
#[derive(Clone, Debug, Default)]
pub struct Engine {
    config: Config,
}

impl Engine {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Seals `value` and everything reachable from it.
    pub fn freeze(&self, value: Value) -> Result<Value> {
        Freezer::new(self.config.max_depth).freeze(value)
    }

    /// Opens a draft session without patch recording.
    pub fn draft(&self, base: &Value) -> Result<DraftSession> {
        DraftSession::new(base.clone(), &self.config, false)
    }

    /// Opens a draft session that records forward and, if configured, inverse patches.
    pub fn draft_with_patches(&self, base: &Value) -> Result<DraftSession> {
        DraftSession::new(base.clone(), &self.config, true)
    }

    /// Runs `recipe` against a draft of `base` and commits the result.
    ///
    /// Untouched subtrees of `base` are shared by reference with the result. When the recipe
    /// fails, its error is returned unchanged and `base` is left as it was.
    pub fn produce<R, E, F>(&self, base: &Value, recipe: F) -> std::result::Result<Value, E>
    where
        R: RecipeOutput,
        E: From<Error>,
        F: FnOnce(&Draft) -> std::result::Result<R, E>,
    {
        let session = self.draft(base)?;
        let output = recipe(session.root())?;
        Ok(session.finish_with(output.into_replacement())?.value)
    }

    /// Like [`Engine::produce`], also returning the recorded patches.
    pub fn produce_with_patches<R, E, F>(
        &self,
        base: &Value,
        recipe: F,
    ) -> std::result::Result<Produced, E>
    where
        R: RecipeOutput,
        E: From<Error>,
        F: FnOnce(&Draft) -> std::result::Result<R, E>,
    {
        let session = self.draft_with_patches(base)?;
        let output = recipe(session.root())?;
        Ok(session.finish_with(output.into_replacement())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Value {
        Engine::default()
            .freeze(Value::map([
                ("left", Value::map([("n", 1i64)])),
                ("right", Value::map([("n", 2i64)])),
            ]))
            .unwrap()
    }

    #[test]
    fn untouched_siblings_are_shared() {
        let base = base();
        let next = Engine::default()
            .produce(&base, |d| d.child("left")?.set("n", 10i64))
            .unwrap();
        assert!(next.get("right").unwrap().ptr_eq(&base.get("right").unwrap()));
        assert!(!next.get("left").unwrap().ptr_eq(&base.get("left").unwrap()));
        assert_eq!(base.get_in(&crate::path!["left", "n"]), Some(Value::from(1i64)));
        assert!(next.is_deep_sealed());
    }

    #[test]
    fn recipe_errors_propagate_and_base_survives() {
        #[derive(Debug, PartialEq)]
        enum AppError {
            Engine(Error),
            Rejected,
        }
        impl From<Error> for AppError {
            fn from(e: Error) -> Self {
                AppError::Engine(e)
            }
        }

        let base = base();
        let err = Engine::default()
            .produce(&base, |d| -> std::result::Result<(), AppError> {
                d.child("left")?.set("n", 5i64)?;
                Err(AppError::Rejected)
            })
            .unwrap_err();
        assert_eq!(err, AppError::Rejected);
        assert_eq!(base.get_in(&crate::path!["left", "n"]), Some(Value::from(1i64)));
    }

    #[test]
    fn returned_value_replaces_result_and_is_frozen() {
        let base = base();
        let out = Engine::default()
            .produce_with_patches(&base, |_| Ok::<_, Error>(Value::seq(vec![1i64])))
            .unwrap();
        assert!(out.value.is_deep_sealed());
        assert_eq!(out.value, Value::seq(vec![1i64]));
        assert_eq!(out.patches, vec![crate::Patch::replace(crate::Path::root(), out.value.clone())]);
        assert_eq!(out.inverse_patches[0].value.as_ref(), Some(&base));
    }

    #[test]
    fn replacement_after_modification_is_rejected() {
        let err = Engine::default()
            .produce(&base(), |d| {
                d.set("extra", 1i64)?;
                Ok::<_, Error>(Value::null())
            })
            .unwrap_err();
        assert!(matches!(err, Error::InvalidOperation(_)));
    }

    #[test]
    fn inverse_patches_can_be_switched_off() {
        let engine = Engine::new(Config::default().with_inverse_patches(false));
        let out = engine
            .produce_with_patches(&base(), |d| d.set("extra", 1i64))
            .unwrap();
        assert_eq!(out.patches.len(), 1);
        assert!(out.inverse_patches.is_empty());
    }
}
