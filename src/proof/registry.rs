//! Process-wide singletons, one per type

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::HashMap;

type Registry = HashMap<TypeId, Box<dyn Any + Send + Sync>>;

static SINGLETONS: Lazy<RwLock<Registry>> = Lazy::new(|| RwLock::new(HashMap::new()));

/// Return the singleton of type `T`, creating it with `init` on first use
///
/// Entries are inserted once and never replaced, so every caller gets a
/// handle to the same instance.
pub(crate) fn singleton<T>(init: impl FnOnce() -> T) -> T
where
    T: Any + Send + Sync + Clone,
{
    let id = TypeId::of::<T>();
    if let Some(existing) = SINGLETONS
        .read()
        .get(&id)
        .and_then(|value| value.downcast_ref::<T>())
    {
        return existing.clone();
    }

    let mut singletons = SINGLETONS.write();
    let entry = singletons.entry(id).or_insert_with(|| Box::new(init()));
    match entry.downcast_ref::<T>() {
        Some(value) => value.clone(),
        None => unreachable!("singleton registry is keyed by TypeId"),
    }
}
