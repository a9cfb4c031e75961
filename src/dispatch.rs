//! Interrupt dispatch
//!
//! Hardware vectors know nothing about channels: each vector handler just calls
//! [`InterruptTable::dispatch`] with its module id, and the table forwards to the one
//! channel bound to that module. The table is filled once during startup and only read
//! afterwards, from interrupt context.

use portable_atomic::{AtomicU32, Ordering};

use crate::descriptor::{ModuleId, MAX_MODULES};
use crate::error::ConfigError;

pub trait InterruptService {
    /// Module whose interrupt this service owns
    fn module_id(&self) -> ModuleId;

    /// Interrupt context entry. Must not block, log or allocate.
    fn on_interrupt(&self);
}

pub struct InterruptTable<'a> {
    owners: [Option<&'a (dyn InterruptService + Sync)>; MAX_MODULES],
    spurious: AtomicU32,
}

impl<'a> InterruptTable<'a> {
    pub const fn new() -> Self {
        Self {
            owners: [None; MAX_MODULES],
            spurious: AtomicU32::new(0),
        }
    }

    pub fn bind(&mut self, owner: &'a (dyn InterruptService + Sync)) -> Result<(), ConfigError> {
        let module = owner.module_id();
        let slot = self
            .owners
            .get_mut(module.index())
            .ok_or(ConfigError::ModuleOutOfRange { module })?;
        if slot.is_some() {
            return Err(ConfigError::DuplicateModule { module });
        }
        *slot = Some(owner);
        Ok(())
    }

    /// Forward an interrupt of `module` to its owner
    pub fn dispatch(&self, module: ModuleId) {
        match self.owners.get(module.index()).copied().flatten() {
            Some(owner) => owner.on_interrupt(),
            None => {
                self.spurious.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn is_bound(&self, module: ModuleId) -> bool {
        matches!(self.owners.get(module.index()), Some(Some(_)))
    }

    /// Interrupts that arrived for a module nobody owns
    pub fn spurious(&self) -> u32 {
        self.spurious.load(Ordering::Relaxed)
    }
}

impl Default for InterruptTable<'_> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        module: ModuleId,
        hits: AtomicU32,
    }

    impl Counter {
        fn new(module: u8) -> Self {
            Self {
                module: ModuleId(module),
                hits: AtomicU32::new(0),
            }
        }
    }

    impl InterruptService for Counter {
        fn module_id(&self) -> ModuleId {
            self.module
        }

        fn on_interrupt(&self) {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn routes_each_module_to_its_owner() {
        let a = Counter::new(0);
        let b = Counter::new(2);
        let mut table = InterruptTable::new();
        table.bind(&a).unwrap();
        table.bind(&b).unwrap();

        table.dispatch(ModuleId(2));
        table.dispatch(ModuleId(2));
        table.dispatch(ModuleId(0));

        assert_eq!(a.hits.load(Ordering::Relaxed), 1);
        assert_eq!(b.hits.load(Ordering::Relaxed), 2);
        assert_eq!(table.spurious(), 0);
    }

    #[test]
    fn second_owner_for_a_module_is_rejected() {
        let a = Counter::new(1);
        let b = Counter::new(1);
        let mut table = InterruptTable::new();
        table.bind(&a).unwrap();
        assert_eq!(
            table.bind(&b),
            Err(ConfigError::DuplicateModule { module: ModuleId(1) })
        );
    }

    #[test]
    fn unbound_interrupt_counts_as_spurious() {
        let table = InterruptTable::new();
        table.dispatch(ModuleId(3));
        table.dispatch(ModuleId(MAX_MODULES as u8));
        assert_eq!(table.spurious(), 2);
        assert!(!table.is_bound(ModuleId(3)));
    }

    #[test]
    fn out_of_range_module_cannot_bind() {
        let a = Counter::new(MAX_MODULES as u8);
        let mut table = InterruptTable::new();
        assert!(matches!(
            table.bind(&a),
            Err(ConfigError::ModuleOutOfRange { .. })
        ));
    }
}
