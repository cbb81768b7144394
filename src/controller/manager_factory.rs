//! Manager Factory
//!
//! Binds a [`ResourceAccessor`] to `RemediationManager` construction, so
//! the reconciler and its tests share one seam. Grounded in
//! `original_source/pkg/baremetal/manager_factory.go`: the factory itself
//! holds no state beyond the accessor and clock; each reconcile gets a
//! fresh Manager over that reconcile's `(Remediation, Machine)` pair.

use std::sync::Arc;

use crate::crd::{Machine, Metal3Remediation};

use super::accessor::ResourceAccessor;
use super::clock::Clock;
use super::remediation_manager::RemediationManager;

pub struct ManagerFactory<A: ResourceAccessor> {
    accessor: Arc<A>,
    clock: Arc<dyn Clock>,
}

impl<A: ResourceAccessor> ManagerFactory<A> {
    pub fn new(accessor: Arc<A>, clock: Arc<dyn Clock>) -> Self {
        Self { accessor, clock }
    }

    pub fn new_remediation_manager(
        &self,
        remediation: Metal3Remediation,
        machine: Machine,
    ) -> RemediationManager<A> {
        RemediationManager::new(
            self.accessor.clone(),
            self.clock.clone(),
            remediation,
            machine,
        )
    }
}
