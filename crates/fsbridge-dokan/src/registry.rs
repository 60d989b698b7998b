//! Process-wide mount registry.
//!
//! The native subsystem is global to the process: `DokanInit` must run
//! before the first mount and `DokanShutdown` after the last one. The
//! registry keeps the set of live sessions and performs those two calls on
//! the 0→1 and 1→0 transitions, under a single mutex.

use crate::callbacks::OPERATIONS;
use crate::driver::{platform_driver, MountPointInfo, NativeDriver};
use crate::error::{MountError, Result};
use crate::ffi::DOKAN_MINIMUM_COMPATIBLE_VERSION;
use crate::path::resolve_mount_point;
use crate::session::{Mount, MountSession};
use fsbridge_core::{Backend, Capabilities, DriverFlags, MountOptions};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{debug, info, warn};

struct RegistryState {
    sessions: HashMap<u64, Arc<MountSession>>,
    flags: DriverFlags,
}

struct RegistryInner {
    driver: Arc<dyn NativeDriver>,
    state: Mutex<RegistryState>,
}

/// Table of live mount sessions sharing one native driver.
///
/// Cloning is cheap; clones share the same table.
#[derive(Clone)]
pub struct MountRegistry {
    inner: Arc<RegistryInner>,
}

impl MountRegistry {
    /// A registry over an explicit driver
    pub fn new(driver: Arc<dyn NativeDriver>) -> Self {
        MountRegistry {
            inner: Arc::new(RegistryInner {
                driver,
                state: Mutex::new(RegistryState {
                    sessions: HashMap::new(),
                    flags: DriverFlags::default(),
                }),
            }),
        }
    }

    /// The process-wide registry over the platform driver
    pub fn global() -> &'static MountRegistry {
        static GLOBAL: OnceLock<MountRegistry> = OnceLock::new();
        GLOBAL.get_or_init(|| MountRegistry::new(platform_driver()))
    }

    pub fn driver(&self) -> &Arc<dyn NativeDriver> {
        &self.inner.driver
    }

    /// Replace the process-wide driver flags. Applies to later mounts.
    pub fn set_driver_flags(&self, flags: DriverFlags) {
        self.inner.state.lock().flags = flags;
    }

    pub fn driver_flags(&self) -> DriverFlags {
        self.inner.state.lock().flags
    }

    /// Number of live sessions
    pub fn len(&self) -> usize {
        self.inner.state.lock().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Mount `backend` at `mount_point` and wait for the driver to confirm.
    pub fn mount(
        &self,
        mount_point: &str,
        backend: Arc<dyn Backend>,
        options: MountOptions,
    ) -> Result<Mount> {
        let resolved = resolve_mount_point(mount_point).map_err(|_| MountError::BadMountPoint {
            mount_point: mount_point.to_string(),
        })?;
        let capabilities = Capabilities::of(backend.as_ref());
        let timeout = options.mount.mount_timeout_secs;

        let session = MountSession::new(
            resolved,
            backend,
            options,
            &self.driver_flags(),
            Arc::clone(&self.inner.driver),
        )?;

        self.register(&session)?;

        if let Err(e) = session.start(&OPERATIONS) {
            self.unregister(session.id());
            return Err(e);
        }

        if !session.wait_mounted(timeout.map(Duration::from_secs)) {
            if let Err(e) = session.close() {
                warn!(error = %e, "Close after mount timeout failed");
            }
            self.unregister(session.id());
            return Err(MountError::MountTimeout {
                mount_point: session.mount_point().to_string(),
                secs: timeout.unwrap_or_default(),
            });
        }

        info!(
            mount_point = %session.mount_point(),
            backend = session.backend().name(),
            capabilities = %capabilities,
            write_protect = session.is_write_protected(),
            "Mounted"
        );
        Ok(Mount::new(session, self.clone()))
    }

    /// Close a session and drop it from the table.
    pub(crate) fn close(&self, session: &Arc<MountSession>) -> Result<()> {
        let result = session.close();
        self.unregister(session.id());
        result
    }

    /// Active mounts as reported by the driver
    pub fn mount_points(&self) -> Result<Vec<MountPointInfo>> {
        self.inner.driver.mount_points(false)
    }

    fn register(&self, session: &Arc<MountSession>) -> Result<()> {
        let mut state = self.inner.state.lock();
        if state.sessions.is_empty() {
            let driver = &self.inner.driver;
            driver.init()?;
            let version = driver.version();
            if version < DOKAN_MINIMUM_COMPATIBLE_VERSION {
                if let Err(e) = driver.shutdown() {
                    warn!(error = %e, "Dokan shutdown failed");
                }
                return Err(MountError::VersionMismatch {
                    found: version,
                    required: DOKAN_MINIMUM_COMPATIBLE_VERSION,
                });
            }
            info!(
                driver = driver.name(),
                version,
                driver_version = driver.driver_version(),
                "Dokan initialized"
            );
        }
        state.sessions.insert(session.id(), Arc::clone(session));
        debug!(session = session.id(), live = state.sessions.len(), "Session registered");
        Ok(())
    }

    /// Forget a session. Unknown ids are ignored, so this is idempotent.
    fn unregister(&self, id: u64) {
        let mut state = self.inner.state.lock();
        if state.sessions.remove(&id).is_none() {
            return;
        }
        debug!(session = id, live = state.sessions.len(), "Session unregistered");
        if state.sessions.is_empty() {
            match self.inner.driver.shutdown() {
                Ok(()) => info!("Dokan shut down"),
                Err(e) => warn!(error = %e, "Dokan shutdown failed"),
            }
        }
    }
}
