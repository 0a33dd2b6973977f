//! Single instance enforcement
//!
//! Two instances writing `app_config.json` and sharing `Apps/` would race, so
//! a Windows named mutex keeps a second one from starting.

use crate::error::Result;

#[cfg(windows)]
use crate::error::{AisError, StringError};
#[cfg(windows)]
use windows::Win32::Foundation::{CloseHandle, HANDLE};
#[cfg(windows)]
use windows::Win32::System::Threading::{CreateMutexW, OpenMutexW, SYNCHRONIZATION_SYNCHRONIZE};

/// Name of the machine-wide mutex
#[cfg(windows)]
const MUTEX_NAME: &str = "Global\\TekDT_AIS_SingleInstance_Mutex";

/// Held for the lifetime of the process, releases the mutex on drop
#[cfg(windows)]
pub struct SingleInstanceGuard {
    handle: HANDLE,
}

#[cfg(windows)]
impl SingleInstanceGuard {
    /// Acquire the mutex, failing if another instance holds it
    #[expect(unsafe_code, reason = "Windows FFI for named mutex creation")]
    pub fn acquire() -> Result<Self> {
        use tracing::{debug, error};
        use windows::core::HSTRING;

        let name = HSTRING::from(MUTEX_NAME);

        // SAFETY: `name` outlives both calls and the returned handles are
        // closed exactly once, here or in Drop.
        unsafe {
            if let Ok(existing) = OpenMutexW(SYNCHRONIZATION_SYNCHRONIZE, false, &name) {
                error!("Another instance of TekDT AIS is already running");
                let _ = CloseHandle(existing);
                return Err(AisError::ConfigError(StringError::new(
                    "Another instance of TekDT AIS is already running",
                )));
            }

            let handle = CreateMutexW(None, true, &name)
                .map_err(|e| AisError::ConfigError(Box::new(e)))?;
            debug!("Single instance mutex acquired");
            Ok(Self { handle })
        }
    }
}

#[cfg(windows)]
impl Drop for SingleInstanceGuard {
    #[expect(unsafe_code, reason = "Windows FFI for mutex cleanup")]
    fn drop(&mut self) {
        // SAFETY: the handle came from CreateMutexW and is closed only here.
        unsafe {
            let _ = CloseHandle(self.handle);
        }
        tracing::debug!("Single instance mutex released");
    }
}

/// No-op guard on platforms without named mutexes
#[cfg(not(windows))]
pub struct SingleInstanceGuard;

#[cfg(not(windows))]
impl SingleInstanceGuard {
    /// Always succeeds
    pub fn acquire() -> Result<Self> {
        Ok(Self)
    }
}
