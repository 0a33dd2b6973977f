//! Native OS architecture detection

use crate::config::OsArch;

/// Architecture of the operating system, not of this process
///
/// A 32-bit build running under WOW64 still reports 64-bit.
#[cfg(windows)]
#[expect(unsafe_code, reason = "Windows FFI for GetNativeSystemInfo")]
pub fn native_arch() -> OsArch {
    use windows::Win32::System::SystemInformation::{
        GetNativeSystemInfo, PROCESSOR_ARCHITECTURE_AMD64, PROCESSOR_ARCHITECTURE_ARM64,
        PROCESSOR_ARCHITECTURE_IA64,
    };

    // SAFETY: GetNativeSystemInfo only writes the returned struct, and the
    // union read below is the documented way to access the architecture.
    let arch = unsafe {
        let info = GetNativeSystemInfo();
        info.Anonymous.Anonymous.wProcessorArchitecture
    };

    let os_arch = if arch == PROCESSOR_ARCHITECTURE_AMD64
        || arch == PROCESSOR_ARCHITECTURE_ARM64
        || arch == PROCESSOR_ARCHITECTURE_IA64
    {
        OsArch::Bit64
    } else {
        OsArch::Bit32
    };
    tracing::debug!("Native architecture {:?} -> {:?}", arch, os_arch);
    os_arch
}

/// Pointer width of the build on platforms without native detection
#[cfg(not(windows))]
pub fn native_arch() -> OsArch {
    if cfg!(target_pointer_width = "64") {
        OsArch::Bit64
    } else {
        OsArch::Bit32
    }
}
