use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::debug;

use crate::vm::{VmError, VmResult};

static LIVE_REGIONS: AtomicUsize = AtomicUsize::new(0);

/// Number of executable mappings currently held by this process.
pub fn live_executable_regions() -> usize {
    LIVE_REGIONS.load(Ordering::SeqCst)
}

/// A writable, executable anonymous mapping. Unmapped on drop, so an error
/// anywhere between allocation and finalize cannot leak pages.
pub struct ExecutableRegion {
    ptr: NonNull<u8>,
    len: usize,
}

impl ExecutableRegion {
    /// Maps at least `size` bytes, rounded up to whole pages.
    pub fn allocate(size: usize) -> VmResult<Self> {
        let page = page_size();
        let len = size
            .max(1)
            .checked_next_multiple_of(page)
            .ok_or_else(|| {
                VmError::ResourceExhaustion(format!("region of {size} bytes overflows usize"))
            })?;
        let ptr = alloc_executable_region(len)?;
        LIVE_REGIONS.fetch_add(1, Ordering::SeqCst);
        debug!("mapped executable region len={len} at {ptr:p}");
        Ok(Self { ptr, len })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: the mapping is `len` bytes, readable and writable until
        // finalize consumes the region.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    /// Drops write permission and hands back a region that can only be read
    /// and executed. On failure the mapping is released.
    pub fn finalize(self) -> VmResult<FinalizedRegion> {
        finalize_executable_region(self.ptr, self.len)?;
        Ok(FinalizedRegion { region: self })
    }
}

impl Drop for ExecutableRegion {
    fn drop(&mut self) {
        LIVE_REGIONS.fetch_sub(1, Ordering::SeqCst);
        if let Err(err) = free_executable_region(self.ptr, self.len) {
            debug!("failed to release executable region: {err}");
        }
    }
}

pub struct FinalizedRegion {
    region: ExecutableRegion,
}

// SAFETY: a finalized region is never written again; sharing its address
// across threads only ever leads to reads and calls.
unsafe impl Send for FinalizedRegion {}
unsafe impl Sync for FinalizedRegion {}

impl FinalizedRegion {
    pub fn entry(&self) -> *const u8 {
        self.region.ptr.as_ptr()
    }

    pub fn len(&self) -> usize {
        self.region.len
    }

    pub fn is_empty(&self) -> bool {
        self.region.len == 0
    }

    pub fn bytes(&self, len: usize) -> &[u8] {
        let len = len.min(self.region.len);
        // SAFETY: the mapping stays readable for as long as `self` lives.
        unsafe { std::slice::from_raw_parts(self.region.ptr.as_ptr(), len) }
    }
}

fn mapping_failed(call: &str) -> VmError {
    VmError::ResourceExhaustion(format!(
        "{call} failed: {}",
        std::io::Error::last_os_error()
    ))
}

#[cfg(unix)]
fn page_size() -> usize {
    let raw = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    usize::try_from(raw)
        .ok()
        .filter(|size| size.is_power_of_two())
        .unwrap_or(4096)
}

#[cfg(not(unix))]
fn page_size() -> usize {
    4096
}

#[cfg(all(unix, not(target_os = "macos")))]
fn alloc_executable_region(len: usize) -> VmResult<NonNull<u8>> {
    let ptr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            len,
            libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC,
            libc::MAP_ANON | libc::MAP_PRIVATE,
            -1,
            0,
        )
    };
    if ptr == libc::MAP_FAILED {
        return Err(mapping_failed("mmap(PROT_READ|PROT_WRITE|PROT_EXEC)"));
    }
    NonNull::new(ptr as *mut u8).ok_or_else(|| mapping_failed("mmap"))
}

#[cfg(target_os = "macos")]
fn alloc_executable_region(len: usize) -> VmResult<NonNull<u8>> {
    let ptr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            len,
            libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC,
            libc::MAP_ANON | libc::MAP_PRIVATE | libc::MAP_JIT,
            -1,
            0,
        )
    };
    if ptr == libc::MAP_FAILED {
        return Err(mapping_failed("mmap(MAP_JIT)"));
    }
    NonNull::new(ptr as *mut u8).ok_or_else(|| mapping_failed("mmap"))
}

#[cfg(all(unix, not(target_os = "macos")))]
fn finalize_executable_region(ptr: NonNull<u8>, len: usize) -> VmResult<()> {
    let rc = unsafe {
        libc::mprotect(
            ptr.as_ptr() as *mut _,
            len,
            libc::PROT_READ | libc::PROT_EXEC,
        )
    };
    if rc != 0 {
        return Err(mapping_failed("mprotect(PROT_READ|PROT_EXEC)"));
    }
    Ok(())
}

// MAP_JIT regions keep their protection; x86_64 needs no cache maintenance.
#[cfg(target_os = "macos")]
fn finalize_executable_region(_ptr: NonNull<u8>, _len: usize) -> VmResult<()> {
    Ok(())
}

#[cfg(unix)]
fn free_executable_region(ptr: NonNull<u8>, len: usize) -> VmResult<()> {
    let rc = unsafe { libc::munmap(ptr.as_ptr() as *mut _, len) };
    if rc != 0 {
        return Err(mapping_failed("munmap"));
    }
    Ok(())
}

#[cfg(windows)]
fn alloc_executable_region(len: usize) -> VmResult<NonNull<u8>> {
    use windows_sys::Win32::System::Memory::{
        MEM_COMMIT, MEM_RESERVE, PAGE_EXECUTE_READWRITE, VirtualAlloc,
    };

    let ptr = unsafe {
        VirtualAlloc(
            std::ptr::null_mut(),
            len,
            MEM_COMMIT | MEM_RESERVE,
            PAGE_EXECUTE_READWRITE,
        ) as *mut u8
    };
    NonNull::new(ptr).ok_or_else(|| mapping_failed("VirtualAlloc"))
}

#[cfg(windows)]
fn finalize_executable_region(ptr: NonNull<u8>, len: usize) -> VmResult<()> {
    use windows_sys::Win32::System::{
        Diagnostics::Debug::FlushInstructionCache,
        Memory::{PAGE_EXECUTE_READ, VirtualProtect},
        Threading::GetCurrentProcess,
    };

    let mut old_protect = 0u32;
    let ok = unsafe {
        VirtualProtect(
            ptr.as_ptr() as *mut _,
            len,
            PAGE_EXECUTE_READ,
            &mut old_protect,
        )
    };
    if ok == 0 {
        return Err(mapping_failed("VirtualProtect(PAGE_EXECUTE_READ)"));
    }

    let process = unsafe { GetCurrentProcess() };
    let ok = unsafe { FlushInstructionCache(process, ptr.as_ptr() as *const _, len) };
    if ok == 0 {
        return Err(mapping_failed("FlushInstructionCache"));
    }
    Ok(())
}

#[cfg(windows)]
fn free_executable_region(ptr: NonNull<u8>, _len: usize) -> VmResult<()> {
    use windows_sys::Win32::System::Memory::{MEM_RELEASE, VirtualFree};

    let ok = unsafe { VirtualFree(ptr.as_ptr() as *mut _, 0, MEM_RELEASE) };
    if ok == 0 {
        return Err(mapping_failed("VirtualFree"));
    }
    Ok(())
}

#[cfg(not(any(unix, windows)))]
fn alloc_executable_region(_len: usize) -> VmResult<NonNull<u8>> {
    Err(VmError::UnsupportedHost)
}

#[cfg(not(any(unix, windows)))]
fn finalize_executable_region(_ptr: NonNull<u8>, _len: usize) -> VmResult<()> {
    Err(VmError::UnsupportedHost)
}

#[cfg(not(any(unix, windows)))]
fn free_executable_region(_ptr: NonNull<u8>, _len: usize) -> VmResult<()> {
    Ok(())
}

// Writes into RWX pages need an x86_64 host; MAP_JIT on arm64 is write-protected.
#[cfg(all(test, target_arch = "x86_64", any(unix, windows)))]
mod tests {
    use super::*;

    #[test]
    fn allocation_rounds_up_to_whole_pages() {
        let region = ExecutableRegion::allocate(10).expect("mapping should succeed");
        assert_eq!(region.len(), page_size());
        let region = ExecutableRegion::allocate(page_size() + 1).expect("mapping should succeed");
        assert_eq!(region.len(), 2 * page_size());
    }

    #[test]
    fn zero_sized_request_still_maps_a_page() {
        let region = ExecutableRegion::allocate(0).expect("mapping should succeed");
        assert_eq!(region.len(), page_size());
    }

    #[test]
    fn written_bytes_survive_finalize() {
        let mut region = ExecutableRegion::allocate(64).expect("mapping should succeed");
        region.as_mut_slice()[..4].copy_from_slice(&[0x90, 0x90, 0x90, 0xC3]);
        let finalized = region.finalize().expect("finalize should succeed");
        assert_eq!(finalized.bytes(4), &[0x90, 0x90, 0x90, 0xC3]);
        assert_eq!(finalized.bytes(usize::MAX).len(), finalized.len());
    }

    #[test]
    fn absurd_request_is_resource_exhaustion() {
        let err = ExecutableRegion::allocate(usize::MAX).err();
        assert!(matches!(err, Some(VmError::ResourceExhaustion(_))));
    }
}
