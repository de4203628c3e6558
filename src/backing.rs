//! Backing region allocator.
//!
//! Slab regions are acquired and released through this seam; the pool
//! only ever asks for an aligned run of raw bytes and hands it back
//! unchanged. The process allocator serves the requests.

use core::alloc::Layout;

use log::trace;

/// Acquire `size` bytes aligned to `align`. Returns null on failure
/// (including an unrepresentable layout).
///
/// # Safety
///
/// `align` must be a power of two. The region must eventually be handed
/// back to [`region_dealloc`] with the same `size` and `align`.
pub unsafe fn region_alloc(size: usize, align: usize) -> *mut u8 {
    let Ok(layout) = Layout::from_size_align(size, align) else {
        return core::ptr::null_mut();
    };
    let ptr = unsafe { std::alloc::alloc(layout) };
    trace!("region_alloc size={size} align={align} -> {ptr:p}");
    ptr
}

/// Release a region previously returned by [`region_alloc`].
///
/// # Safety
///
/// `ptr` must come from [`region_alloc`] called with this exact `size`
/// and `align`, and must not be used afterwards.
pub unsafe fn region_dealloc(ptr: *mut u8, size: usize, align: usize) {
    trace!("region_dealloc {ptr:p} size={size}");
    let layout = unsafe { Layout::from_size_align_unchecked(size, align) };
    unsafe { std::alloc::dealloc(ptr, layout) };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_and_dealloc() {
        unsafe {
            let ptr = region_alloc(4096, 64);
            assert!(!ptr.is_null());
            assert_eq!(ptr as usize % 64, 0);
            // Write a pattern and read it back
            for i in 0..4096 {
                *ptr.add(i) = (i & 0xFF) as u8;
            }
            for i in 0..4096 {
                assert_eq!(*ptr.add(i), (i & 0xFF) as u8);
            }
            region_dealloc(ptr, 4096, 64);
        }
    }

    #[test]
    fn test_large_alignment() {
        unsafe {
            for align in [8usize, 64, 256, 4096] {
                let ptr = region_alloc(align * 2, align);
                assert!(!ptr.is_null());
                assert_eq!(ptr as usize % align, 0, "misaligned for align={align}");
                region_dealloc(ptr, align * 2, align);
            }
        }
    }

    #[test]
    fn test_unrepresentable_layout() {
        unsafe {
            // Non-power-of-two alignment is rejected by Layout, not UB.
            assert!(region_alloc(64, 3).is_null());
        }
    }
}
