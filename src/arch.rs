//! Architecture-specific helpers
//!
//! The pause hint used by caller-side retry loops, plus the power-of-two
//! arithmetic the ring backends rely on for their lap/cycle math.

/// Executes a CPU-specific instruction to indicate a spin-wait loop to the CPU
///
/// Never called by a backend on a full or empty queue; only by callers that
/// chose to spin (see [`SpinningSession`](crate::SpinningSession)) and by the
/// stress harness.
#[inline(always)]
pub fn spin_loop_pause() {
    // `_mm_pause` is a safe fn on newer toolchains
    #[cfg(target_arch = "x86_64")]
    #[allow(unused_unsafe)]
    unsafe {
        std::arch::x86_64::_mm_pause();
    }

    #[cfg(target_arch = "x86")]
    #[allow(unused_unsafe)]
    unsafe {
        std::arch::x86::_mm_pause();
    }

    #[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
    {
        std::hint::spin_loop();
    }
}

/// Returns the smallest power of 2 greater than or equal to `n`
pub const fn round_up_to_power_of_2(mut n: usize) -> usize {
    if n == 0 {
        return 1;
    }

    n -= 1;
    n |= n >> 1;
    n |= n >> 2;
    n |= n >> 4;
    n |= n >> 8;
    n |= n >> 16;
    #[cfg(target_pointer_width = "64")]
    {
        n |= n >> 32;
    }
    n + 1
}

/// True when `n` is a power of two no smaller than 2
#[inline]
pub const fn is_ring_size(n: usize) -> bool {
    n >= 2 && n & (n - 1) == 0
}
