use crate::error::Error;

/// Source of raw hardware counter ticks. Reads must be cheap and never block.
pub trait CycleCounter {
    fn read(&mut self) -> u64;
}

/// Monotonic wall clock used only while calibrating.
pub trait WallClock {
    fn now_ns(&mut self) -> u64;
}

// ---------------------------------------------------------------------------
// Architecture-specific counter reads
// ---------------------------------------------------------------------------

#[cfg(target_arch = "x86_64")]
mod arch {
    #[inline(always)]
    pub fn read_ticks() -> u64 {
        // SAFETY: RDTSC is available on every x86_64 CPU.
        unsafe { core::arch::x86_64::_rdtsc() }
    }
}

#[cfg(target_arch = "x86")]
mod arch {
    #[inline(always)]
    pub fn read_ticks() -> u64 {
        // SAFETY: RDTSC is present on every CPU this target runs on.
        unsafe { core::arch::x86::_rdtsc() }
    }
}

#[cfg(target_arch = "aarch64")]
mod arch {
    /// CNTVCT_EL0 is readable from userspace and ticks at a fixed rate.
    #[inline(always)]
    pub fn read_ticks() -> u64 {
        let val: u64;
        unsafe {
            core::arch::asm!("mrs {}, cntvct_el0", out(reg) val, options(nomem, nostack));
        }
        val
    }

    /// CNTFRQ_EL0 holds the rate firmware programmed for the generic timer.
    pub fn tick_rate() -> u64 {
        let val: u64;
        unsafe {
            core::arch::asm!("mrs {}, cntfrq_el0", out(reg) val, options(nomem, nostack));
        }
        val
    }
}

const SUPPORTED: bool = cfg!(any(
    target_arch = "x86_64",
    target_arch = "x86",
    target_arch = "aarch64"
));

/// The CPU's own timestamp counter (TSC on x86, virtual counter on aarch64).
#[derive(Debug)]
pub struct Tsc {
    _private: (),
}

impl Tsc {
    pub fn new() -> Result<Self, Error> {
        if !SUPPORTED {
            return Err(Error::Calibration(
                "no cycle counter available on this architecture".into(),
            ));
        }
        Ok(Tsc { _private: () })
    }
}

impl CycleCounter for Tsc {
    #[inline(always)]
    fn read(&mut self) -> u64 {
        #[cfg(any(target_arch = "x86_64", target_arch = "x86", target_arch = "aarch64"))]
        {
            arch::read_ticks()
        }

        #[cfg(not(any(target_arch = "x86_64", target_arch = "x86", target_arch = "aarch64")))]
        {
            0
        }
    }
}

/// Architected tick rate of the counter, when the hardware advertises one.
///
/// The aarch64 virtual counter runs at CNTFRQ_EL0 rather than at the core
/// clock, so /proc/cpuinfo cannot be used to convert its ticks. x86 TSC
/// has no such register and returns `None`.
pub fn counter_frequency() -> Option<u64> {
    #[cfg(target_arch = "aarch64")]
    {
        Some(arch::tick_rate()).filter(|&hz| hz > 0)
    }

    #[cfg(not(target_arch = "aarch64"))]
    {
        None
    }
}

/// `CLOCK_MONOTONIC_RAW`, immune to NTP slewing.
#[derive(Debug, Default)]
pub struct MonotonicRaw;

impl WallClock for MonotonicRaw {
    fn now_ns(&mut self) -> u64 {
        let mut ts = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        unsafe {
            libc::clock_gettime(libc::CLOCK_MONOTONIC_RAW, &mut ts);
        }
        (ts.tv_sec as u64)
            .wrapping_mul(1_000_000_000)
            .wrapping_add(ts.tv_nsec as u64)
    }
}
