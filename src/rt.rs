use std::io;

use crate::config::RtConfig;
use crate::error::Error;

fn os_error(what: &str) -> Error {
    let e = io::Error::last_os_error();
    Error::RtSetup(format!("{}: {} ({})", what, e, e.raw_os_error().unwrap_or(0)))
}

/// Real-time scheduling needs root.
pub fn require_root() -> Result<(), Error> {
    if unsafe { libc::geteuid() } != 0 {
        return Err(Error::RtSetup("root access is needed".into()));
    }
    Ok(())
}

/// Number of online logical CPUs.
pub fn online_cpus() -> usize {
    let n = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) };
    if n < 1 {
        1
    } else {
        n as usize
    }
}

fn set_affinity(cpu: usize) -> Result<(), Error> {
    unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_ZERO(&mut set);
        libc::CPU_SET(cpu, &mut set);
        if libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set) != 0 {
            return Err(os_error("unable to set CPU affinity"));
        }
    }
    Ok(())
}

fn set_scheduler(policy: libc::c_int, priority: i32) -> Result<(), Error> {
    unsafe {
        let mut param: libc::sched_param = std::mem::zeroed();
        param.sched_priority = priority;
        if libc::sched_setscheduler(0, policy, &param) != 0 {
            return Err(os_error("unable to set scheduler"));
        }
    }
    Ok(())
}

fn lock_memory() -> Result<(), Error> {
    if unsafe { libc::mlockall(libc::MCL_CURRENT | libc::MCL_FUTURE) } != 0 {
        return Err(os_error("unable to lock memory"));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Local interrupt masking (x86_64 glibc only)
// ---------------------------------------------------------------------------

#[cfg(all(target_arch = "x86_64", target_os = "linux", target_env = "gnu"))]
mod irq {
    use super::os_error;
    use crate::error::Error;
    use core::arch::asm;

    /// Kernels that emulate `iopl(3)` (5.5 and later) fault on `cli`.
    pub fn disable() -> Result<(), Error> {
        unsafe {
            if libc::iopl(3) != 0 {
                return Err(os_error("unable to raise I/O privilege level"));
            }
            asm!("cli", options(nostack));
            libc::iopl(0);
        }
        Ok(())
    }

    pub fn enable() -> Result<(), Error> {
        unsafe {
            if libc::iopl(3) != 0 {
                return Err(os_error("unable to raise I/O privilege level"));
            }
            asm!("sti", options(nostack));
            libc::iopl(0);
        }
        Ok(())
    }
}

#[cfg(not(all(target_arch = "x86_64", target_os = "linux", target_env = "gnu")))]
mod irq {
    use crate::error::Error;

    pub fn disable() -> Result<(), Error> {
        Err(Error::RtSetup(
            "interrupt masking is not supported on this platform".into(),
        ))
    }

    pub fn enable() -> Result<(), Error> {
        Ok(())
    }
}

/// Low-jitter execution context. Entered before calibration, left after
/// sampling; dropping the guard leaves it too.
#[derive(Debug)]
pub struct RtGuard {
    irqs_disabled: bool,
    active: bool,
}

impl RtGuard {
    pub fn enter(cpu: usize, config: &RtConfig) -> Result<Self, Error> {
        log::debug!("enabling RT mode");

        set_affinity(cpu)?;
        log::info!("CPU affinity set on CPU {}", cpu);

        set_scheduler(libc::SCHED_FIFO, config.priority)?;
        log::info!("application priority set to {}", config.priority);

        // From here on the guard restores the scheduler on drop.
        let mut guard = RtGuard {
            irqs_disabled: false,
            active: true,
        };

        if config.lock_memory {
            lock_memory()?;
            log::debug!("current and future memory locked");
        }

        if config.disable_interrupts {
            log::warn!("disabling local interrupts on CPU {}", cpu);
            irq::disable()?;
            guard.irqs_disabled = true;
        }

        Ok(guard)
    }

    /// Restores SCHED_OTHER and re-enables interrupts. Interrupts are
    /// re-enabled even when the scheduler reset fails.
    pub fn leave(mut self) -> Result<(), Error> {
        self.restore()
    }

    fn restore(&mut self) -> Result<(), Error> {
        if !self.active {
            return Ok(());
        }
        self.active = false;
        log::debug!("disabling RT mode");

        let sched = set_scheduler(libc::SCHED_OTHER, 0);
        if self.irqs_disabled {
            irq::enable()?;
            self.irqs_disabled = false;
        }
        sched
    }
}

impl Drop for RtGuard {
    fn drop(&mut self) {
        if let Err(e) = self.restore() {
            log::error!("{}", e);
        }
    }
}
