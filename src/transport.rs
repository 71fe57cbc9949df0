//! Port transport: hands one register set to firmware and returns what it left behind.
//!
//! SMAPI is entered by writing AL to the command port and then to port 0x4F,
//! with the call arguments already sitting in EAX, EBX, ECX, ESI and EDI.
//! Nothing here interprets those values.

use crate::config::SmapiConfig;
use crate::error::Result;
use log::{debug, trace};
use std::marker::PhantomData;

/// Register binding of one SMAPI call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Registers {
    pub eax: u32,
    pub ebx: u32,
    pub ecx: u32,
    pub esi: u32,
    pub edi: u32,
}

/// Something that can carry a SMAPI call to firmware.
///
/// Implementations must not validate, retry or reorder calls.
pub trait Transport {
    /// Issue one call and return the registers as firmware left them.
    fn call(&mut self, regs: Registers) -> Registers;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn call(&mut self, regs: Registers) -> Registers {
        (**self).call(regs)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn call(&mut self, regs: Registers) -> Registers {
        (**self).call(regs)
    }
}

/// Direct port I/O against the running machine's firmware.
///
/// Opening one grants the calling thread access to the command port and to
/// port 0x4F, and takes the advisory lock named in the config for as long as
/// the value lives.
///
/// `ioperm` is per thread: only the opening thread (and threads it spawns
/// afterwards) may issue the `out` instructions. `PortIo` is therefore
/// neither `Send` nor `Sync`, and has to be used on the thread that opened it.
pub struct PortIo {
    command_port: u16,
    inner: sys::Inner,
    _thread_bound: PhantomData<*const ()>,
}

impl PortIo {
    /// Acquire the lock file (if configured) and I/O permission for both ports.
    ///
    /// The lock is a blocking `flock` on a fresh open of the lock file, so it
    /// also excludes other `PortIo` values in the same process: opening a
    /// second one while the first is alive waits forever. Drop the first, or
    /// disable the lock with `lock_path: None`.
    pub fn open(config: &SmapiConfig) -> Result<Self> {
        debug!(
            "Opening SMAPI transport on port {:#04x} (lock: {:?})",
            config.command_port, config.lock_path
        );
        let inner = sys::Inner::open(config)?;
        Ok(PortIo {
            command_port: config.command_port,
            inner,
            _thread_bound: PhantomData,
        })
    }

    /// Command port this transport writes to
    pub fn command_port(&self) -> u16 {
        self.command_port
    }
}

impl Transport for PortIo {
    fn call(&mut self, regs: Registers) -> Registers {
        trace!("SMAPI in:  {:08X?}", regs);
        let out = self.inner.call(self.command_port, regs);
        trace!("SMAPI out: {:08X?}", out);
        out
    }
}

#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
mod sys {
    use super::Registers;
    use crate::config::SmapiConfig;
    use crate::constants::SECONDARY_PORT;
    use crate::error::{Result, SmapiError};
    use log::warn;
    use std::fs::{File, OpenOptions};
    use std::io;
    use std::os::unix::io::AsRawFd;
    use std::path::Path;

    pub(super) struct Inner {
        ports: Vec<u16>,
        _lock: Option<File>,
    }

    impl Inner {
        pub(super) fn open(config: &SmapiConfig) -> Result<Self> {
            let lock = match &config.lock_path {
                Some(path) => Some(lock_file(path)?),
                None => None,
            };

            let mut inner = Inner {
                ports: Vec::with_capacity(2),
                _lock: lock,
            };
            for port in [config.command_port, SECONDARY_PORT] {
                // SAFETY: ioperm only changes the calling thread's I/O bitmap.
                if unsafe { libc::ioperm(port as libc::c_ulong, 1, 1) } != 0 {
                    return Err(SmapiError::unavailable(
                        format!("ioperm on port {:#04x}", port),
                        io::Error::last_os_error(),
                    ));
                }
                inner.ports.push(port);
            }
            Ok(inner)
        }

        pub(super) fn call(&mut self, command_port: u16, regs: Registers) -> Registers {
            let mut eax = regs.eax;
            let mut ecx = regs.ecx;
            let mut esi = regs.esi;
            let mut edi = regs.edi;
            let mut rbx = regs.ebx as u64;

            // SAFETY: both ports were granted in `open`. RBX is reserved by
            // LLVM, so it is swapped in and out around the port writes.
            unsafe {
                core::arch::asm!(
                    "xchg {bx}, rbx",
                    "out dx, al",
                    "out 0x4f, al",
                    "xchg {bx}, rbx",
                    bx = inout(reg) rbx,
                    inout("eax") eax,
                    inout("ecx") ecx,
                    inout("esi") esi,
                    inout("edi") edi,
                    inout("edx") command_port as u32 => _,
                );
            }

            Registers {
                eax,
                ebx: rbx as u32,
                ecx,
                esi,
                edi,
            }
        }
    }

    impl Drop for Inner {
        fn drop(&mut self) {
            for &port in &self.ports {
                // SAFETY: revoking access we were granted earlier.
                if unsafe { libc::ioperm(port as libc::c_ulong, 1, 0) } != 0 {
                    warn!(
                        "Failed to release port {:#04x}: {}",
                        port,
                        io::Error::last_os_error()
                    );
                }
            }
        }
    }

    fn lock_file(path: &Path) -> Result<File> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .map_err(|e| SmapiError::unavailable(format!("open lock {}", path.display()), e))?;

        // Blocks until any other holder lets go.
        // SAFETY: the descriptor stays valid for as long as `file`.
        if unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) } != 0 {
            return Err(SmapiError::unavailable(
                format!("flock {}", path.display()),
                io::Error::last_os_error(),
            ));
        }
        Ok(file)
    }
}

#[cfg(not(all(target_os = "linux", target_arch = "x86_64")))]
mod sys {
    use super::Registers;
    use crate::config::SmapiConfig;
    use crate::error::{Result, SmapiError};
    use std::io;

    pub(super) enum Inner {}

    impl Inner {
        pub(super) fn open(_config: &SmapiConfig) -> Result<Self> {
            Err(SmapiError::unavailable(
                "SMAPI port I/O",
                io::Error::new(io::ErrorKind::Unsupported, "requires Linux on x86_64"),
            ))
        }

        pub(super) fn call(&mut self, _command_port: u16, _regs: Registers) -> Registers {
            match *self {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo(usize);

    impl Transport for Echo {
        fn call(&mut self, regs: Registers) -> Registers {
            self.0 += 1;
            regs
        }
    }

    #[test]
    fn references_and_boxes_forward_calls() {
        let mut echo = Echo(0);
        let regs = Registers {
            eax: 0x5380,
            ebx: 0x2116,
            ecx: 0x0100,
            esi: 1,
            edi: 2,
        };
        assert_eq!((&mut echo).call(regs), regs);

        let mut boxed: Box<dyn Transport> = Box::new(Echo(0));
        assert_eq!(boxed.call(regs), regs);
        assert_eq!(echo.0, 1);
    }

    #[test]
    fn missing_lock_directory_is_transport_unavailable() {
        let config = SmapiConfig::default()
            .with_lock_path(Some("/nonexistent-smapi-dir/smapi-charge.lock".into()));
        let err = PortIo::open(&config).err().expect("open must fail");
        assert_eq!(err.kind(), crate::ErrorKind::TransportUnavailable);
    }

    #[test]
    fn port_io_stays_on_its_thread() {
        // Resolves only while `PortIo` is not `Send`; a `Send` impl would make
        // the two blanket impls below ambiguous and break the build.
        trait AmbiguousIfSend<A> {
            fn check() {}
        }
        impl<T: ?Sized> AmbiguousIfSend<()> for T {}
        impl<T: ?Sized + Send> AmbiguousIfSend<u8> for T {}

        trait AmbiguousIfSync<A> {
            fn check() {}
        }
        impl<T: ?Sized> AmbiguousIfSync<()> for T {}
        impl<T: ?Sized + Sync> AmbiguousIfSync<u8> for T {}

        <PortIo as AmbiguousIfSend<_>>::check();
        <PortIo as AmbiguousIfSync<_>>::check();
        <crate::Smapi<PortIo> as AmbiguousIfSync<_>>::check();
    }
}
