//! Real link transport for the `ectool` binary (ambient, external to the core — gated behind the
//! `cli` feature). Backs [`NetdevDriver`] with an actual Ethernet interface so `ectool` can talk
//! to real slaves; the core crate and its own tests never depend on this module — see
//! `tests/scenarios.rs`'s in-memory `FakeDriver` for how `Master` is driven instead.

use crate::netdev::NetdevDriver;

#[cfg(target_os = "linux")]
mod linux {
    use super::*;
    use smoltcp::phy::{Device, Medium, RxToken, TxToken};
    use smoltcp::time::Instant as SmolInstant;
    use std::time::Instant;

    /// AF_PACKET raw socket, backed by `smoltcp`'s own Linux raw-socket device (the `std` +
    /// `phy-raw_socket` features this crate enables).
    pub struct RawSocketDriver {
        socket: smoltcp::phy::RawSocket,
        started: Instant,
        carrier_path: std::path::PathBuf,
    }

    impl RawSocketDriver {
        pub fn open(interface: &str) -> std::io::Result<Self> {
            let socket = smoltcp::phy::RawSocket::new(interface, Medium::Ethernet)?;
            Ok(Self {
                socket,
                started: Instant::now(),
                carrier_path: std::path::Path::new("/sys/class/net").join(interface).join("carrier"),
            })
        }

        fn timestamp(&self) -> SmolInstant {
            SmolInstant::from(self.started.elapsed())
        }

        /// Read the next available frame into `buf`, returning the number of bytes written, or
        /// `None` if nothing is queued. Used by `ectool`'s RX loop to feed [`crate::master::Master::receive`].
        pub fn recv_frame(&mut self, buf: &mut [u8]) -> Option<usize> {
            let (rx, _tx) = self.socket.receive(self.timestamp())?;
            Some(rx.consume(|frame| {
                let n = frame.len().min(buf.len());
                buf[..n].copy_from_slice(&frame[..n]);
                n
            }))
        }
    }

    impl NetdevDriver for RawSocketDriver {
        fn transmit(&mut self, frame: &[u8]) -> bool {
            let Some(tx) = Device::transmit(&mut self.socket, self.timestamp()) else { return false };
            tx.consume(frame.len(), |buf| buf.copy_from_slice(frame));
            true
        }

        fn poll_link(&mut self) -> bool {
            std::fs::read_to_string(&self.carrier_path).map(|s| s.trim() == "1").unwrap_or(true)
        }
    }
}

#[cfg(target_os = "linux")]
pub use linux::RawSocketDriver;

#[cfg(target_os = "windows")]
mod windows {
    use super::*;
    use pnet_datalink::{channel, Channel, Config, DataLinkReceiver, DataLinkSender};

    /// `pnet_datalink`-backed transport (no AF_PACKET on Windows).
    pub struct RawSocketDriver {
        tx: Box<dyn DataLinkSender>,
        rx: Box<dyn DataLinkReceiver>,
    }

    impl RawSocketDriver {
        pub fn open(interface: &str) -> std::io::Result<Self> {
            let interfaces = pnet_datalink::interfaces();
            let iface = interfaces
                .into_iter()
                .find(|i| i.name == interface)
                .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "no such interface"))?;

            let config = Config { write_buffer_size: 16384, read_buffer_size: 16384, ..Default::default() };
            match channel(&iface, config) {
                Ok(Channel::Ethernet(tx, rx)) => Ok(Self { tx, rx }),
                Ok(_) => Err(std::io::Error::new(std::io::ErrorKind::Other, "unsupported channel type")),
                Err(e) => Err(e),
            }
        }

        pub fn recv_frame(&mut self, buf: &mut [u8]) -> Option<usize> {
            match self.rx.next() {
                Ok(frame) => {
                    let n = frame.len().min(buf.len());
                    buf[..n].copy_from_slice(&frame[..n]);
                    Some(n)
                }
                Err(_) => None,
            }
        }
    }

    impl NetdevDriver for RawSocketDriver {
        fn transmit(&mut self, frame: &[u8]) -> bool {
            matches!(self.tx.send_to(frame, None), Some(Ok(())))
        }

        fn poll_link(&mut self) -> bool {
            true
        }
    }
}

#[cfg(target_os = "windows")]
pub use windows::RawSocketDriver;

#[cfg(all(unix, not(target_os = "linux")))]
mod bsd {
    use super::*;
    use std::fs::{File, OpenOptions};
    use std::io::{Read, Write};
    use std::os::fd::AsRawFd;

    /// Layout BPF's `BIOCSETIF` needs: only the interface name is read back out by the driver.
    #[repr(C)]
    struct Ifreq {
        ifr_name: [libc::c_char; 16],
        ifr_data: libc::c_int,
    }

    // <net/bpf.h>: BIOCSETIF = _IOW('B', 108, struct ifreq), BIOCIMMEDIATE = _IOW('B', 112, u_int),
    // BIOCSHDRCMPLT = _IOW('B', 117, u_int), BIOCGBLEN = _IOR('B', 102, u_int).
    nix::ioctl_write_ptr!(biocsetif, b'B', 108, Ifreq);
    nix::ioctl_write_ptr!(biocimmediate, b'B', 112, libc::c_uint);
    nix::ioctl_write_ptr!(biocshdrcmplt, b'B', 117, libc::c_uint);
    nix::ioctl_read!(biocgblen, b'B', 102, libc::c_uint);

    /// A BSD/macOS `/dev/bpf*` device, opened and bound to `interface`.
    pub struct RawSocketDriver {
        file: File,
        read_buf: Vec<u8>,
    }

    impl RawSocketDriver {
        pub fn open(interface: &str) -> std::io::Result<Self> {
            let file = (0..16)
                .find_map(|i| OpenOptions::new().read(true).write(true).open(format!("/dev/bpf{i}")).ok())
                .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "no free /dev/bpf* device"))?;

            let fd = file.as_raw_fd();
            let mut ifreq = Ifreq { ifr_name: [0; 16], ifr_data: 0 };
            for (dst, src) in ifreq.ifr_name.iter_mut().zip(interface.bytes()) {
                *dst = src as libc::c_char;
            }

            unsafe {
                biocsetif(fd, &ifreq)?;
                let one: libc::c_uint = 1;
                biocimmediate(fd, &one)?;
                biocshdrcmplt(fd, &one)?;
            }

            let mut buf_len: libc::c_uint = 0;
            unsafe { biocgblen(fd, &mut buf_len)? };

            Ok(Self { file, read_buf: vec![0u8; (buf_len as usize).max(4096)] })
        }

        pub fn recv_frame(&mut self, buf: &mut [u8]) -> Option<usize> {
            let n = self.file.read(&mut self.read_buf).ok()?;
            if n == 0 {
                return None;
            }
            let n = n.min(buf.len());
            buf[..n].copy_from_slice(&self.read_buf[..n]);
            Some(n)
        }
    }

    impl NetdevDriver for RawSocketDriver {
        fn transmit(&mut self, frame: &[u8]) -> bool {
            self.file.write_all(frame).is_ok()
        }

        fn poll_link(&mut self) -> bool {
            true
        }
    }
}

#[cfg(all(unix, not(target_os = "linux")))]
pub use bsd::RawSocketDriver;
