// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! An `SmiBus` that reaches the switch through a host network interface's
//! MDIO bus, using the MII register ioctls.

#[cfg(target_os = "linux")]
mod plat {
    use std::os::fd::{AsRawFd, OwnedFd};

    use log::debug;
    use nix::sys::socket::{AddressFamily, SockFlag, SockType, socket};

    use crate::bus::SmiBus;
    use crate::error::{MsdError, Result};

    const IFNAMSIZ: usize = 16;
    const SIOCGMIIREG: u16 = 0x8948;
    const SIOCSMIIREG: u16 = 0x8949;

    #[repr(C)]
    #[derive(Clone, Copy, Default)]
    struct MiiData {
        phy_id: u16,
        reg_num: u16,
        val_in: u16,
        val_out: u16,
    }

    // struct ifreq, with the union viewed as mii_ioctl_data
    #[repr(C)]
    struct MiiIfreq {
        name: [u8; IFNAMSIZ],
        mii: MiiData,
        _pad: [u8; 16],
    }

    nix::ioctl_readwrite_bad!(mii_read, SIOCGMIIREG, MiiIfreq);
    nix::ioctl_write_ptr_bad!(mii_write, SIOCSMIIREG, MiiIfreq);

    pub struct MdioIoctl {
        fd: OwnedFd,
        name: [u8; IFNAMSIZ],
    }

    impl MdioIoctl {
        /// Open the MDIO bus behind `ifname`.
        pub fn open(ifname: &str) -> Result<Self> {
            let bytes = ifname.as_bytes();
            if bytes.is_empty() || bytes.len() >= IFNAMSIZ {
                return Err(MsdError::bad_param(format!(
                    "interface name {ifname:?}"
                )));
            }
            let mut name = [0u8; IFNAMSIZ];
            name[..bytes.len()].copy_from_slice(bytes);

            let fd = socket(
                AddressFamily::Inet,
                SockType::Datagram,
                SockFlag::empty(),
                None,
            )
            .map_err(std::io::Error::from)?;
            debug!("opened MDIO access through {ifname}");
            Ok(MdioIoctl { fd, name })
        }

        fn ifreq(&self, dev_addr: u8, reg: u8, value: u16) -> MiiIfreq {
            MiiIfreq {
                name: self.name,
                mii: MiiData {
                    phy_id: dev_addr as u16,
                    reg_num: reg as u16,
                    val_in: value,
                    val_out: 0,
                },
                _pad: [0; 16],
            }
        }
    }

    impl SmiBus for MdioIoctl {
        fn read(&self, dev_addr: u8, reg: u8) -> Result<u16> {
            let mut req = self.ifreq(dev_addr, reg, 0);
            // SAFETY: `req` is a fully initialized ifreq that outlives the
            // call.
            unsafe { mii_read(self.fd.as_raw_fd(), &mut req) }
                .map_err(std::io::Error::from)?;
            Ok(req.mii.val_out)
        }

        fn write(&self, dev_addr: u8, reg: u8, value: u16) -> Result<()> {
            let req = self.ifreq(dev_addr, reg, value);
            // SAFETY: as above.
            unsafe { mii_write(self.fd.as_raw_fd(), &req) }
                .map_err(std::io::Error::from)?;
            Ok(())
        }
    }

}

#[cfg(not(target_os = "linux"))]
mod plat {
    use crate::bus::SmiBus;
    use crate::error::{MsdError, Result};

    pub struct MdioIoctl {}

    impl MdioIoctl {
        pub fn open(_ifname: &str) -> Result<Self> {
            Err(MsdError::not_supported(
                "MDIO ioctls are only available on Linux",
            ))
        }
    }

    impl SmiBus for MdioIoctl {
        fn read(&self, _dev_addr: u8, _reg: u8) -> Result<u16> {
            Err(MsdError::not_supported("MDIO access"))
        }

        fn write(&self, _dev_addr: u8, _reg: u8, _value: u16) -> Result<()> {
            Err(MsdError::not_supported("MDIO access"))
        }
    }
}

pub use plat::MdioIoctl;
