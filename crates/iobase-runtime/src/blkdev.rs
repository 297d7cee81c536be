//! Block device size query
//!
//! `fstat` reports `st_size == 0` for block devices, so the size comes
//! from the platform's disk ioctl instead.

use std::os::unix::io::RawFd;

cfg_if::cfg_if! {
    if #[cfg(any(target_os = "linux", target_os = "android"))] {
        // BLKGETSIZE64 = _IOR(0x12, 114, size_t); the kernel writes a u64.
        nix::ioctl_read_bad!(
            blk_getsize64,
            nix::request_code_read!(0x12, 114, std::mem::size_of::<libc::size_t>()),
            u64
        );

        pub(crate) fn block_device_size(fd: RawFd) -> nix::Result<u64> {
            let mut size: u64 = 0;
            unsafe { blk_getsize64(fd, &mut size) }?;
            Ok(size)
        }
    } else if #[cfg(any(target_os = "macos", target_os = "ios"))] {
        nix::ioctl_read!(dk_get_block_size, b'd', 24, u32);
        nix::ioctl_read!(dk_get_block_count, b'd', 25, u64);

        pub(crate) fn block_device_size(fd: RawFd) -> nix::Result<u64> {
            let mut block_size: u32 = 0;
            let mut blocks: u64 = 0;
            unsafe {
                dk_get_block_size(fd, &mut block_size)?;
                dk_get_block_count(fd, &mut blocks)?;
            }
            Ok(blocks * block_size as u64)
        }
    } else if #[cfg(any(target_os = "freebsd", target_os = "dragonfly"))] {
        nix::ioctl_read!(dioc_get_media_size, b'd', 129, libc::off_t);

        pub(crate) fn block_device_size(fd: RawFd) -> nix::Result<u64> {
            let mut size: libc::off_t = 0;
            unsafe { dioc_get_media_size(fd, &mut size) }?;
            Ok(size as u64)
        }
    } else {
        pub(crate) fn block_device_size(_fd: RawFd) -> nix::Result<u64> {
            Err(nix::errno::Errno::ENOTTY)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::io::AsRawFd;

    #[test]
    fn test_regular_file_is_not_a_block_device() {
        let file = tempfile::tempfile().unwrap();
        assert!(block_device_size(file.as_raw_fd()).is_err());
    }
}
