//! Read-only facts about the local machine.
//!
//! Everything here is queried fresh on demand; nothing is cached between
//! invocations since the whole point of re-invocation is to observe the
//! current state of the world.

use std::fs;
use std::io;
use std::net::UdpSocket;
use std::path::{Path, PathBuf};

use crate::shell::{execute, CommandOptions};

/// The machine's fully qualified domain name.
///
/// Prefers `hostname -f`; falls back to the kernel hostname when the
/// resolver cannot produce a qualified name.
pub fn fqdn() -> String {
    if let Ok(result) = execute("hostname", &["-f"], &CommandOptions::default()) {
        let name = result.stdout.trim();
        if result.success && !name.is_empty() {
            return name.to_string();
        }
    }
    kernel_hostname().unwrap_or_else(|| "localhost".to_string())
}

#[cfg(unix)]
fn kernel_hostname() -> Option<String> {
    let mut buf = [0u8; 256];
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) };
    if rc != 0 {
        return None;
    }
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8(buf[..end].to_vec()).ok()
}

#[cfg(not(unix))]
fn kernel_hostname() -> Option<String> {
    std::env::var("COMPUTERNAME").ok()
}

/// The local address the default route would use.
///
/// Opens a UDP socket towards a public address without sending anything;
/// the kernel picks the outbound interface and its address.
pub fn local_address() -> String {
    let probe = || -> io::Result<String> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.connect("1.1.1.1:53")?;
        Ok(socket.local_addr()?.ip().to_string())
    };
    probe().unwrap_or_else(|_| "127.0.0.1".to_string())
}

/// The hostname the hypervisor reports for this machine.
///
/// Compute nodes must present the same name to the controller and to the
/// hypervisor; a mismatch is caught by a preflight check.
pub fn hypervisor_hostname() -> io::Result<String> {
    let result = execute("virsh", &["hostname"], &CommandOptions::default())?;
    if !result.success {
        return Err(io::Error::other(format!(
            "virsh hostname failed: {}",
            result.stderr.trim()
        )));
    }
    Ok(result.stdout.trim().to_string())
}

/// Total system RAM in kilobytes, read from /proc/meminfo.
pub fn total_ram_kb() -> io::Result<u64> {
    let meminfo = fs::read_to_string("/proc/meminfo")?;
    for line in meminfo.lines() {
        if let Some(rest) = line.strip_prefix("MemTotal:") {
            let kb = rest
                .split_whitespace()
                .next()
                .and_then(|v| v.parse::<u64>().ok());
            if let Some(kb) = kb {
                return Ok(kb);
            }
        }
    }
    Err(io::Error::other("MemTotal not found in /proc/meminfo"))
}

/// Total logical CPU count.
pub fn total_cores() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Find an executable on PATH.
pub fn find_in_path(program: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path) {
        let candidate = dir.join(program);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

/// Recursively copy a directory, overwriting existing files.
///
/// Used to stage provisioning plan templates into the writable data area.
pub fn copy_dir_all(src: &Path, dst: &Path) -> io::Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_all(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn total_cores_is_nonzero() {
        assert!(total_cores() >= 1);
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn total_ram_is_nonzero() {
        assert!(total_ram_kb().unwrap() > 0);
    }

    #[test]
    fn local_address_is_parseable() {
        let addr = local_address();
        assert!(addr.parse::<std::net::IpAddr>().is_ok());
    }

    #[test]
    #[cfg(unix)]
    fn find_in_path_locates_sh() {
        assert!(find_in_path("sh").is_some());
    }

    #[test]
    fn find_in_path_misses_bogus_binary() {
        assert!(find_in_path("definitely-not-a-real-binary").is_none());
    }

    #[test]
    fn copy_dir_all_copies_nested_files() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        fs::create_dir(src.path().join("sub")).unwrap();
        fs::write(src.path().join("a.tf"), "resource {}").unwrap();
        fs::write(src.path().join("sub/b.tf"), "variable {}").unwrap();

        copy_dir_all(src.path(), dst.path()).unwrap();

        assert!(dst.path().join("a.tf").is_file());
        assert!(dst.path().join("sub/b.tf").is_file());
    }

    #[test]
    fn copy_dir_all_overwrites_existing() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        fs::write(src.path().join("a.tf"), "new").unwrap();
        fs::write(dst.path().join("a.tf"), "old").unwrap();

        copy_dir_all(src.path(), dst.path()).unwrap();

        assert_eq!(fs::read_to_string(dst.path().join("a.tf")).unwrap(), "new");
    }
}
