use crate::error::{DupvaultError, Result};
use crate::volume::{normalize_root, MountedVolume, VolumeSource};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const PSEUDO_FILESYSTEMS: &[&str] = &[
    "autofs",
    "binfmt_misc",
    "bpf",
    "cgroup",
    "cgroup2",
    "configfs",
    "debugfs",
    "devpts",
    "devtmpfs",
    "efivarfs",
    "fusectl",
    "hugetlbfs",
    "mqueue",
    "nsfs",
    "proc",
    "pstore",
    "rpc_pipefs",
    "securityfs",
    "selinuxfs",
    "sysfs",
    "tracefs",
];

/// One line of `/proc/self/mountinfo`.
#[derive(Debug, Clone, PartialEq)]
pub struct MountEntry {
    pub major: u32,
    pub minor: u32,
    /// Directory of the filesystem that is mounted here; `/` unless bind-mounted.
    pub root: String,
    pub mount_point: String,
    pub fs_type: String,
    pub source: String,
}

/// Reads mounted volumes from the kernel's mount table.
///
/// Filesystem UUIDs become volume serials; devices without one fall back to
/// `dev:<major>:<minor>`. Several mounts of one device collapse into a single
/// volume with several roots.
#[derive(Debug, Clone)]
pub struct MountInfoSource {
    mountinfo_path: PathBuf,
    by_uuid_dir: PathBuf,
    by_label_dir: PathBuf,
}

impl Default for MountInfoSource {
    fn default() -> Self {
        Self {
            mountinfo_path: PathBuf::from("/proc/self/mountinfo"),
            by_uuid_dir: PathBuf::from("/dev/disk/by-uuid"),
            by_label_dir: PathBuf::from("/dev/disk/by-label"),
        }
    }
}

impl MountInfoSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_paths(mountinfo_path: PathBuf, by_uuid_dir: PathBuf, by_label_dir: PathBuf) -> Self {
        Self {
            mountinfo_path,
            by_uuid_dir,
            by_label_dir,
        }
    }
}

impl VolumeSource for MountInfoSource {
    fn mounted_volumes(&self) -> Result<Vec<MountedVolume>> {
        let content = std::fs::read_to_string(&self.mountinfo_path)?;
        let uuids = read_link_dir(&self.by_uuid_dir);
        let labels = read_link_dir(&self.by_label_dir);

        let mut volumes: Vec<MountedVolume> = Vec::new();

        for entry in parse_mountinfo(&content) {
            if PSEUDO_FILESYSTEMS.contains(&entry.fs_type.as_str()) {
                continue;
            }
            if entry.root != "/" {
                log::debug!(
                    "Skipping bind mount of {} at {}",
                    entry.root,
                    entry.mount_point
                );
                continue;
            }

            let device = device_path(&entry.source);
            let serial = device
                .as_ref()
                .and_then(|d| uuids.get(d))
                .cloned()
                .unwrap_or_else(|| format!("dev:{}:{}", entry.major, entry.minor));
            let root = normalize_root(&entry.mount_point);

            if let Some(existing) = volumes.iter_mut().find(|v| v.serial == serial) {
                if !existing.roots.contains(&root) {
                    existing.roots.push(root);
                }
                continue;
            }

            let label = device
                .as_ref()
                .and_then(|d| labels.get(d))
                .cloned()
                .unwrap_or_else(|| fallback_label(&entry));

            let (free_bytes, total_bytes) = match space_of(Path::new(&entry.mount_point)) {
                Ok((free, total)) => (Some(free), Some(total)),
                Err(e) => {
                    log::debug!("No space figures for {}: {}", entry.mount_point, e);
                    (None, None)
                }
            };

            volumes.push(MountedVolume {
                serial,
                label,
                fs_type: Some(entry.fs_type.clone()),
                roots: vec![root],
                free_bytes,
                total_bytes,
            });
        }

        Ok(volumes)
    }
}

pub fn parse_mountinfo(content: &str) -> Vec<MountEntry> {
    content.lines().filter_map(parse_mountinfo_line).collect()
}

fn parse_mountinfo_line(line: &str) -> Option<MountEntry> {
    let (pre, post) = line.split_once(" - ")?;
    let pre: Vec<&str> = pre.split_whitespace().collect();
    let mut post = post.split_whitespace();

    if pre.len() < 5 {
        return None;
    }

    let (major, minor) = pre[2].split_once(':')?;

    Some(MountEntry {
        major: major.parse().ok()?,
        minor: minor.parse().ok()?,
        root: unescape_octal(pre[3]),
        mount_point: unescape_octal(pre[4]),
        fs_type: post.next()?.to_string(),
        source: unescape_octal(post.next().unwrap_or("none")),
    })
}

/// Decodes the `\NNN` octal escapes the kernel uses for whitespace and backslashes.
fn unescape_octal(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 4 <= bytes.len() {
            let digits = std::str::from_utf8(&bytes[i + 1..i + 4]).unwrap_or("");
            if let Ok(value) = u8::from_str_radix(digits, 8) {
                out.push(value);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }

    String::from_utf8_lossy(&out).to_string()
}

/// Decodes the `\xHH` escapes udev uses in `/dev/disk/by-label` names.
fn unescape_hex(s: &str) -> String {
    let mut out = Vec::with_capacity(s.len());
    let bytes = s.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'\\' && bytes.get(i + 1) == Some(&b'x') && i + 4 <= bytes.len() {
            let digits = std::str::from_utf8(&bytes[i + 2..i + 4]).unwrap_or("");
            if let Ok(value) = u8::from_str_radix(digits, 16) {
                out.push(value);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }

    String::from_utf8_lossy(&out).to_string()
}

/// Maps each resolved device node to the (decoded) name of the link pointing at it.
fn read_link_dir(dir: &Path) -> HashMap<PathBuf, String> {
    let mut map = HashMap::new();

    let Ok(entries) = std::fs::read_dir(dir) else {
        return map;
    };

    for entry in entries.flatten() {
        if let Ok(target) = std::fs::canonicalize(entry.path()) {
            let name = unescape_hex(&entry.file_name().to_string_lossy());
            map.insert(target, name);
        }
    }

    map
}

fn device_path(source: &str) -> Option<PathBuf> {
    if !source.starts_with("/dev/") {
        return None;
    }
    std::fs::canonicalize(source)
        .ok()
        .or_else(|| Some(PathBuf::from(source)))
}

fn fallback_label(entry: &MountEntry) -> String {
    if let Some(name) = entry.source.strip_prefix("/dev/") {
        return name.replace('/', "-");
    }
    Path::new(&entry.mount_point)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "root".to_string())
}

/// Free and total bytes of the filesystem holding `path`.
#[cfg(unix)]
pub fn space_of(path: &Path) -> Result<(u64, u64)> {
    use std::ffi::CString;
    use std::mem;
    use std::os::unix::ffi::OsStrExt;

    let path_cstr = CString::new(path.as_os_str().as_bytes()).map_err(|_| {
        DupvaultError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "Path contains null byte",
        ))
    })?;

    let mut stat: libc::statvfs = unsafe { mem::zeroed() };
    let result = unsafe { libc::statvfs(path_cstr.as_ptr(), &mut stat) };

    if result != 0 {
        return Err(DupvaultError::Io(std::io::Error::last_os_error()));
    }

    let block_size = stat.f_frsize as u64;
    Ok((stat.f_bavail as u64 * block_size, stat.f_blocks as u64 * block_size))
}

#[cfg(not(unix))]
pub fn space_of(_path: &Path) -> Result<(u64, u64)> {
    Err(DupvaultError::Config(
        "Space checking not implemented for this platform".to_string(),
    ))
}
