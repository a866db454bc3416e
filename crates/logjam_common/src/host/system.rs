//! Production host provider
//!
//! Queries and actions against the real machine. Disk usage comes from df,
//! service state and restarts from systemctl, syslog emission from logger.

use super::exec::{run_command, CommandOutcome};
use super::{
    ConsumerScan, DirUsage, DiskUsage, ServiceState, Severity, SystemControl, SystemFacts,
};
use crate::error::{LogjamError, Result};
use globset::Glob;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;
use walkdir::WalkDir;

/// Tag used for messages sent to the system log
pub const SYSLOG_TAG: &str = "logjam";

/// Chunk size for reading a file backwards
const TAIL_CHUNK: u64 = 8192;

/// The machine we are running on
#[derive(Debug, Default, Clone, Copy)]
pub struct HostSystem;

impl HostSystem {
    pub fn new() -> Self {
        Self
    }
}

impl SystemFacts for HostSystem {
    fn is_privileged(&self) -> bool {
        nix::unistd::geteuid().is_root()
    }

    fn command_available(&self, name: &str) -> bool {
        which::which(name).is_ok()
    }

    fn disk_usage(&self, path: &Path) -> Result<DiskUsage> {
        let argv = vec![
            "df".to_string(),
            "--output=size,used,avail,pcent".to_string(),
            "-B1".to_string(),
            path.to_string_lossy().to_string(),
        ];
        let outcome = run_command(&argv, Some(Duration::from_secs(30)));
        if !outcome.success() {
            return Err(LogjamError::Command {
                command: outcome.command.clone(),
                message: outcome.summary(),
            });
        }
        parse_df_output(&outcome.stdout).ok_or_else(|| LogjamError::Parse {
            command: outcome.command.clone(),
            output: outcome.stdout.clone(),
        })
    }

    fn file_size(&self, path: &Path) -> io::Result<Option<u64>> {
        metadata_size(path)
    }

    fn service_state(&self, service: &str) -> ServiceState {
        let argv = vec![
            "systemctl".to_string(),
            "is-active".to_string(),
            service.to_string(),
        ];
        // is-active exits non-zero for anything but active; stdout still names the state
        let outcome = run_command(&argv, Some(Duration::from_secs(30)));
        ServiceState::parse(&outcome.stdout)
    }

    fn matching_entries(&self, dir: &Path, pattern: &str) -> io::Result<Option<Vec<PathBuf>>> {
        list_matching(dir, pattern)
    }

    fn top_consumers(&self, root: &Path, limit: usize) -> ConsumerScan {
        scan_consumers(root, limit)
    }

    fn tail(&self, path: &Path, lines: usize) -> io::Result<Vec<String>> {
        read_tail(path, lines)
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        fs::read_to_string(path)
    }

    fn hostname(&self) -> String {
        nix::unistd::gethostname()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

impl SystemControl for HostSystem {
    fn copy_file(&self, from: &Path, to: &Path) -> io::Result<u64> {
        fs::copy(from, to)
    }

    fn truncate(&self, path: &Path) -> io::Result<()> {
        // set_len keeps the inode so writers holding the file open keep appending
        let file = OpenOptions::new().write(true).open(path)?;
        file.set_len(0)?;
        file.sync_all()
    }

    fn write_file(&self, path: &Path, contents: &str) -> io::Result<()> {
        atomic_replace(path, contents)
    }

    fn append_file(&self, path: &Path, contents: &str) -> io::Result<()> {
        let mut file = OpenOptions::new().append(true).open(path)?;
        file.write_all(contents.as_bytes())?;
        file.sync_all()
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn restart_service(&self, service: &str, timeout: Option<Duration>) -> CommandOutcome {
        let argv = vec![
            "systemctl".to_string(),
            "restart".to_string(),
            service.to_string(),
        ];
        run_command(&argv, timeout)
    }

    fn run(&self, argv: &[String], timeout: Option<Duration>) -> CommandOutcome {
        run_command(argv, timeout)
    }

    fn syslog(&self, severity: Severity, message: &str) -> CommandOutcome {
        let argv = vec![
            "logger".to_string(),
            "-t".to_string(),
            SYSLOG_TAG.to_string(),
            "-p".to_string(),
            severity.priority().to_string(),
            message.to_string(),
        ];
        run_command(&argv, Some(Duration::from_secs(10)))
    }
}

/// Parse `df --output=size,used,avail,pcent -B1` output
pub fn parse_df_output(stdout: &str) -> Option<DiskUsage> {
    let line = stdout.lines().nth(1)?;
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 4 {
        return None;
    }

    Some(DiskUsage {
        total_bytes: fields[0].parse().ok()?,
        used_bytes: fields[1].parse().ok()?,
        available_bytes: fields[2].parse().ok()?,
        percent_used: fields[3].trim_end_matches('%').parse().ok()?,
    })
}

pub(crate) fn metadata_size(path: &Path) -> io::Result<Option<u64>> {
    match fs::metadata(path) {
        Ok(meta) => Ok(Some(meta.len())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

pub(crate) fn list_matching(dir: &Path, pattern: &str) -> io::Result<Option<Vec<PathBuf>>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };

    let matcher = Glob::new(pattern)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?
        .compile_matcher();

    let mut matched = Vec::new();
    for entry in entries {
        let entry = entry?;
        if matcher.is_match(entry.file_name()) {
            matched.push(entry.path());
        }
    }
    matched.sort();
    Ok(Some(matched))
}

/// Rank the immediate subdirectories of `root` by recursive size.
///
/// Stays on one filesystem. Unreadable directories and entries are counted
/// in `skipped`, never reported as errors.
pub(crate) fn scan_consumers(root: &Path, limit: usize) -> ConsumerScan {
    let mut scan = ConsumerScan::default();

    let children = match fs::read_dir(root) {
        Ok(children) => children,
        Err(e) => {
            debug!(root = %root.display(), error = %e, "cannot read scan root");
            scan.skipped += 1;
            return scan;
        }
    };

    for child in children.flatten() {
        let is_dir = child.file_type().map(|t| t.is_dir()).unwrap_or(false);
        if !is_dir {
            continue;
        }

        let path = child.path();
        if fs::read_dir(&path).is_err() {
            scan.skipped += 1;
            continue;
        }

        let mut bytes = 0u64;
        for entry in WalkDir::new(&path).same_file_system(true) {
            match entry {
                Ok(entry) => {
                    if entry.file_type().is_file() {
                        bytes += entry.metadata().map(|m| m.len()).unwrap_or(0);
                    }
                }
                Err(_) => scan.skipped += 1,
            }
        }
        scan.entries.push(DirUsage { path, bytes });
    }

    scan.entries
        .sort_by(|a, b| b.bytes.cmp(&a.bytes).then_with(|| a.path.cmp(&b.path)));
    scan.entries.truncate(limit);
    scan
}

/// Last `lines` lines of a file, read backwards so huge logs stay cheap
pub(crate) fn read_tail(path: &Path, lines: usize) -> io::Result<Vec<String>> {
    if lines == 0 {
        return Ok(Vec::new());
    }

    let mut file = File::open(path)?;
    let len = file.metadata()?.len();

    let mut pos = len;
    let mut buf: Vec<u8> = Vec::new();
    loop {
        // One extra newline because the file usually ends with one
        let newlines = buf.iter().filter(|&&b| b == b'\n').count();
        if newlines > lines || pos == 0 {
            break;
        }
        let step = TAIL_CHUNK.min(pos);
        pos -= step;
        file.seek(SeekFrom::Start(pos))?;
        let mut chunk = vec![0u8; step as usize];
        file.read_exact(&mut chunk)?;
        chunk.extend_from_slice(&buf);
        buf = chunk;
    }

    let text = String::from_utf8_lossy(&buf);
    let all: Vec<&str> = text.lines().collect();
    // First line may be partial when we stopped mid-file
    let start = all.len().saturating_sub(lines);
    Ok(all[start..].iter().map(|s| s.to_string()).collect())
}

/// Write to a sibling temp file and rename over the target, keeping its mode
pub(crate) fn atomic_replace(path: &Path, contents: &str) -> io::Result<()> {
    let file_name = path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;
    let tmp = path.with_file_name(format!(".{}.logjam-tmp", file_name.to_string_lossy()));

    let previous_mode = fs::metadata(path).ok().map(|m| m.permissions());

    {
        let mut file = File::create(&tmp)?;
        file.write_all(contents.as_bytes())?;
        file.sync_all()?;
    }
    if let Some(perms) = previous_mode {
        fs::set_permissions(&tmp, perms)?;
    }
    fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    #[test]
    fn test_parse_df_output() {
        let out = "     1B-blocks        Used       Avail Use%\n 10737418240  9663676416  1073741824  90%\n";
        let usage = parse_df_output(out).unwrap();
        assert_eq!(usage.total_bytes, 10737418240);
        assert_eq!(usage.available_bytes, 1073741824);
        assert_eq!(usage.percent_used, 90);
    }

    #[test]
    fn test_parse_df_garbage() {
        assert!(parse_df_output("").is_none());
        assert!(parse_df_output("header\nnot numbers at all\n").is_none());
    }

    #[test]
    fn test_command_available() {
        let host = HostSystem::new();
        assert!(host.command_available("sh"));
        assert!(!host.command_available("logjam-definitely-not-installed"));
    }

    #[test]
    fn test_tail_returns_last_lines() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("app.log");
        let content: String = (1..=50).map(|i| format!("line {}\n", i)).collect();
        fs::write(&path, content).unwrap();

        let tail = read_tail(&path, 3).unwrap();
        assert_eq!(tail, vec!["line 48", "line 49", "line 50"]);
    }

    #[test]
    fn test_tail_larger_than_chunk() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("big.log");
        let content: String = (1..=5000).map(|i| format!("entry number {:05}\n", i)).collect();
        fs::write(&path, content).unwrap();

        let tail = read_tail(&path, 2).unwrap();
        assert_eq!(tail, vec!["entry number 04999", "entry number 05000"]);

        let short = read_tail(&path, 10_000).unwrap();
        assert_eq!(short.len(), 5000);
    }

    #[test]
    fn test_tail_missing_file() {
        let temp = TempDir::new().unwrap();
        assert!(read_tail(&temp.path().join("nope"), 5).is_err());
    }

    #[test]
    fn test_truncate_keeps_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("syslog");
        fs::write(&path, vec![b'x'; 4096]).unwrap();

        HostSystem::new().truncate(&path).unwrap();
        assert_eq!(metadata_size(&path).unwrap(), Some(0));
    }

    #[test]
    fn test_atomic_replace_keeps_mode() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("rsyslog");
        fs::write(&path, "old").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o640)).unwrap();

        atomic_replace(&path, "new").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "new");
        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o640);
    }

    #[test]
    fn test_list_matching() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.lock"), "").unwrap();
        fs::write(temp.path().join("b.lock"), "").unwrap();
        fs::write(temp.path().join("keep.pid"), "").unwrap();

        fs::write(temp.path().join("task-1.lock"), "").unwrap();

        let found = list_matching(temp.path(), "*.lock").unwrap().unwrap();
        assert_eq!(found.len(), 3);
        let single = list_matching(temp.path(), "task-?.lock").unwrap().unwrap();
        assert_eq!(single, vec![temp.path().join("task-1.lock")]);
        let err = list_matching(temp.path(), "[unclosed").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(list_matching(&temp.path().join("missing"), "*").unwrap().is_none());
    }

    #[test]
    fn test_scan_consumers_orders_largest_first() {
        let temp = TempDir::new().unwrap();
        for (name, size) in [("small", 10usize), ("large", 5000), ("medium", 700)] {
            let dir = temp.path().join(name);
            fs::create_dir(&dir).unwrap();
            fs::write(dir.join("data"), vec![0u8; size]).unwrap();
        }
        fs::write(temp.path().join("loose-file"), vec![0u8; 99999]).unwrap();

        let scan = scan_consumers(temp.path(), 2);
        let names: Vec<_> = scan
            .entries
            .iter()
            .map(|e| e.path.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["large", "medium"]);
        assert_eq!(scan.entries[0].bytes, 5000);
    }

    #[test]
    fn test_scan_missing_root_is_skipped_not_error() {
        let temp = TempDir::new().unwrap();
        let scan = scan_consumers(&temp.path().join("absent"), 5);
        assert!(scan.entries.is_empty());
        assert_eq!(scan.skipped, 1);
    }
}
