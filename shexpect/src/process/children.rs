//! Process enumeration through `/proc`.

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::io;
use std::path::Path;

/// A direct child of some process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildProcess {
    /// Process ID.
    pub pid: u32,

    /// Full command line, arguments separated by spaces.
    pub command: String,
}

/// List the direct children of `ppid`, sorted by pid.
///
/// Processes that exit while the table is being scanned are skipped.
pub fn children_of(ppid: u32) -> io::Result<Vec<ChildProcess>> {
    children_in(Path::new("/proc"), ppid)
}

fn children_in(proc_root: &Path, ppid: u32) -> io::Result<Vec<ChildProcess>> {
    let mut children = Vec::new();

    for entry in fs::read_dir(proc_root)? {
        let entry = entry?;
        let Some(pid) = entry.file_name().to_str().and_then(|n| n.parse::<u32>().ok()) else {
            continue;
        };

        let stat = match fs::read_to_string(entry.path().join("stat")) {
            Ok(stat) => stat,
            Err(e) if vanished(&e) => continue,
            Err(e) => return Err(e),
        };
        if parse_stat(&stat).map(|s| s.ppid) != Some(ppid) {
            continue;
        }

        let cmdline = match fs::read(entry.path().join("cmdline")) {
            Ok(raw) => parse_cmdline(&raw),
            Err(e) if vanished(&e) => continue,
            Err(e) => return Err(e),
        };
        let command = if cmdline.is_empty() {
            // Zombies and kernel threads have no cmdline
            format!("[{}]", parse_stat_comm(&stat).unwrap_or_default())
        } else {
            cmdline
        };

        children.push(ChildProcess { pid, command });
    }

    children.sort_by_key(|c| c.pid);
    Ok(children)
}

/// Every process that belongs to the tree rooted at `root`, `root` excluded.
///
/// That is the descendants of `root`, plus anything in its process group or
/// its session. Session and group membership survive `root` exiting, so
/// orphaned shells and background jobs are still found afterwards.
/// Descendants come leaves first.
pub fn process_tree(root: u32) -> io::Result<Vec<u32>> {
    process_tree_in(Path::new("/proc"), root)
}

fn process_tree_in(proc_root: &Path, root: u32) -> io::Result<Vec<u32>> {
    if root == 0 {
        return Ok(Vec::new());
    }
    let table = scan(proc_root)?;

    let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
    for (pid, stat) in &table {
        children.entry(stat.ppid).or_default().push(*pid);
    }

    let mut members = Vec::new();
    let mut queue = VecDeque::from([root]);
    while let Some(pid) = queue.pop_front() {
        for &child in children.get(&pid).into_iter().flatten() {
            if child != root && !members.contains(&child) {
                members.push(child);
                queue.push_back(child);
            }
        }
    }
    members.reverse();

    for (pid, stat) in &table {
        let related = stat.pgrp == root || stat.session == root;
        if related && *pid != root && !members.contains(pid) {
            members.push(*pid);
        }
    }
    Ok(members)
}

/// Parsed `/proc/<pid>/stat` of every live process.
fn scan(proc_root: &Path) -> io::Result<Vec<(u32, Stat)>> {
    let mut table = Vec::new();
    for entry in fs::read_dir(proc_root)? {
        let entry = entry?;
        let Some(pid) = entry.file_name().to_str().and_then(|n| n.parse::<u32>().ok()) else {
            continue;
        };
        let stat = match fs::read_to_string(entry.path().join("stat")) {
            Ok(stat) => stat,
            Err(e) if vanished(&e) => continue,
            Err(e) => return Err(e),
        };
        if let Some(stat) = parse_stat(&stat).filter(|s| !s.is_dead()) {
            table.push((pid, stat));
        }
    }
    Ok(table)
}

fn vanished(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied
    ) || err.raw_os_error() == Some(nix::libc::ESRCH)
}

/// The fields of `/proc/<pid>/stat` used here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Stat {
    pub state: char,
    pub ppid: u32,
    pub pgrp: u32,
    pub session: u32,
}

impl Stat {
    /// Zombie or dead: nothing left to signal.
    pub fn is_dead(&self) -> bool {
        matches!(self.state, 'Z' | 'X' | 'x')
    }
}

/// Parse the contents of `/proc/<pid>/stat`.
///
/// The command name is parenthesised and may itself contain spaces or
/// parentheses, so fields are counted from the last `)`.
pub(crate) fn parse_stat(stat: &str) -> Option<Stat> {
    let rest = &stat[stat.rfind(')')? + 1..];
    let mut fields = rest.split_whitespace();
    let state = fields.next()?.chars().next()?;
    let mut number = || fields.next()?.parse::<u32>().ok();
    Some(Stat {
        state,
        ppid: number()?,
        pgrp: number()?,
        session: number()?,
    })
}

/// Whether `pid` exists and is neither a zombie nor dead.
pub(crate) fn is_running(pid: u32) -> bool {
    fs::read_to_string(format!("/proc/{pid}/stat"))
        .ok()
        .and_then(|stat| parse_stat(&stat))
        .is_some_and(|stat| !stat.is_dead())
}

pub(crate) fn parse_stat_comm(stat: &str) -> Option<&str> {
    let start = stat.find('(')?;
    let end = stat.rfind(')')?;
    stat.get(start + 1..end)
}

pub(crate) fn parse_cmdline(raw: &[u8]) -> String {
    raw.split(|b| *b == 0)
        .filter(|arg| !arg.is_empty())
        .map(String::from_utf8_lossy)
        .collect::<Vec<_>>()
        .join(" ")
}
