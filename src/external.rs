use nix::errno::Errno;
use nix::unistd::execv;
use std::borrow::Cow;
use std::convert::Infallible;
use std::ffi::{CString, OsStr};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

/// Replaces the current process image with `argv[0]`, resolved against
/// `search_paths` the way a typical shell would.
///
/// Only returns on failure. An unresolvable command reports `ENOENT`, an
/// argument containing a NUL byte reports `EINVAL`.
pub fn exec_command(argv: &[String], search_paths: &OsStr) -> Errno {
    match try_exec(argv, search_paths) {
        Ok(never) => match never {},
        Err(errno) => errno,
    }
}

fn try_exec(argv: &[String], search_paths: &OsStr) -> Result<Infallible, Errno> {
    let name = argv.first().ok_or(Errno::ENOENT)?;
    let program = find_command_path(search_paths, Path::new(name)).ok_or(Errno::ENOENT)?;
    let program = CString::new(program.as_os_str().as_bytes()).map_err(|_| Errno::EINVAL)?;
    let args = argv
        .iter()
        .map(|arg| CString::new(arg.as_bytes()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| Errno::EINVAL)?;
    log::trace!("exec {program:?} {args:?}");
    execv(&program, &args)
}

/// Finds the program a command word refers to.
///
/// A bare name (`sort`) is looked up in every directory of `search_paths`,
/// in order. Anything with a separator (`/bin/sh`, `./run`, `bin/tool`) is
/// taken as a path and only checked for existence. Only regular files
/// qualify. A PATH hit is returned owned, a path given directly is borrowed.
pub fn find_command_path<'a>(search_paths: &OsStr, path: &'a Path) -> Option<Cow<'a, Path>> {
    if path.is_absolute() || path.starts_with("./") {
        return find_by_path(path).map(Cow::Borrowed);
    }

    let mut components = path.components();
    match (components.next(), components.next()) {
        (None, _) => None,
        (Some(single), None) => find_in_path(search_paths, single.as_os_str()).map(Cow::Owned),
        _ => find_by_path(path).map(Cow::Borrowed),
    }
}

fn find_in_path(search_paths: &OsStr, cmd: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(search_paths)
        .map(|dir| dir.join(cmd))
        .find(|candidate| find_by_path(candidate).is_some())
}

// Directories are never commands, even when one shadows a program later in PATH.
fn find_by_path(path: &Path) -> Option<&Path> {
    if path.is_file() { Some(path) } else { None }
}
