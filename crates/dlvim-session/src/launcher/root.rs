use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// Marker files of a version control checkout.
const VCS_MARKERS: [&str; 4] = [".git", ".hg", ".svn", ".bzr"];

/// Finds the root of the Go module containing `dir`.
///
/// This is the nearest ancestor of `dir` (inclusive) holding a `go.mod`
/// file, or `dir` itself if there is none.
pub fn find_project_root(dir: &Path) -> PathBuf {
    find_ancestor(dir, |d| d.join("go.mod").is_file())
}

/// Finds the root of the version control checkout containing `dir`.
///
/// Falls back to `dir` itself.
pub fn find_vcs_root(dir: &Path) -> PathBuf {
    find_ancestor(dir, |d| VCS_MARKERS.iter().any(|m| d.join(m).exists()))
}

fn find_ancestor(dir: &Path, matches: impl Fn(&Path) -> bool) -> PathBuf {
    dir.ancestors()
        .find(|d| matches(d))
        .unwrap_or(dir)
        .to_path_buf()
}

/// Import path of the package at `root`, if it lives inside one of the
/// `src` directories of a `GOPATH` list.
pub fn import_path(root: &Path, gopath: &OsStr) -> Option<String> {
    std::env::split_paths(gopath)
        .filter(|p| !p.as_os_str().is_empty())
        .find_map(|p| root.strip_prefix(p.join("src")).ok().map(Path::to_path_buf))
        .filter(|rel| !rel.as_os_str().is_empty())
        .map(|rel| {
            rel.components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/")
        })
}

/// The `GOPATH` list of the current environment, defaulting to `$HOME/go`.
pub fn gopath() -> Option<std::ffi::OsString> {
    std::env::var_os("GOPATH")
        .filter(|p| !p.is_empty())
        .or_else(|| std::env::var_os("HOME").map(|home| Path::new(&home).join("go").into()))
}

/// Address of a server, given either as `host:port` or as a bare port.
pub fn normalize_addr(addr: &str) -> String {
    if addr.contains(':') {
        addr.to_owned()
    } else {
        format!("localhost:{addr}")
    }
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;
    use std::fs;

    use super::{find_project_root, find_vcs_root, import_path, normalize_addr};

    #[test]
    fn project_root_is_nearest_go_mod() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let nested = tmp.path().join("cmd/hello");
        fs::create_dir_all(&nested).expect("mkdir");

        assert_eq!(find_project_root(&nested), nested);

        fs::write(tmp.path().join("go.mod"), "module hello\n").expect("go.mod");
        assert_eq!(find_project_root(&nested), tmp.path());
    }

    #[test]
    fn vcs_root_is_nearest_checkout() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let nested = tmp.path().join("pkg/util");
        fs::create_dir_all(&nested).expect("mkdir");
        fs::create_dir(tmp.path().join(".git")).expect(".git");

        assert_eq!(find_vcs_root(&nested), tmp.path());
    }

    #[test]
    fn import_path_inside_gopath() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let other = tmp.path().join("other");
        let gopath = tmp.path().join("go");
        let root = gopath.join("src/github.com/user/hello");

        let list = std::env::join_paths([&other, &gopath]).expect("join");

        assert_eq!(
            import_path(&root, &list).as_deref(),
            Some("github.com/user/hello")
        );
        assert_eq!(import_path(&other, &list), None);
        assert_eq!(import_path(&gopath.join("src"), &list), None);
        assert_eq!(import_path(&root, &OsString::new()), None);
    }

    #[test]
    fn bare_port_is_local() {
        assert_eq!(normalize_addr("41222"), "localhost:41222");
        assert_eq!(normalize_addr("10.0.0.2:2345"), "10.0.0.2:2345");
    }
}
