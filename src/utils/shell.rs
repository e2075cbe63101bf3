/// Quotes a value for a POSIX shell. Every user-supplied path, pattern or
/// name that ends up in a remote command goes through here.
pub fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

/// Remote readability probe shared by the log, monitor and file handlers.
pub fn readable_file_probe(path: &str) -> String {
    let quoted = quote(path);
    format!("test -f {q} && test -r {q} && echo readable", q = quoted)
}

pub fn writable_dir_probe(path: &str) -> String {
    let quoted = quote(path);
    format!("test -d {q} && test -w {q} && echo writable", q = quoted)
}

pub fn file_size_command(path: &str) -> String {
    format!("stat -c %s {}", quote(path))
}

/// Parent directory and final component of an absolute remote path,
/// ignoring trailing slashes.
pub fn split_remote_path(path: &str) -> Option<(String, String)> {
    let trimmed = path.trim_end_matches('/');
    let (parent, name) = trimmed.rsplit_once('/')?;
    if name.is_empty() {
        return None;
    }
    let parent = if parent.is_empty() { "/" } else { parent };
    Some((parent.to_string(), name.to_string()))
}

pub fn join_remote_path(dir: &str, name: &str) -> String {
    format!("{}/{}", dir.trim_end_matches('/'), name)
}
