use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::common::error::ArraySubError;
use crate::TaskIndex;

/// Returns true if the line describes a task (it is neither blank nor a `#` comment).
pub fn is_task_line(line: &str) -> bool {
    let line = line.trim();
    !line.is_empty() && !line.starts_with('#')
}

fn open_manifest(path: &Path) -> crate::Result<BufReader<File>> {
    match File::open(path) {
        Ok(file) => Ok(BufReader::new(file)),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            Err(ArraySubError::ManifestNotFound(path.to_path_buf()))
        }
        Err(error) => Err(error.into()),
    }
}

/// Iterates the task descriptors of a manifest, skipping blank and comment lines.
fn task_lines(reader: impl BufRead) -> impl Iterator<Item = std::io::Result<String>> {
    reader.lines().filter(|line| match line {
        Ok(line) => is_task_line(line),
        Err(_) => true,
    })
}

/// Counts the tasks of the manifest at `path`.
///
/// An existing manifest without any task line yields zero, which callers treat as
/// "nothing to submit".
pub fn count_tasks(path: &Path) -> crate::Result<TaskIndex> {
    let reader = open_manifest(path)?;
    let mut count = 0;
    for line in task_lines(reader) {
        line?;
        count += 1;
    }
    log::debug!("Manifest {} contains {count} task(s)", path.display());
    Ok(count)
}

/// Returns the descriptor of the task with the given 1-based `index`.
/// Indices count only task lines, the same way as [`count_tasks`] does.
pub fn resolve_task(path: &Path, index: TaskIndex) -> crate::Result<String> {
    if index == 0 {
        return crate::common::error::error("Task indices start at 1".to_string());
    }
    let reader = open_manifest(path)?;
    match task_lines(reader).nth((index - 1) as usize) {
        Some(line) => Ok(line?.trim().to_string()),
        None => crate::common::error::error(format!(
            "Manifest {} does not contain task {index}",
            path.display()
        )),
    }
}
