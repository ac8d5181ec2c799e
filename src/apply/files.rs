use std::io::Write;

use regex::Regex;

use super::RunContext;
use crate::errors::ProvError;
use crate::steps::action::ActionFile;
use crate::utils::fs::backup;

pub(super) fn apply(ctx: &RunContext, action: &ActionFile) -> Result<(), ProvError> {
    match action {
        ActionFile::ReplacePattern {
            file,
            pattern,
            replacement,
        } => replace_pattern(&ctx.target(file), pattern, replacement).map(|_| ()),

        ActionFile::AppendLines { file, lines } => append_lines(&ctx.target(file), lines),

        ActionFile::WriteFile { file, content } => write_file(&ctx.target(file), content),
    }
}

/// Replaces every match of `pattern` in `file`. Patterns are multi-line
/// regexes, so `^` and `$` match at line boundaries. Returns whether
/// anything changed.
pub(super) fn replace_pattern(
    file: &str,
    pattern: &str,
    replacement: &str,
) -> Result<bool, ProvError> {
    let re = Regex::new(&format!("(?m){pattern}"))
        .map_err(|err| ProvError::BadConfig(format!("bad pattern {pattern}: {err}")))?;

    let original = read(file)?;
    let replaced = re.replace_all(&original, replacement);

    if replaced == original {
        log::debug!("{file}: nothing to replace for {pattern}");
        return Ok(false);
    }

    backup(file)?;
    std::fs::write(file, replaced.as_bytes())
        .map_err(|err| ProvError::FileError(err, format!("failed to write {file}")))?;

    Ok(true)
}

/// Appends `lines` to `file` unless they are all already present
pub(super) fn append_lines<S: AsRef<str>>(file: &str, lines: &[S]) -> Result<(), ProvError> {
    let original = match std::path::Path::new(file).exists() {
        true => read(file)?,
        false => String::new(),
    };

    let existing: Vec<&str> = original.lines().collect();
    if lines.iter().all(|line| existing.contains(&line.as_ref())) {
        log::debug!("{file}: lines already present");
        return Ok(());
    }

    if !original.is_empty() {
        backup(file)?;
    }

    let mut f = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(file)
        .map_err(|err| ProvError::FileError(err, format!("failed to open {file}")))?;

    let mut content = String::new();
    if !original.is_empty() && !original.ends_with('\n') {
        content.push('\n');
    }

    for line in lines {
        content.push_str(line.as_ref());
        content.push('\n');
    }

    f.write_all(content.as_bytes())
        .map_err(|err| ProvError::FileError(err, format!("failed to append to {file}")))
}

pub(super) fn write_file(file: &str, content: &str) -> Result<(), ProvError> {
    if let Some(parent) = std::path::Path::new(file).parent() {
        std::fs::create_dir_all(parent).map_err(|err| {
            ProvError::FileError(err, format!("failed to create {}", parent.display()))
        })?;
    }

    std::fs::write(file, content)
        .map_err(|err| ProvError::FileError(err, format!("failed to write {file}")))
}

pub(super) fn read(file: &str) -> Result<String, ProvError> {
    std::fs::read_to_string(file)
        .map_err(|err| ProvError::FileError(err, format!("failed to read {file}")))
}
