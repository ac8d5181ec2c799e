use std::env;
use std::fs;
use std::io::Write;
use std::process::{
    Command,
    Output,
    Stdio,
};

use crate::errors::ProvError;

/// Renders `cmd` and `args` as one shell-quoted line, for logs and dry-runs
pub fn display_cmd(cmd: &str, args: &[&str]) -> String {
    let mut parts = vec![cmd];
    parts.extend_from_slice(args);

    shlex::try_join(parts).unwrap_or_else(|_| format!("{cmd} {}", args.join(" ")))
}

/// Runs `cmd` and waits for it, discarding its output
pub fn exec(cmd: &str, args: &[&str]) -> Result<(), ProvError> {
    exec_output(cmd, args).map(|_| ())
}

/// Runs `cmd`, returning its stdout. On non-zero exit, the error
/// carries the command's stderr as diagnostic text.
pub fn exec_output(cmd: &str, args: &[&str]) -> Result<String, ProvError> {
    log::debug!("exec: {}", display_cmd(cmd, args));

    let output = Command::new(cmd)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .map_err(|err| spawn_error(cmd, err))?;

    collect_output(cmd, args, output)
}

/// Runs `cmd` with `input` piped to its stdin.
///
/// Secrets (e.g. LUKS passphrases) are passed this way
/// so that they never appear on a command line.
pub fn exec_stdin(
    cmd: &str,
    args: &[&str],
    input: &str,
) -> Result<String, ProvError> {
    log::debug!("exec (with stdin): {}", display_cmd(cmd, args));

    let mut child = Command::new(cmd)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|err| spawn_error(cmd, err))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(input.as_bytes())
            .map_err(|err| ProvError::CmdFailed {
                error: Some(err),
                context: format!("failed to write stdin of command {cmd}"),
            })?;
    }

    let output = child.wait_with_output().map_err(|err| ProvError::CmdFailed {
        error: Some(err),
        context: format!("command {cmd} failed to run"),
    })?;

    collect_output(cmd, args, output)
}

/// Runs `cmd` inside the new system with arch-chroot
pub fn chroot(location: &str, cmd: &str, args: &[&str]) -> Result<String, ProvError> {
    let mut chroot_args = vec![location, cmd];
    chroot_args.extend_from_slice(args);

    exec_output("arch-chroot", &chroot_args)
}

/// Like [chroot], but pipes `input` into the chrooted command
pub fn chroot_stdin(
    location: &str,
    cmd: &str,
    args: &[&str],
    input: &str,
) -> Result<String, ProvError> {
    let mut chroot_args = vec![location, cmd];
    chroot_args.extend_from_slice(args);

    exec_stdin("arch-chroot", &chroot_args, input)
}

pub fn in_path(program: &str) -> bool {
    if let Ok(path) = env::var("PATH") {
        for p in path.split(':') {
            let p_str = format!("{}/{}", p, program);
            if fs::metadata(p_str).is_ok() {
                return true;
            }
        }
    }

    false
}

fn spawn_error(cmd: &str, err: std::io::Error) -> ProvError {
    ProvError::CmdFailed {
        error: Some(err),
        context: format!("command {cmd} failed to spawn"),
    }
}

fn collect_output(
    cmd: &str,
    args: &[&str],
    output: Output,
) -> Result<String, ProvError> {
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let status = match output.status.code() {
            Some(code) => format!("exited with non-zero status {code}"),
            None => "terminated by signal".to_string(),
        };

        return Err(ProvError::CmdFailed {
            error: None,
            context: format!(
                "command `{}` {status}: {}",
                display_cmd(cmd, args),
                stderr.trim(),
            ),
        });
    }

    String::from_utf8(output.stdout).map_err(|err| {
        ProvError::ProvRsBug(format!("output of {cmd} is not utf-8: {err}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_cmd_quotes_args() {
        assert_eq!(
            display_cmd("sfdisk", &["--append", "/dev/sda"]),
            "sfdisk --append /dev/sda"
        );
        assert_eq!(
            display_cmd("echo", &["hello world"]),
            "echo 'hello world'"
        );
    }

    #[test]
    fn test_exec_output_reports_stderr() {
        if !in_path("sh") {
            println!("WARN: skipping shell tests - no sh in path");
            return;
        }

        let out = exec_output("sh", &["-c", "printf ok"]).expect("sh failed");
        assert_eq!(out, "ok");

        let err = exec_output("sh", &["-c", "echo broken >&2; exit 3"])
            .expect_err("non-zero exit should fail");
        let msg = err.to_string();
        assert!(msg.contains("status 3"), "{msg}");
        assert!(msg.contains("broken"), "{msg}");
    }

    #[test]
    fn test_exec_stdin() {
        if !in_path("cat") {
            println!("WARN: skipping stdin test - no cat in path");
            return;
        }

        let out = exec_stdin("cat", &[], "secret\n").expect("cat failed");
        assert_eq!(out, "secret\n");
    }
}
