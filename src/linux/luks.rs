use crate::errors::ProvError;
use crate::utils::shell;

// The passphrase is always fed through stdin (--key-file=-), so it never
// shows up in process listings or logs. No trailing newline is written:
// cryptsetup would take it as part of the key.

pub fn format(device: &str, passphrase: &str) -> Result<(), ProvError> {
    check_passphrase(passphrase)?;

    shell::exec_stdin(
        "cryptsetup",
        &[
            "luksFormat",
            "--batch-mode",
            "--type",
            "luks2",
            "--key-file=-",
            device,
        ],
        passphrase,
    )
    .map(|_| ())
}

/// Opens `device` as /dev/mapper/`name`, returning the mapped path
pub fn open(device: &str, passphrase: &str, name: &str) -> Result<String, ProvError> {
    check_passphrase(passphrase)?;

    shell::exec_stdin(
        "cryptsetup",
        &["open", "--type", "luks", "--key-file=-", device, name],
        passphrase,
    )?;

    Ok(mapped_path(name))
}

pub fn mapped_path(name: &str) -> String {
    format!("/dev/mapper/{name}")
}

fn check_passphrase(pass: &str) -> Result<(), ProvError> {
    match pass {
        "" => Err(ProvError::BadConfig("empty luks passphrase".to_string())),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linux::user;
    use crate::utils::shell::in_path;

    fn close(name: &str) -> Result<(), ProvError> {
        shell::exec("cryptsetup", &["close", name])
    }

    #[test]
    fn test_empty_passphrase_rejected() {
        assert!(matches!(
            format("/dev/null", ""),
            Err(ProvError::BadConfig(_))
        ));
        assert!(open("/dev/null", "", "foo").is_err());
        assert_eq!(mapped_path("cryptroot"), "/dev/mapper/cryptroot");
    }

    #[ignore = "Ignored because it needs root and cryptsetup"]
    #[test]
    fn test_luks() {
        if !in_path("cryptsetup") || !user::is_root() {
            println!("WARN: skipping luks tests - no cryptsetup in path or not root");
            return;
        }

        let img = tempfile::NamedTempFile::new().unwrap();
        img.as_file().set_len(64 * 1024 * 1024).unwrap();
        let path = img.path().to_str().unwrap();

        format(path, "pass1234").expect("luksFormat failed");
        let mapped = open(path, "pass1234", "provrstest").expect("luksOpen failed");
        assert_eq!(mapped, "/dev/mapper/provrstest");
        close("provrstest").expect("luksClose failed");
    }
}
