use nix::unistd::Uid;

/// Returns whether the current user is privileged
pub fn is_root() -> bool {
    Uid::effective().is_root()
}

/// Reports whether `name` has an entry in `passwd`,
/// the content of an /etc/passwd file
pub fn user_exists(passwd: &str, name: &str) -> bool {
    passwd
        .lines()
        .filter_map(|line| line.split(':').next())
        .any(|user| user == name)
}

#[test]
fn test_user_exists() {
    let passwd = "root:x:0:0::/root:/bin/bash\nbin:x:1:1::/:/usr/bin/nologin\nartnoi:x:1000:1000:Art:/home/artnoi:/bin/bash\n";

    assert!(user_exists(passwd, "root"));
    assert!(user_exists(passwd, "artnoi"));
    assert!(!user_exists(passwd, "art"));
    assert!(!user_exists("", "root"));
}
