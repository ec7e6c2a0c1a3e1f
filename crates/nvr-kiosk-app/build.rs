use std::fs;
use std::path::PathBuf;

fn main() {
    let manifest_dir = PathBuf::from(std::env::var("CARGO_MANIFEST_DIR").expect("manifest dir"));
    let version_path = manifest_dir
        .ancestors()
        .nth(2)
        .expect("workspace root")
        .join("VERSION");

    println!("cargo:rerun-if-changed={}", version_path.display());

    let version = fs::read_to_string(&version_path).expect("read VERSION file");
    let version = version.trim();
    assert!(!version.is_empty(), "VERSION must not be empty");
    assert!(
        version.split('.').all(|part| part.parse::<u64>().is_ok()),
        "VERSION must be dotted numeric, got {version:?}"
    );

    println!("cargo:rustc-env=NVR_KIOSK_VERSION={version}");
}
