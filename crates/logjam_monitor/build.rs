// Build script for logjam-monitor - embeds version at compile time

fn main() {
    let version =
        std::env::var("LOGJAM_VERSION").unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string());

    println!("cargo:rustc-env=LOGJAM_VERSION={}", version);

    println!("cargo:rerun-if-changed=Cargo.toml");
    println!("cargo:rerun-if-env-changed=LOGJAM_VERSION");
}
