use std::env;
use std::path::Path;

// Packet.lib (Npcap/WinPcap SDK) is looked up in `<workspace>/lib` when linking on Windows.
fn main() {
    let manifest_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(value) => value,
        Err(err) => {
            eprintln!("CARGO_MANIFEST_DIR is not set: {err}");
            std::process::exit(1);
        },
    };

    let Some(workspace_root) = Path::new(&manifest_dir).parent() else {
        eprintln!("Package directory has no parent: {manifest_dir}");
        std::process::exit(1);
    };

    println!("cargo:rerun-if-changed=build.rs");
    println!(
        "cargo:rustc-link-search=native={}",
        workspace_root.join("lib").display()
    );
}
