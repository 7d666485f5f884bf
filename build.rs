use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

fn main() {
    println!("cargo:rerun-if-changed=Cargo.toml");
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=src");

    let build_ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    println!("cargo:rustc-env=CLOP_BUILD_TIMESTAMP={build_ts}");

    println!("cargo:rerun-if-env-changed=CLOP_RELEASE_TAG");
    let tag = std::env::var("CLOP_RELEASE_TAG").unwrap_or_else(|_| "dev".to_string());
    println!("cargo:rustc-env=CLOP_RELEASE_TAG={tag}");

    enforce_core_boundary();
}

fn enforce_core_boundary() {
    // The library must not spawn games or touch the terminal; only the binary may.
    let forbidden = [
        "std::process::Command",
        "println!(",
        "comfy_table::",
        "csv::",
        "clap::",
    ];

    let mut violations = Vec::new();
    let mut stack = vec![PathBuf::from("src")];
    while let Some(dir) = stack.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(e) => e,
            Err(_) => continue,
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
                continue;
            }
            if path.extension().and_then(|s| s.to_str()) != Some("rs") {
                continue;
            }
            if path.file_name().and_then(|s| s.to_str()) == Some("main.rs") {
                continue;
            }
            let rel = path.to_string_lossy().to_string();
            let src = match fs::read_to_string(&path) {
                Ok(s) => s,
                Err(_) => continue,
            };
            for (line_no, line) in src.lines().enumerate() {
                for token in &forbidden {
                    if line.contains(token) {
                        violations.push(format!(
                            "{}:{} contains forbidden token '{}'",
                            rel,
                            line_no + 1,
                            token
                        ));
                    }
                }
            }
        }
    }

    if !violations.is_empty() {
        eprintln!("\nerror: terminal or process code found in clop library modules:");
        for v in violations {
            eprintln!("  - {v}");
        }
        panic!("library boundary violated");
    }
}
