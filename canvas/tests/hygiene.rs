//! Hygiene: source-level budgets for the canvas crate.
//!
//! Production files under `src/` (excluding `*_test.rs`) are scanned line by
//! line. Every budget is zero; the canvas is driven from UI callbacks and must
//! never crash or swallow an error.

use std::fs;
use std::path::Path;

struct SourceFile {
    path: String,
    content: String,
}

fn source_files() -> Vec<SourceFile> {
    let mut files = Vec::new();
    collect_rs_files(Path::new("src"), &mut files);
    files
}

fn collect_rs_files(dir: &Path, out: &mut Vec<SourceFile>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_rs_files(&path, out);
            continue;
        }
        let path_str = path.to_string_lossy().to_string();
        if !path_str.ends_with(".rs") || path_str.ends_with("_test.rs") {
            continue;
        }
        if let Ok(content) = fs::read_to_string(&path) {
            out.push(SourceFile { path: path_str, content });
        }
    }
}

fn check_budget(pattern: &str, max: usize) {
    let files = source_files();
    assert!(!files.is_empty(), "no source files found under src/");

    let hits: Vec<(String, usize)> = files
        .iter()
        .filter_map(|file| {
            let count = file.content.lines().filter(|line| line.contains(pattern)).count();
            (count > 0).then(|| (file.path.clone(), count))
        })
        .collect();
    let count: usize = hits.iter().map(|(_, c)| c).sum();
    let listing = hits
        .iter()
        .map(|(path, c)| format!("  {path}: {c}"))
        .collect::<Vec<_>>()
        .join("\n");
    assert!(count <= max, "`{pattern}` budget exceeded: found {count}, max {max}.\n{listing}");
}

macro_rules! budget {
    ($name:ident, $pattern:expr, $max:expr) => {
        #[test]
        fn $name() {
            check_budget($pattern, $max);
        }
    };
}

// Panics.
budget!(unwrap_budget, ".unwrap()", 0);
budget!(expect_budget, ".expect(", 0);
budget!(panic_budget, "panic!(", 0);
budget!(unreachable_budget, "unreachable!(", 0);
budget!(todo_budget, "todo!(", 0);
budget!(unimplemented_budget, "unimplemented!(", 0);

// Silent loss.
budget!(silent_discard_budget, "let _ =", 0);
budget!(dot_ok_budget, ".ok()", 0);

// Structure.
budget!(allow_dead_code_budget, "#[allow(dead_code)]", 0);
