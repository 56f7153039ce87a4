//! Keeps sources within the default rustfmt line width.

use std::fs;
use std::path::Path;

const MAX_WIDTH: usize = 100;

fn overlong_lines(dir: &Path) -> Vec<String> {
    let mut found = Vec::new();
    for entry in fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.extension().is_none_or(|extension| extension != "rs") {
            continue;
        }
        let source = fs::read_to_string(&path).unwrap();
        for (number, line) in source.lines().enumerate() {
            if line.chars().count() > MAX_WIDTH {
                found.push(format!("{}:{}", path.display(), number + 1));
            }
            if line.ends_with(' ') || line.contains('\t') {
                found.push(format!("{}:{} whitespace", path.display(), number + 1));
            }
        }
    }
    found
}

#[test]
fn sources_fit_the_line_width() {
    let root = Path::new(env!("CARGO_MANIFEST_DIR"));
    for dir in ["src", "tests"] {
        let found = overlong_lines(&root.join(dir));
        assert!(found.is_empty(), "{found:?}");
    }
}
