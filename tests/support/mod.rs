#![allow(dead_code)]

use std::fs;
use std::path::Path;

/// Write `contents` at `path`, creating parent directories first.
pub fn write_file(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

/// Lay down the standard fixture package: a manifest pointing into `dist`,
/// two built files, and a README.
pub fn write_dist_package(root: &Path) {
    write_file(
        &root.join("package.json"),
        r#"{
  "name": "mytool",
  "version": "1.2.3",
  "files": ["dist", "README.md"],
  "main": "dist/index.js",
  "bin": { "mytool": "dist/bin.js" }
}
"#,
    );
    write_file(&root.join("dist/index.js"), "module.exports = 42;\n");
    write_file(&root.join("dist/bin.js"), "#!/usr/bin/env node\n");
    write_file(&root.join("README.md"), "# mytool\n");
}
